use super::super::dto::{
    AddOwnerRequest, AddOwnerResponse, ErrorResponse, OwnersResponse, ReconnectResponse,
};
use super::super::state::ServerState;
use super::{Rejection, rejection, router_failure};
use crate::config::OwnerConfig;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[utoipa::path(
    get,
    path = "/owners",
    tag = "owners",
    responses(
        (status = 200, description = "Status of every registered server", body = OwnersResponse)
    )
)]
pub async fn owners_handler(State(state): State<Arc<ServerState>>) -> Json<OwnersResponse> {
    let owners = state.router().owner_statuses().await;
    debug!(count = owners.len(), "Serving /owners request");
    Json(OwnersResponse { owners })
}

#[utoipa::path(
    post,
    path = "/owners",
    tag = "owners",
    request_body = AddOwnerRequest,
    responses(
        (status = 200, description = "Server registered; `connected` tells whether it is usable", body = AddOwnerResponse),
        (status = 400, description = "Invalid server description", body = ErrorResponse)
    )
)]
pub async fn add_owner_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<AddOwnerRequest>,
) -> Result<Json<AddOwnerResponse>, Rejection> {
    let AddOwnerRequest {
        id,
        endpoint,
        command,
        args,
        headers,
    } = payload;

    let config = OwnerConfig::from_parts(id, endpoint, command, args, headers).map_err(|err| {
        warn!(%err, "Rejecting owner registration");
        rejection(StatusCode::BAD_REQUEST, err.to_string())
    })?;

    let id = config.id.clone();
    let connected = state.router().add_owner(config).await;
    info!(owner = id.as_str(), connected, "Owner registered via REST");
    Ok(Json(AddOwnerResponse { id, connected }))
}

#[utoipa::path(
    post,
    path = "/owners/{id}/reconnect",
    tag = "owners",
    params(("id" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Server is connected again", body = ReconnectResponse),
        (status = 404, description = "Unknown owner", body = ErrorResponse),
        (status = 502, description = "Server answered with an error", body = ErrorResponse),
        (status = 503, description = "Server is still unreachable", body = ErrorResponse)
    )
)]
pub async fn reconnect_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ReconnectResponse>, Rejection> {
    let connected = state.router().reconnect(&id).await.map_err(router_failure)?;
    info!(owner = id.as_str(), connected, "Owner reconnected via REST");
    Ok(Json(ReconnectResponse { id, connected }))
}
