use super::super::dto::{
    ErrorResponse, PromptsResponse, ReadResourceQuery, ResolvePromptRequest,
    ResourceContentsResponse, ResourcesResponse,
};
use super::super::state::ServerState;
use super::{Rejection, owner_failure, unknown_owner};
use crate::application::capability::{CapabilityClient, ResolvedPrompt};
use axum::Json;
use axum::extract::{Path, Query, State};
use std::sync::Arc;
use tracing::debug;

async fn client_for(state: &ServerState, id: &str) -> Result<Arc<CapabilityClient>, Rejection> {
    state
        .router()
        .client(id)
        .await
        .ok_or_else(|| unknown_owner(id))
}

#[utoipa::path(
    get,
    path = "/owners/{id}/resources",
    tag = "owners",
    params(("id" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Resources and resource templates of one server", body = ResourcesResponse),
        (status = 404, description = "Unknown owner", body = ErrorResponse),
        (status = 502, description = "Server answered with an error", body = ErrorResponse),
        (status = 503, description = "Server is not connected", body = ErrorResponse)
    )
)]
pub async fn resources_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ResourcesResponse>, Rejection> {
    let client = client_for(&state, &id).await?;
    let resources = client.list_resources().await.map_err(owner_failure)?;
    let templates = client
        .list_resource_templates()
        .await
        .map_err(owner_failure)?;
    debug!(owner = id.as_str(), resources = resources.len(), templates = templates.len(), "Serving resources");
    Ok(Json(ResourcesResponse {
        resources,
        templates,
    }))
}

#[utoipa::path(
    get,
    path = "/owners/{id}/resources/read",
    tag = "owners",
    params(("id" = String, Path, description = "Owner id"), ReadResourceQuery),
    responses(
        (status = 200, description = "Contents of one resource", body = ResourceContentsResponse),
        (status = 404, description = "Unknown owner", body = ErrorResponse),
        (status = 502, description = "Server answered with an error", body = ErrorResponse),
        (status = 503, description = "Server is not connected", body = ErrorResponse)
    )
)]
pub async fn read_resource_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<ReadResourceQuery>,
) -> Result<Json<ResourceContentsResponse>, Rejection> {
    let client = client_for(&state, &id).await?;
    let contents = client
        .read_resource(&query.uri)
        .await
        .map_err(owner_failure)?;
    debug!(owner = id.as_str(), uri = query.uri.as_str(), blocks = contents.len(), "Read resource");
    Ok(Json(ResourceContentsResponse {
        uri: query.uri,
        contents,
    }))
}

#[utoipa::path(
    get,
    path = "/owners/{id}/prompts",
    tag = "owners",
    params(("id" = String, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Prompts offered by one server", body = PromptsResponse),
        (status = 404, description = "Unknown owner", body = ErrorResponse),
        (status = 502, description = "Server answered with an error", body = ErrorResponse),
        (status = 503, description = "Server is not connected", body = ErrorResponse)
    )
)]
pub async fn prompts_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<PromptsResponse>, Rejection> {
    let client = client_for(&state, &id).await?;
    let prompts = client.list_prompts().await.map_err(owner_failure)?;
    Ok(Json(PromptsResponse { prompts }))
}

#[utoipa::path(
    post,
    path = "/owners/{id}/prompts/{name}",
    tag = "owners",
    params(
        ("id" = String, Path, description = "Owner id"),
        ("name" = String, Path, description = "Prompt name")
    ),
    request_body = ResolvePromptRequest,
    responses(
        (status = 200, description = "Prompt resolved into messages", body = ResolvedPrompt),
        (status = 404, description = "Unknown owner", body = ErrorResponse),
        (status = 502, description = "Server answered with an error", body = ErrorResponse),
        (status = 503, description = "Server is not connected", body = ErrorResponse)
    )
)]
pub async fn resolve_prompt_handler(
    State(state): State<Arc<ServerState>>,
    Path((id, name)): Path<(String, String)>,
    Json(payload): Json<ResolvePromptRequest>,
) -> Result<Json<ResolvedPrompt>, Rejection> {
    let client = client_for(&state, &id).await?;
    let resolved = client
        .resolve_prompt(&name, &payload.arguments)
        .await
        .map_err(owner_failure)?;
    debug!(owner = id.as_str(), prompt = name.as_str(), messages = resolved.messages.len(), "Resolved prompt");
    Ok(Json(resolved))
}
