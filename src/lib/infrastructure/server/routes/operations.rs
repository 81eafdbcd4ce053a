use super::super::dto::OperationsResponse;
use super::super::state::ServerState;
use axum::Json;
use axum::extract::State;
use std::sync::Arc;
use tracing::debug;

#[utoipa::path(
    get,
    path = "/operations",
    tag = "operations",
    responses(
        (status = 200, description = "Operations of every connected server", body = OperationsResponse)
    )
)]
pub async fn operations_handler(State(state): State<Arc<ServerState>>) -> Json<OperationsResponse> {
    let operations = state.router().list_all_operations().await;
    debug!(count = operations.len(), "Serving /operations request");
    Json(OperationsResponse { operations })
}
