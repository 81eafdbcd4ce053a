use super::docs::ApiDoc;
use super::error::ServerError;
use super::routes;
use super::state::ServerState;
use crate::application::service::ChatService;
use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// The full HTTP surface, ready to be served.
pub fn app(service: ChatService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let state = Arc::new(ServerState::new(service));
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/chat", post(routes::chat::chat_handler))
        .route("/chat/stream", post(routes::chat::chat_stream_handler))
        .route("/operations", get(routes::operations::operations_handler))
        .route(
            "/owners",
            get(routes::owners::owners_handler).post(routes::owners::add_owner_handler),
        )
        .route("/owners/{id}/reconnect", post(routes::owners::reconnect_handler))
        .route(
            "/owners/{id}/resources",
            get(routes::capabilities::resources_handler),
        )
        .route(
            "/owners/{id}/resources/read",
            get(routes::capabilities::read_resource_handler),
        )
        .route("/owners/{id}/prompts", get(routes::capabilities::prompts_handler))
        .route(
            "/owners/{id}/prompts/{name}",
            post(routes::capabilities::resolve_prompt_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Serves until Ctrl+C, then disconnects every capability server.
pub async fn serve(service: ChatService, addr: SocketAddr) -> Result<(), ServerError> {
    info!(%addr, "Binding REST server");
    let router = Arc::clone(service.router());
    let app = app(service);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "REST server ready to accept connections");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = router.remove_all_owners().await {
        warn!(%err, "Capability servers did not all disconnect cleanly");
    }
    info!("REST server stopped");
    served.map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(%err, "Failed to install Ctrl+C handler; serving until the process is killed");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received, shutting down");
}
