pub(super) mod capabilities;
pub(super) mod chat;
pub(super) mod operations;
pub(super) mod owners;

use super::dto::ErrorResponse;
use crate::application::capability::CapabilityError;
use crate::application::router::RouterError;
use axum::Json;
use axum::http::StatusCode;
use tracing::warn;

pub(super) type Rejection = (StatusCode, Json<ErrorResponse>);

pub(super) fn rejection(status: StatusCode, error: impl Into<String>) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub(super) fn unknown_owner(id: &str) -> Rejection {
    rejection(StatusCode::NOT_FOUND, format!("owner '{id}' is not registered"))
}

/// 503 when the owner itself is unusable, 502 when it answered with a failure.
pub(super) fn owner_failure(err: CapabilityError) -> Rejection {
    let status = if err.is_connection_fault() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_GATEWAY
    };
    warn!(owner = err.owner(), %err, status = status.as_u16(), "Owner request failed");
    rejection(status, err.to_string())
}

pub(super) fn router_failure(err: RouterError) -> Rejection {
    match err {
        RouterError::UnknownOwner { id } => unknown_owner(&id),
        RouterError::Owner(err) => owner_failure(err),
        other => rejection(StatusCode::BAD_GATEWAY, other.to_string()),
    }
}
