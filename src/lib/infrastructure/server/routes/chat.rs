use super::super::dto::{ErrorResponse, RestChatRequest};
use super::super::state::ServerState;
use super::Rejection;
use crate::application::agent::{ProgressChunk, RunTranscript};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

fn empty_conversation() -> Rejection {
    error!("Rejecting chat request without a user turn");
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "request needs a prompt or at least one user message".to_string(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = RestChatRequest,
    responses(
        (status = 200, description = "Run finished", body = RunTranscript),
        (status = 400, description = "Nothing to answer", body = ErrorResponse),
        (status = 502, description = "Model backend failed", body = ErrorResponse)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<RestChatRequest>,
) -> Result<Json<RunTranscript>, Rejection> {
    let conversation = payload.conversation().ok_or_else(empty_conversation)?;
    info!(
        turns = conversation.len(),
        provider = payload.provider.as_deref(),
        model = payload.model.as_deref(),
        "Received /chat request"
    );

    let transcript = state
        .service()
        .start(conversation, payload.provider, payload.model)
        .await
        .into_transcript()
        .await;

    match (&transcript.answer, &transcript.error) {
        (None, Some(message)) => {
            error!(%message, "Agent run failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: message.clone(),
                }),
            ))
        }
        _ => Ok(Json(transcript)),
    }
}

#[utoipa::path(
    post,
    path = "/chat/stream",
    tag = "chat",
    request_body = RestChatRequest,
    responses(
        (status = 200, description = "One server-sent event per progress chunk", content_type = "text/event-stream", body = ProgressChunk),
        (status = 400, description = "Nothing to answer", body = ErrorResponse)
    )
)]
pub async fn chat_stream_handler(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<RestChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Rejection> {
    let conversation = payload.conversation().ok_or_else(empty_conversation)?;
    info!(turns = conversation.len(), "Received /chat/stream request");

    let chunks = state
        .service()
        .start(conversation, payload.provider, payload.model)
        .await;
    let events = chunks.map(|chunk| Ok(to_event(&chunk)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `event:` is the chunk type, `data:` the chunk as JSON.
fn to_event(chunk: &ProgressChunk) -> Event {
    match Event::default().event(chunk.kind()).json_data(chunk) {
        Ok(event) => event,
        Err(err) => {
            warn!(%err, kind = chunk.kind(), "Failed to encode progress chunk");
            Event::default().event("error").data(err.to_string())
        }
    }
}
