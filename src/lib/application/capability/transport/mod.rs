//! Wire transports for capability servers.
//!
//! A transport moves JSON-RPC messages and reports the session token the
//! server assigns; interpreting the JSON-RPC envelope is left to the client.

mod http;
mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::config::{OwnerConfig, OwnerEndpoint};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("session token was rejected as expired or invalid")]
    SessionRejected,
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("connection closed before a reply arrived")]
    Closed,
}

impl TransportError {
    /// Whether the session can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Io(_) | Self::SessionRejected | Self::Closed
        )
    }
}

/// One outbound JSON-RPC message. Requests carry an id, notifications do not.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
}

impl RpcMessage {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut payload = json!({
            "jsonrpc": "2.0",
            "method": self.method,
            "params": self.params,
        });
        if let (Some(id), Value::Object(map)) = (self.id, &mut payload) {
            map.insert("id".to_string(), Value::from(id));
        }
        payload
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportReply {
    /// The JSON-RPC response matching the request; `None` for notifications.
    pub message: Option<Value>,
    /// Session token assigned or echoed by the server.
    pub session: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        message: RpcMessage,
        session: Option<&str>,
    ) -> Result<TransportReply, TransportError>;

    /// Terminates the session on the remote side.
    async fn close(&self, session: Option<&str>) -> Result<(), TransportError>;
}

/// Builds the transport matching an owner's configured endpoint.
pub fn for_owner(config: &OwnerConfig) -> Arc<dyn Transport> {
    match &config.endpoint {
        OwnerEndpoint::Http { url, headers } => {
            Arc::new(HttpTransport::new(config.id.clone(), url.clone(), headers))
        }
        OwnerEndpoint::Stdio {
            command,
            args,
            env,
            workdir,
        } => Arc::new(StdioTransport::new(
            config.id.clone(),
            command.clone(),
            args.clone(),
            env.clone(),
            workdir.clone(),
        )),
    }
}

pub(crate) fn response_id_matches(message: &Value, id: u64) -> bool {
    match message.get("id") {
        Some(Value::Number(number)) => number.as_u64() == Some(id),
        Some(Value::String(text)) => text.parse::<u64>().ok() == Some(id),
        _ => false,
    }
}
