use super::{RpcMessage, Transport, TransportError, TransportReply, response_id_matches};
use crate::constants::SESSION_HEADER;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Streamable-HTTP style transport: every message is a POST, replies come
/// back as JSON or as a short SSE body.
pub struct HttpTransport {
    owner: String,
    url: String,
    headers: HeaderMap,
    http: Client,
}

impl HttpTransport {
    pub fn new(owner: String, url: String, extra_headers: &HashMap<String, String>) -> Self {
        let mut headers = HeaderMap::new();
        for (key, value) in extra_headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(owner = %owner, header = %key, "Ignoring invalid header"),
            }
        }
        Self {
            owner,
            url,
            headers,
            http: Client::new(),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_connect() || err.is_timeout() {
            TransportError::Unreachable(err.to_string())
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        message: RpcMessage,
        session: Option<&str>,
    ) -> Result<TransportReply, TransportError> {
        let mut builder = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&message.to_json());
        if let Some(token) = session {
            builder = builder.header(SESSION_HEADER, token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND && session.is_some() {
            return Err(TransportError::SessionRejected);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| session.map(str::to_string));

        let Some(id) = message.id else {
            return Ok(TransportReply {
                message: None,
                session,
            });
        };

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Io(err.to_string()))?;
        debug!(owner = %self.owner, method = %message.method, sse = is_sse, "Received reply");

        let reply = if is_sse {
            extract_sse_message(&body, id).ok_or_else(|| {
                TransportError::InvalidPayload(format!("no SSE message answered request {id}"))
            })?
        } else {
            serde_json::from_str::<Value>(&body)
                .map_err(|err| TransportError::InvalidPayload(err.to_string()))?
        };

        Ok(TransportReply {
            message: Some(reply),
            session,
        })
    }

    async fn close(&self, session: Option<&str>) -> Result<(), TransportError> {
        let Some(token) = session else {
            return Ok(());
        };
        let response = self
            .http
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, token)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;
        let status = response.status();
        // Servers without explicit session teardown answer 405.
        if status.is_success()
            || status == StatusCode::METHOD_NOT_ALLOWED
            || status == StatusCode::NOT_FOUND
        {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }
}

/// Picks the JSON-RPC response for `id` out of an SSE body.
pub(crate) fn extract_sse_message(body: &str, id: u64) -> Option<Value> {
    let mut data = String::new();
    let mut found = None;
    let mut flush = |data: &mut String| {
        if data.is_empty() {
            return;
        }
        if let Ok(value) = serde_json::from_str::<Value>(data) {
            if found.is_none() && response_id_matches(&value, id) {
                found = Some(value);
            }
        }
        data.clear();
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);
    found
}
