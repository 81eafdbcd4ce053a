use super::error::CapabilityError;
use super::transport::{RpcMessage, Transport, TransportError, TransportReply};
use super::types::{
    ConnectionState, ContentBlock, InvocationOutcome, Operation, Prompt, PromptArgument,
    PromptMessage, ResolvedPrompt, Resource, ResourceTemplate, ServerIdentity, blocks_from_wire,
};
use crate::constants::{PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
use crate::domain::MessageRole;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Listing calls follow `nextCursor` at most this many pages.
const MAX_LIST_PAGES: usize = 32;

#[derive(Debug, Clone)]
struct Session {
    state: ConnectionState,
    token: Option<String>,
    instructions: Option<String>,
    identity: Option<ServerIdentity>,
    connected_at: Option<DateTime<Utc>>,
}

impl Session {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            token: None,
            instructions: None,
            identity: None,
            connected_at: None,
        }
    }
}

/// Talks to exactly one capability server.
pub struct CapabilityClient {
    owner_id: String,
    transport: Arc<dyn Transport>,
    session: RwLock<Session>,
    id_counter: AtomicU64,
}

impl CapabilityClient {
    pub fn new(owner_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            owner_id: owner_id.into(),
            transport,
            session: RwLock::new(Session::disconnected()),
            id_counter: AtomicU64::new(1),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.read().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn session_token(&self) -> Option<String> {
        self.session.read().await.token.clone()
    }

    /// Guidance the server returned from the handshake, if any.
    pub async fn instructions(&self) -> Option<String> {
        self.session.read().await.instructions.clone()
    }

    pub async fn identity(&self) -> Option<ServerIdentity> {
        self.session.read().await.identity.clone()
    }

    pub async fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.connected_at
    }

    pub async fn connect(&self) -> Result<(), CapabilityError> {
        {
            let mut session = self.session.write().await;
            if session.state != ConnectionState::Disconnected {
                return Err(CapabilityError::AlreadyConnected {
                    owner: self.owner_id.clone(),
                });
            }
            session.state = ConnectionState::Connecting;
        }

        match self.handshake().await {
            Ok(established) => {
                if let Some(identity) = &established.identity {
                    info!(
                        owner = %self.owner_id,
                        server = %identity.name,
                        protocol = %identity.protocol_version,
                        "Connected to capability server"
                    );
                }
                *self.session.write().await = established;
                Ok(())
            }
            Err(err) => {
                warn!(owner = %self.owner_id, %err, "Capability handshake failed");
                *self.session.write().await = Session::disconnected();
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> Result<Session, CapabilityError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let reply = self
            .transport
            .send(self.next_request("initialize", params), None)
            .await
            .map_err(|err| self.connection_error(err.to_string()))?;
        let token = reply.session.clone();
        let result = self
            .unwrap_envelope(reply)
            .map_err(|err| self.connection_error(err.to_string()))?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&protocol_version.as_str()) {
            return Err(self.connection_error(format!(
                "unsupported protocol version '{protocol_version}'"
            )));
        }

        let server_info = result.get("serverInfo");
        let field = |name: &str| {
            server_info
                .and_then(|info| info.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let identity = ServerIdentity {
            name: field("name"),
            version: field("version"),
            protocol_version,
        };

        self.transport
            .send(
                RpcMessage::notification("notifications/initialized", json!({})),
                token.as_deref(),
            )
            .await
            .map_err(|err| self.connection_error(err.to_string()))?;

        Ok(Session {
            state: ConnectionState::Connected,
            token,
            instructions: result
                .get("instructions")
                .and_then(Value::as_str)
                .map(str::to_string),
            identity: Some(identity),
            connected_at: Some(Utc::now()),
        })
    }

    pub async fn list_operations(&self) -> Result<Vec<Operation>, CapabilityError> {
        let pages = self.list_paginated("tools/list", "tools").await?;
        Ok(pages
            .iter()
            .filter_map(|tool| Operation::from_wire(&self.owner_id, tool))
            .collect())
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<InvocationOutcome, CapabilityError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        debug!(owner = %self.owner_id, operation = name, "Invoking operation");
        let result = self
            .call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
            .map_err(|err| match err {
                CapabilityError::Rpc { owner, message, .. } => CapabilityError::Invocation {
                    owner,
                    operation: name.to_string(),
                    detail: message,
                },
                CapabilityError::Transport {
                    owner,
                    source: TransportError::Status { status, body },
                } => CapabilityError::Invocation {
                    owner,
                    operation: name.to_string(),
                    detail: if body.trim().is_empty() {
                        format!("HTTP {status}")
                    } else {
                        body
                    },
                },
                other => other,
            })?;

        let outcome = InvocationOutcome {
            content: blocks_from_wire(result.get("content")),
            structured: result.get("structuredContent").cloned(),
        };
        if result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(CapabilityError::Invocation {
                owner: self.owner_id.clone(),
                operation: name.to_string(),
                detail: outcome.render(),
            });
        }
        Ok(outcome)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, CapabilityError> {
        let entries = self.list_paginated("resources/list", "resources").await?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                Some(Resource {
                    uri: entry.get("uri").and_then(Value::as_str)?.to_string(),
                    name: string_field(entry, "name").unwrap_or_default(),
                    description: string_field(entry, "description"),
                    mime_type: string_field(entry, "mimeType"),
                })
            })
            .collect())
    }

    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, CapabilityError> {
        let entries = self
            .list_paginated("resources/templates/list", "resourceTemplates")
            .await?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                Some(ResourceTemplate {
                    uri_template: entry.get("uriTemplate").and_then(Value::as_str)?.to_string(),
                    name: string_field(entry, "name").unwrap_or_default(),
                    description: string_field(entry, "description"),
                    mime_type: string_field(entry, "mimeType"),
                })
            })
            .collect())
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ContentBlock>, CapabilityError> {
        let result = self.call("resources/read", json!({ "uri": uri })).await?;
        Ok(result
            .get("contents")
            .and_then(Value::as_array)
            .map(|contents| {
                contents
                    .iter()
                    .filter_map(ContentBlock::from_resource_contents)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, CapabilityError> {
        let entries = self.list_paginated("prompts/list", "prompts").await?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let arguments = entry
                    .get("arguments")
                    .and_then(Value::as_array)
                    .map(|args| {
                        args.iter()
                            .filter_map(|arg| {
                                Some(PromptArgument {
                                    name: arg.get("name").and_then(Value::as_str)?.to_string(),
                                    description: string_field(arg, "description"),
                                    required: arg
                                        .get("required")
                                        .and_then(Value::as_bool)
                                        .unwrap_or(false),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Prompt {
                    name: entry.get("name").and_then(Value::as_str)?.to_string(),
                    description: string_field(entry, "description"),
                    arguments,
                })
            })
            .collect())
    }

    pub async fn resolve_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<ResolvedPrompt, CapabilityError> {
        let result = self
            .call("prompts/get", json!({ "name": name, "arguments": arguments }))
            .await?;
        let messages = result
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| {
                        let role = message
                            .get("role")
                            .and_then(Value::as_str)
                            .and_then(MessageRole::parse)?;
                        let content = message.get("content").and_then(ContentBlock::from_wire)?;
                        Some(PromptMessage { role, content })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ResolvedPrompt {
            description: string_field(&result, "description"),
            messages,
        })
    }

    /// Best-effort session teardown. Calling it while disconnected is a no-op.
    pub async fn disconnect(&self) -> Result<(), CapabilityError> {
        let previous = {
            let mut session = self.session.write().await;
            if session.state == ConnectionState::Disconnected {
                return Ok(());
            }
            std::mem::replace(&mut *session, Session::disconnected())
        };

        info!(owner = %self.owner_id, "Disconnecting from capability server");
        self.transport
            .close(previous.token.as_deref())
            .await
            .map_err(|source| CapabilityError::Transport {
                owner: self.owner_id.clone(),
                source,
            })
    }

    async fn list_paginated(&self, method: &str, key: &str) -> Result<Vec<Value>, CapabilityError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.call(method, params).await?;
            if let Some(page) = result.get(key).and_then(Value::as_array) {
                items.extend(page.iter().cloned());
            }
            cursor = string_field(&result, "nextCursor");
            if cursor.is_none() {
                return Ok(items);
            }
        }
        warn!(owner = %self.owner_id, method, "Stopped following pagination cursor");
        Ok(items)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CapabilityError> {
        let token = {
            let session = self.session.read().await;
            if session.state != ConnectionState::Connected {
                return Err(CapabilityError::NotConnected {
                    owner: self.owner_id.clone(),
                });
            }
            session.token.clone()
        };

        let reply = match self
            .transport
            .send(self.next_request(method, params), token.as_deref())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_fatal() {
                    self.mark_disconnected(&err).await;
                }
                return Err(match err {
                    TransportError::SessionRejected => {
                        self.connection_error("session token rejected by server")
                    }
                    source => CapabilityError::Transport {
                        owner: self.owner_id.clone(),
                        source,
                    },
                });
            }
        };
        self.unwrap_envelope(reply)
    }

    fn unwrap_envelope(&self, reply: TransportReply) -> Result<Value, CapabilityError> {
        let message = reply.message.ok_or_else(|| CapabilityError::InvalidResponse {
            owner: self.owner_id.clone(),
            reason: "missing reply".into(),
        })?;

        if let Some(error) = message.get("error") {
            return Err(CapabilityError::Rpc {
                owner: self.owner_id.clone(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(message.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn mark_disconnected(&self, cause: &TransportError) {
        let mut session = self.session.write().await;
        if session.state == ConnectionState::Connected {
            warn!(owner = %self.owner_id, %cause, "Capability server became unreachable");
            *session = Session::disconnected();
        }
    }

    fn next_request(&self, method: &str, params: Value) -> RpcMessage {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        RpcMessage::request(id, method, params)
    }

    fn connection_error(&self, reason: impl Into<String>) -> CapabilityError {
        CapabilityError::Connection {
            owner: self.owner_id.clone(),
            reason: reason.into(),
        }
    }
}

fn string_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}
