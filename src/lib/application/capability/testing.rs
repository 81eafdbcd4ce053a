//! In-memory capability server used by unit tests across the crate.

use super::transport::{RpcMessage, Transport, TransportError, TransportReply};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub(crate) enum FakeReply {
    Text(String),
    ToolError(String),
    RpcError(String),
    HttpStatus(u16, String),
}

pub(crate) struct FakeServer {
    owner: String,
    token: String,
    protocol: Mutex<String>,
    tools: Mutex<Vec<Value>>,
    replies: Mutex<HashMap<String, FakeReply>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    invocations: Mutex<Vec<(String, Value)>>,
    list_calls: AtomicUsize,
    close_calls: AtomicUsize,
    unreachable: AtomicBool,
    session_expired: AtomicBool,
}

impl FakeServer {
    pub(crate) fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            token: format!("session-{owner}"),
            protocol: Mutex::new("2025-06-18".to_string()),
            tools: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            invocations: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
            session_expired: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_tool(self, name: &str) -> Self {
        self.add_tool(name, json!({ "type": "object", "properties": {} }));
        self
    }

    pub(crate) fn with_tool_schema(self, name: &str, schema: Value) -> Self {
        self.add_tool(name, schema);
        self
    }

    pub(crate) fn with_reply(self, name: &str, reply: FakeReply) -> Self {
        self.replies.lock().unwrap().insert(name.to_string(), reply);
        self
    }

    /// Holds requests for `key` until `gate` is notified. The key is the
    /// operation name for `tools/call` and the method name otherwise.
    pub(crate) fn with_gate(self, key: &str, gate: Arc<Notify>) -> Self {
        self.gates.lock().unwrap().insert(key.to_string(), gate);
        self
    }

    pub(crate) fn with_protocol(self, version: &str) -> Self {
        *self.protocol.lock().unwrap() = version.to_string();
        self
    }

    pub(crate) fn unreachable(self) -> Self {
        self.set_unreachable(true);
        self
    }

    pub(crate) fn add_tool(&self, name: &str, schema: Value) {
        self.tools.lock().unwrap().push(json!({
            "name": name,
            "description": format!("{name} from {}", self.owner),
            "inputSchema": schema,
        }));
    }

    pub(crate) fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub(crate) fn expire_session(&self) {
        self.session_expired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }

    fn gate_key(message: &RpcMessage) -> String {
        match message.method.as_str() {
            "tools/call" => message.params["name"].as_str().unwrap_or_default().to_string(),
            other => other.to_string(),
        }
    }

    fn result(id: Option<u64>, result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }

    fn error(id: Option<u64>, message: &str) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32602, "message": message } })
    }

    fn handle(&self, message: &RpcMessage) -> Value {
        let id = message.id;
        match message.method.as_str() {
            "initialize" => Self::result(
                id,
                json!({
                    "protocolVersion": *self.protocol.lock().unwrap(),
                    "serverInfo": { "name": self.owner, "version": "1.0.0" },
                    "capabilities": { "tools": {} },
                    "instructions": format!("Use {} for stock questions.", self.owner),
                }),
            ),
            "tools/list" => {
                self.list_calls.fetch_add(1, Ordering::SeqCst);
                Self::result(id, json!({ "tools": *self.tools.lock().unwrap() }))
            }
            "tools/call" => {
                let name = message.params["name"].as_str().unwrap_or_default().to_string();
                self.invocations
                    .lock()
                    .unwrap()
                    .push((name.clone(), message.params["arguments"].clone()));
                let reply = self.replies.lock().unwrap().get(&name).cloned();
                match reply {
                    Some(FakeReply::Text(text)) => Self::result(
                        id,
                        json!({ "content": [{ "type": "text", "text": text }], "isError": false }),
                    ),
                    Some(FakeReply::ToolError(text)) => Self::result(
                        id,
                        json!({ "content": [{ "type": "text", "text": text }], "isError": true }),
                    ),
                    Some(FakeReply::RpcError(text)) => Self::error(id, &text),
                    Some(FakeReply::HttpStatus(status, _)) => Self::error(id, &format!("HTTP {status}")),
                    None => Self::result(
                        id,
                        json!({ "content": [{ "type": "text", "text": format!("{}:{name}", self.owner) }] }),
                    ),
                }
            }
            "resources/list" => Self::result(
                id,
                json!({ "resources": [{ "uri": "memo://stock", "name": "stock", "mimeType": "text/plain" }] }),
            ),
            "resources/templates/list" => Self::result(
                id,
                json!({ "resourceTemplates": [{ "uriTemplate": "memo://items/{id}", "name": "item" }] }),
            ),
            "resources/read" => Self::result(
                id,
                json!({ "contents": [{ "uri": message.params["uri"], "mimeType": "text/plain", "text": "12 in stock" }] }),
            ),
            "prompts/list" => Self::result(
                id,
                json!({ "prompts": [{
                    "name": "summarise",
                    "description": "Summarise stock",
                    "arguments": [{ "name": "category", "required": true }]
                }] }),
            ),
            "prompts/get" => Self::result(
                id,
                json!({
                    "description": "Summarise stock",
                    "messages": [{
                        "role": "user",
                        "content": { "type": "text", "text": format!("Summarise {}", message.params["arguments"]["category"].as_str().unwrap_or_default()) }
                    }]
                }),
            ),
            other => Self::error(id, &format!("unknown method {other}")),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(
        &self,
        message: RpcMessage,
        session: Option<&str>,
    ) -> Result<TransportReply, TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        if message.method != "initialize"
            && (session != Some(self.token.as_str()) || self.session_expired.load(Ordering::SeqCst))
        {
            return Err(TransportError::SessionRejected);
        }
        let gate = self.gates.lock().unwrap().get(&Self::gate_key(&message)).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if message.method == "tools/call" {
            let name = Self::gate_key(&message);
            let reply = self.replies.lock().unwrap().get(&name).cloned();
            if let Some(FakeReply::HttpStatus(status, body)) = reply {
                self.invocations
                    .lock()
                    .unwrap()
                    .push((name, message.params["arguments"].clone()));
                return Err(TransportError::Status { status, body });
            }
        }
        if message.id.is_none() {
            return Ok(TransportReply {
                message: None,
                session: session.map(str::to_string),
            });
        }
        Ok(TransportReply {
            message: Some(self.handle(&message)),
            session: Some(self.token.clone()),
        })
    }

    async fn close(&self, _session: Option<&str>) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        Ok(())
    }
}
