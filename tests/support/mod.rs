//! In-process HTTP doubles shared by the integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Serves `app` on an ephemeral local port.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr")
}

/// A capability server speaking JSON-RPC over streamable HTTP.
pub struct McpMock {
    name: String,
    tools: Vec<Value>,
    failing: Vec<String>,
    sse: bool,
    methods: Mutex<Vec<String>>,
    deletes: AtomicUsize,
}

impl McpMock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            failing: Vec::new(),
            sse: false,
            methods: Mutex::new(Vec::new()),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn tool(mut self, name: &str, schema: Value) -> Self {
        self.tools.push(json!({
            "name": name,
            "description": format!("{name} on {}", self.name),
            "inputSchema": schema,
        }));
        self
    }

    /// A tool whose calls fail with HTTP 500 instead of a JSON-RPC reply.
    pub fn failing_tool(mut self, name: &str, schema: Value) -> Self {
        self = self.tool(name, schema);
        self.failing.push(name.to_string());
        self
    }

    /// Answer requests with `text/event-stream` bodies.
    pub fn sse(mut self) -> Self {
        self.sse = true;
        self
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn session(&self) -> String {
        format!("session-{}", self.name)
    }

    pub async fn start(self: Arc<Self>) -> String {
        let app = Router::new()
            .route("/mcp", post(mcp_post).delete(mcp_delete))
            .with_state(self);
        format!("http://{}/mcp", spawn(app).await)
    }
}

/// Object schema with one required string field.
pub fn schema_with_string(field: &str) -> Value {
    json!({
        "type": "object",
        "properties": { field: { "type": "string" } },
        "required": [field],
    })
}

async fn mcp_post(
    State(mock): State<Arc<McpMock>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let message: Value = serde_json::from_str(&body).expect("json-rpc body");
    let method = message["method"].as_str().unwrap_or_default().to_string();
    mock.methods.lock().unwrap().push(method.clone());

    let Some(id) = message.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    if method != "initialize" {
        let token = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok());
        if token != Some(mock.session().as_str()) {
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    let payload = match method.as_str() {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2025-06-18",
                "serverInfo": { "name": mock.name, "version": "1.0.0" },
                "capabilities": { "tools": {} },
                "instructions": format!("{} answers stock questions", mock.name),
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": mock.tools }
        }),
        "tools/call" => {
            let name = message["params"]["name"].as_str().unwrap_or_default();
            if mock.failing.iter().any(|failing| failing == name) {
                return (StatusCode::INTERNAL_SERVER_ERROR, "backend timeout").into_response();
            }
            if mock.tools.iter().any(|tool| tool["name"] == name) {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{
                            "type": "text",
                            "text": format!("{} handled {name} with {}", mock.name, message["params"]["arguments"]),
                        }]
                    }
                })
            } else {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32602, "message": format!("Unknown tool: {name}") }
                })
            }
        }
        "resources/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "resources": [{ "uri": "stock://levels", "name": "levels", "mimeType": "text/plain" }] }
        }),
        "resources/templates/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "resourceTemplates": [{ "uriTemplate": "stock://sku/{sku}", "name": "sku" }] }
        }),
        "resources/read" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "contents": [{
                "uri": message["params"]["uri"],
                "mimeType": "text/plain",
                "text": format!("{} levels: A1=12", mock.name),
            }] }
        }),
        "prompts/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "prompts": [{
                "name": "restock",
                "description": "Plan a restock",
                "arguments": [{ "name": "sku", "required": true }]
            }] }
        }),
        "prompts/get" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "description": "Plan a restock",
                "messages": [{
                    "role": "user",
                    "content": {
                        "type": "text",
                        "text": format!("Restock {}", message["params"]["arguments"]["sku"].as_str().unwrap_or("?")),
                    }
                }]
            }
        }),
        other => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("Method not found: {other}") }
        }),
    };

    let (content_type, body) = if mock.sse {
        (
            "text/event-stream",
            format!("event: message\ndata: {payload}\n\n"),
        )
    } else {
        ("application/json", payload.to_string())
    };
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::HeaderName::from_static("mcp-session-id"),
                mock.session(),
            ),
        ],
        body,
    )
        .into_response()
}

async fn mcp_delete(State(mock): State<Arc<McpMock>>) -> StatusCode {
    mock.deletes.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// An Ollama-style `/api/chat` endpoint replaying scripted NDJSON bodies.
pub struct OllamaMock {
    replies: Vec<String>,
    requests: Mutex<Vec<Value>>,
    served: AtomicUsize,
}

impl OllamaMock {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            requests: Mutex::new(Vec::new()),
            served: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn start(self: Arc<Self>) -> String {
        let app = Router::new()
            .route("/api/chat", post(ollama_chat))
            .with_state(self);
        format!("http://{}", spawn(app).await)
    }
}

async fn ollama_chat(State(mock): State<Arc<OllamaMock>>, body: String) -> Response {
    mock.requests
        .lock()
        .unwrap()
        .push(serde_json::from_str(&body).expect("chat body"));
    let index = mock.served.fetch_add(1, Ordering::SeqCst);
    let Some(reply) = mock.replies.get(index).cloned() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "script exhausted").into_response();
    };
    ([(header::CONTENT_TYPE, "application/x-ndjson")], reply).into_response()
}

/// NDJSON body for a plain streamed answer.
pub fn ndjson_answer(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        body.push_str(&json!({ "message": { "role": "assistant", "content": part }, "done": false }).to_string());
        body.push('\n');
    }
    body.push_str(&json!({ "message": { "role": "assistant", "content": "" }, "done": true }).to_string());
    body.push('\n');
    body
}

/// NDJSON body requesting a single tool call.
pub fn ndjson_tool_call(name: &str, arguments: Value) -> String {
    let mut body = json!({
        "message": {
            "role": "assistant",
            "content": "",
            "tool_calls": [{ "function": { "name": name, "arguments": arguments } }]
        },
        "done": false
    })
    .to_string();
    body.push('\n');
    body.push_str(&json!({ "message": { "role": "assistant", "content": "" }, "done": true }).to_string());
    body.push('\n');
    body
}
