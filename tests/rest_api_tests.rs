// REST surface end to end: capability servers and the model backend are
// in-process doubles, the app is served on an ephemeral port.

mod support;

use serde_json::{Value, json};
use std::sync::Arc;
use support::{
    McpMock, OllamaMock, closed_addr, ndjson_answer, ndjson_tool_call, schema_with_string, spawn,
};
use toolrelay::AppConfig;
use toolrelay::router::CapabilityRouter;

struct Harness {
    base: String,
    http: reqwest::Client,
    ollama: Arc<OllamaMock>,
    inventory: Arc<McpMock>,
    router: Arc<CapabilityRouter>,
}

async fn harness(replies: Vec<String>) -> Harness {
    let inventory =
        Arc::new(McpMock::new("inventory").tool("lookup_stock", schema_with_string("sku")));
    let inventory_url = Arc::clone(&inventory).start().await;
    let ollama = Arc::new(OllamaMock::new(replies));
    let ollama_url = Arc::clone(&ollama).start().await;

    let config = AppConfig::from_toml_str(&format!(
        r#"model = "qwen3:8b"
default_provider = "ollama"

[[providers]]
id = "ollama"
type = "ollama"
endpoint = "{ollama_url}"
models = ["qwen3:8b"]

[[servers]]
id = "inventory"
endpoint = "{inventory_url}"
"#
    ))
    .expect("config");

    let router = Arc::new(CapabilityRouter::new());
    router
        .add_owners(config.enabled_servers().cloned())
        .await;
    let service = toolrelay::build_service(&config, Arc::clone(&router), None);
    let addr = spawn(toolrelay::server::app(service)).await;

    Harness {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        ollama,
        inventory,
        router,
    }
}

fn tool_then_answer() -> Vec<String> {
    vec![
        ndjson_tool_call("lookup_stock", json!({ "sku": "A1" })),
        ndjson_answer(&["There are ", "12 units."]),
    ]
}

#[tokio::test]
async fn lists_operations_and_owners() {
    let h = harness(Vec::new()).await;

    let operations: Value = h
        .http
        .get(format!("{}/operations", h.base))
        .send()
        .await
        .expect("operations")
        .json()
        .await
        .expect("json");
    assert_eq!(operations["operations"][0]["name"], "lookup_stock");
    assert_eq!(operations["operations"][0]["owner_id"], "inventory");

    let owners: Value = h
        .http
        .get(format!("{}/owners", h.base))
        .send()
        .await
        .expect("owners")
        .json()
        .await
        .expect("json");
    assert_eq!(owners["owners"][0]["id"], "inventory");
    assert_eq!(owners["owners"][0]["state"], "connected");
}

#[tokio::test]
async fn chat_runs_the_loop_and_returns_a_transcript() {
    let h = harness(tool_then_answer()).await;

    let response = h
        .http
        .post(format!("{}/chat", h.base))
        .json(&json!({ "prompt": "How many A1 are in stock?" }))
        .send()
        .await
        .expect("chat");
    assert_eq!(response.status(), 200);
    let transcript: Value = response.json().await.expect("json");

    assert_eq!(transcript["answer"], "There are 12 units.");
    assert_eq!(transcript["forced"], false);
    assert_eq!(transcript["cycles"], 2);
    assert_eq!(transcript["steps"][0]["name"], "lookup_stock");
    assert_eq!(
        transcript["steps"][0]["output"],
        r#"inventory handled lookup_stock with {"sku":"A1"}"#
    );
    assert_eq!(transcript["steps"][0]["is_error"], false);

    let requests = h.ollama.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["tools"][0]["function"]["name"], "lookup_stock");
    let follow_up = requests[1]["messages"].as_array().expect("messages");
    assert_eq!(follow_up.last().expect("tool turn")["role"], "tool");
    assert!(h.inventory.methods().contains(&"tools/call".to_string()));
}

#[tokio::test]
async fn chat_stream_emits_one_event_per_chunk() {
    let h = harness(tool_then_answer()).await;

    let response = h
        .http
        .post(format!("{}/chat/stream", h.base))
        .json(&json!({ "messages": [{ "role": "user", "content": "Stock for A1?" }] }))
        .send()
        .await
        .expect("stream");
    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("body");

    let events: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("event:").map(str::trim))
        .collect();
    assert_eq!(
        events,
        vec![
            "cycle",
            "invocation_started",
            "observation",
            "invocation_result",
            "cycle",
            "answer_token",
            "answer_token",
            "final",
        ]
    );
    assert!(body.contains(r#""type":"final""#));
}

#[tokio::test]
async fn chat_without_user_turn_is_rejected() {
    let h = harness(Vec::new()).await;

    let response = h
        .http
        .post(format!("{}/chat", h.base))
        .json(&json!({ "prompt": "   " }))
        .send()
        .await
        .expect("chat");
    assert_eq!(response.status(), 400);
    assert!(h.ollama.requests().is_empty());
}

#[tokio::test]
async fn model_failure_maps_to_bad_gateway() {
    let h = harness(Vec::new()).await;

    let response = h
        .http
        .post(format!("{}/chat", h.base))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .expect("chat");
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn owners_can_be_added_at_runtime() {
    let h = harness(Vec::new()).await;
    let files = Arc::new(McpMock::new("files").tool("read_file", schema_with_string("path")));
    let files_url = Arc::clone(&files).start().await;

    let added: Value = h
        .http
        .post(format!("{}/owners", h.base))
        .json(&json!({ "id": "files", "endpoint": files_url }))
        .send()
        .await
        .expect("add owner")
        .json()
        .await
        .expect("json");
    assert_eq!(added, json!({ "id": "files", "connected": true }));
    assert!(h.router.client("files").await.is_some());

    let rejected = h
        .http
        .post(format!("{}/owners", h.base))
        .json(&json!({ "id": "broken" }))
        .send()
        .await
        .expect("add owner");
    assert_eq!(rejected.status(), 400);
}

#[tokio::test]
async fn owner_resources_and_prompts_are_browsable() {
    let h = harness(Vec::new()).await;

    let resources: Value = h
        .http
        .get(format!("{}/owners/inventory/resources", h.base))
        .send()
        .await
        .expect("resources")
        .json()
        .await
        .expect("json");
    assert_eq!(resources["resources"][0]["uri"], "stock://levels");
    assert_eq!(resources["templates"][0]["uri_template"], "stock://sku/{sku}");

    let read: Value = h
        .http
        .get(format!("{}/owners/inventory/resources/read", h.base))
        .query(&[("uri", "stock://levels")])
        .send()
        .await
        .expect("read")
        .json()
        .await
        .expect("json");
    assert_eq!(read["uri"], "stock://levels");
    assert_eq!(read["contents"][0]["text"], "inventory levels: A1=12");

    let prompts: Value = h
        .http
        .get(format!("{}/owners/inventory/prompts", h.base))
        .send()
        .await
        .expect("prompts")
        .json()
        .await
        .expect("json");
    assert_eq!(prompts["prompts"][0]["name"], "restock");
    assert_eq!(prompts["prompts"][0]["arguments"][0]["required"], true);

    let resolved: Value = h
        .http
        .post(format!("{}/owners/inventory/prompts/restock", h.base))
        .json(&json!({ "arguments": { "sku": "A1" } }))
        .send()
        .await
        .expect("resolve")
        .json()
        .await
        .expect("json");
    assert_eq!(resolved["messages"][0]["content"]["text"], "Restock A1");

    let missing = h
        .http
        .get(format!("{}/owners/ghost/prompts", h.base))
        .send()
        .await
        .expect("prompts");
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn reconnect_reports_owner_health() {
    let h = harness(Vec::new()).await;
    let offline = format!("http://{}/mcp", closed_addr().await);
    let added: Value = h
        .http
        .post(format!("{}/owners", h.base))
        .json(&json!({ "id": "offline", "endpoint": offline }))
        .send()
        .await
        .expect("add owner")
        .json()
        .await
        .expect("json");
    assert_eq!(added["connected"], false);

    let healthy = h
        .http
        .post(format!("{}/owners/inventory/reconnect", h.base))
        .send()
        .await
        .expect("reconnect");
    assert_eq!(healthy.status(), 200);
    let body: Value = healthy.json().await.expect("json");
    assert_eq!(body, json!({ "id": "inventory", "connected": true }));

    let unreachable = h
        .http
        .post(format!("{}/owners/offline/reconnect", h.base))
        .send()
        .await
        .expect("reconnect");
    assert_eq!(unreachable.status(), 503);
    let body: Value = unreachable.json().await.expect("json");
    assert!(body["error"].as_str().is_some_and(|e| e.contains("offline")));

    let unknown = h
        .http
        .post(format!("{}/owners/ghost/reconnect", h.base))
        .send()
        .await
        .expect("reconnect");
    assert_eq!(unknown.status(), 404);

    let browse_offline = h
        .http
        .get(format!("{}/owners/offline/resources", h.base))
        .send()
        .await
        .expect("resources");
    assert_eq!(browse_offline.status(), 503);
}

#[tokio::test]
async fn failing_tool_call_keeps_the_owner_connected() {
    let h = harness(vec![
        ndjson_tool_call("restock", json!({ "sku": "A1" })),
        ndjson_answer(&["Restock is unavailable."]),
    ])
    .await;
    let flaky = Arc::new(McpMock::new("flaky").failing_tool("restock", schema_with_string("sku")));
    let flaky_url = Arc::clone(&flaky).start().await;
    h.http
        .post(format!("{}/owners", h.base))
        .json(&json!({ "id": "flaky", "endpoint": flaky_url }))
        .send()
        .await
        .expect("add owner");

    let transcript: Value = h
        .http
        .post(format!("{}/chat", h.base))
        .json(&json!({ "prompt": "Restock A1" }))
        .send()
        .await
        .expect("chat")
        .json()
        .await
        .expect("json");

    assert_eq!(transcript["answer"], "Restock is unavailable.");
    assert_eq!(transcript["steps"][0]["name"], "restock");
    assert_eq!(transcript["steps"][0]["is_error"], true);
    assert!(
        transcript["steps"][0]["output"]
            .as_str()
            .is_some_and(|output| output.contains("backend timeout"))
    );

    let client = h.router.client("flaky").await.expect("registered");
    assert!(client.is_connected().await);
    assert!(flaky.methods().contains(&"tools/call".to_string()));
}
