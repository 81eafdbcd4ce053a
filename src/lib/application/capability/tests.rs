use super::testing::{FakeReply, FakeServer};
use super::*;
use crate::domain::MessageRole;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn client_for(server: FakeServer) -> (CapabilityClient, Arc<FakeServer>) {
    let server = Arc::new(server);
    let client = CapabilityClient::new("inventory", server.clone());
    (client, server)
}

#[tokio::test]
async fn connect_stores_session_token_and_instructions() {
    let (client, _server) = client_for(FakeServer::new("inventory").with_tool("list_items"));

    client.connect().await.expect("connects");

    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(client.session_token().await.as_deref(), Some("session-inventory"));
    assert_eq!(
        client.instructions().await.as_deref(),
        Some("Use inventory for stock questions.")
    );
    assert_eq!(
        client.identity().await.map(|id| id.protocol_version),
        Some("2025-06-18".to_string())
    );
    assert!(client.connected_at().await.is_some());
}

#[tokio::test]
async fn connect_twice_fails_with_already_connected() {
    let (client, _server) = client_for(FakeServer::new("inventory"));
    client.connect().await.expect("connects");

    let second = client.connect().await;

    assert!(matches!(second, Err(CapabilityError::AlreadyConnected { .. })));
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_error() {
    let (client, _server) = client_for(FakeServer::new("inventory").unreachable());

    let result = client.connect().await;

    assert!(matches!(result, Err(CapabilityError::Connection { .. })));
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn protocol_mismatch_is_a_connection_error() {
    let (client, _server) = client_for(FakeServer::new("inventory").with_protocol("1999-01-01"));

    let result = client.connect().await;

    match result {
        Err(CapabilityError::Connection { reason, .. }) => {
            assert!(reason.contains("1999-01-01"));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn listing_before_connect_fails_with_not_connected() {
    let (client, server) = client_for(FakeServer::new("inventory").with_tool("list_items"));

    let result = client.list_operations().await;

    assert!(matches!(result, Err(CapabilityError::NotConnected { .. })));
    assert_eq!(server.list_calls(), 0);
}

#[tokio::test]
async fn lists_operations_tagged_with_owner() {
    let (client, _server) = client_for(
        FakeServer::new("inventory")
            .with_tool("list_items")
            .with_tool("get_details"),
    );
    client.connect().await.expect("connects");

    let operations = client.list_operations().await.expect("operations");

    let names: Vec<_> = operations.iter().map(|op| op.name.as_str()).collect();
    assert_eq!(names, vec!["list_items", "get_details"]);
    assert!(operations.iter().all(|op| op.owner_id == "inventory"));
}

#[tokio::test]
async fn invoke_returns_content_blocks() {
    let (client, server) = client_for(
        FakeServer::new("inventory")
            .with_tool("list_items")
            .with_reply("list_items", FakeReply::Text("apples, pears".into())),
    );
    client.connect().await.expect("connects");

    let outcome = client
        .invoke("list_items", serde_json::Value::Null)
        .await
        .expect("invocation succeeds");

    assert_eq!(outcome.render(), "apples, pears");
    assert_eq!(server.invocations(), vec![("list_items".to_string(), json!({}))]);
}

#[tokio::test]
async fn tool_level_error_is_an_invocation_error() {
    let (client, _server) = client_for(
        FakeServer::new("inventory")
            .with_tool("get_details")
            .with_reply("get_details", FakeReply::ToolError("item 9 not found".into())),
    );
    client.connect().await.expect("connects");

    let result = client.invoke("get_details", json!({ "item_id": 9 })).await;

    match result {
        Err(CapabilityError::Invocation {
            operation, detail, ..
        }) => {
            assert_eq!(operation, "get_details");
            assert_eq!(detail, "item 9 not found");
        }
        other => panic!("expected invocation error, got {other:?}"),
    }
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn rpc_error_on_invoke_is_an_invocation_error() {
    let (client, _server) = client_for(
        FakeServer::new("inventory")
            .with_reply("explode", FakeReply::RpcError("invalid params".into())),
    );
    client.connect().await.expect("connects");

    let result = client.invoke("explode", json!({})).await;

    assert!(matches!(
        result,
        Err(CapabilityError::Invocation { ref detail, .. }) if detail == "invalid params"
    ));
}

#[tokio::test]
async fn rejected_session_marks_client_disconnected() {
    let (client, server) = client_for(FakeServer::new("inventory").with_tool("list_items"));
    client.connect().await.expect("connects");
    server.expire_session();

    let result = client.list_operations().await;

    assert!(matches!(result, Err(CapabilityError::Connection { .. })));
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert!(client.session_token().await.is_none());
}

#[tokio::test]
async fn transport_failure_marks_client_disconnected() {
    let (client, server) = client_for(FakeServer::new("inventory").with_tool("list_items"));
    client.connect().await.expect("connects");
    server.set_unreachable(true);

    let result = client.invoke("list_items", json!({})).await;

    assert!(matches!(result, Err(CapabilityError::Transport { .. })));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn http_status_on_invoke_is_an_invocation_error_and_keeps_the_session() {
    let (client, server) = client_for(
        FakeServer::new("inventory")
            .with_tool("list_items")
            .with_reply("flaky", FakeReply::HttpStatus(500, "backend timeout".into()))
            .with_reply("blank", FakeReply::HttpStatus(502, String::new())),
    );
    client.connect().await.expect("connects");

    let flaky = client.invoke("flaky", json!({})).await;
    let blank = client.invoke("blank", json!({})).await;

    assert!(matches!(
        flaky,
        Err(CapabilityError::Invocation { ref detail, .. }) if detail == "backend timeout"
    ));
    assert!(matches!(
        blank,
        Err(CapabilityError::Invocation { ref detail, .. }) if detail == "HTTP 502"
    ));
    assert!(client.is_connected().await);
    assert_eq!(client.list_operations().await.expect("still listed").len(), 1);
    assert_eq!(server.invocations().len(), 2);
}

#[test]
fn only_session_ending_transport_errors_are_fatal() {
    assert!(TransportError::Closed.is_fatal());
    assert!(TransportError::SessionRejected.is_fatal());
    assert!(TransportError::Unreachable("refused".into()).is_fatal());
    assert!(
        !TransportError::Status {
            status: 500,
            body: String::new()
        }
        .is_fatal()
    );
    assert!(!TransportError::InvalidPayload("truncated".into()).is_fatal());
}

#[tokio::test]
async fn resource_and_prompt_accessors() {
    let (client, _server) = client_for(FakeServer::new("inventory"));
    client.connect().await.expect("connects");

    let resources = client.list_resources().await.expect("resources");
    assert_eq!(resources[0].uri, "memo://stock");
    assert_eq!(resources[0].mime_type.as_deref(), Some("text/plain"));

    let templates = client.list_resource_templates().await.expect("templates");
    assert_eq!(templates[0].uri_template, "memo://items/{id}");

    let contents = client.read_resource("memo://stock").await.expect("read");
    assert_eq!(contents[0].render(), "12 in stock");

    let prompts = client.list_prompts().await.expect("prompts");
    assert_eq!(prompts[0].name, "summarise");
    assert!(prompts[0].arguments[0].required);

    let mut args = HashMap::new();
    args.insert("category".to_string(), "books".to_string());
    let resolved = client.resolve_prompt("summarise", &args).await.expect("prompt");
    assert_eq!(resolved.messages[0].role, MessageRole::User);
    assert_eq!(resolved.messages[0].content.render(), "Summarise books");
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (client, server) = client_for(FakeServer::new("inventory"));
    client.connect().await.expect("connects");

    client.disconnect().await.expect("first disconnect");
    client.disconnect().await.expect("second disconnect");

    assert_eq!(server.close_calls(), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_before_connect_is_a_no_op() {
    let (client, server) = client_for(FakeServer::new("inventory"));

    client.disconnect().await.expect("no-op");

    assert_eq!(server.close_calls(), 0);
}

#[tokio::test]
async fn can_reconnect_after_disconnect() {
    let (client, _server) = client_for(FakeServer::new("inventory"));
    client.connect().await.expect("connects");
    client.disconnect().await.expect("disconnects");

    client.connect().await.expect("reconnects");

    assert!(client.is_connected().await);
}
