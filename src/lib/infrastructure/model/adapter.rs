//! Message adapters - convert between different API formats

use super::types::ToolSpec;
use crate::domain::{ChatMessage, MessageRole};
use serde_json::{Value, json};

/// Adapter for converting messages to different API formats
pub struct MessageAdapter;

impl MessageAdapter {
    /// OpenAI chat-completions messages. Invocation requests become
    /// `tool_calls` with string-encoded arguments; tool turns carry
    /// `tool_call_id`.
    pub fn to_openai_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if !msg.invocations.is_empty() => {
                    let calls: Vec<Value> = msg
                        .invocations
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    json!({
                        "role": "assistant",
                        "content": msg.content,
                        "tool_calls": calls,
                    })
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.invocation_id.clone().unwrap_or_default(),
                    "content": msg.content,
                }),
                role => json!({
                    "role": role.as_str(),
                    "content": msg.content,
                }),
            })
            .collect()
    }

    /// Ollama `/api/chat` messages. Arguments stay as JSON objects and tool
    /// turns name the operation instead of a call id.
    pub fn to_ollama_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if !msg.invocations.is_empty() => {
                    let calls: Vec<Value> = msg
                        .invocations
                        .iter()
                        .map(|call| {
                            json!({
                                "function": { "name": call.name, "arguments": call.arguments }
                            })
                        })
                        .collect();
                    json!({
                        "role": "assistant",
                        "content": msg.content,
                        "tool_calls": calls,
                    })
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_name": msg.operation.clone().unwrap_or_default(),
                    "content": msg.content,
                }),
                role => json!({
                    "role": role.as_str(),
                    "content": msg.content,
                }),
            })
            .collect()
    }

    /// Function-calling tool list; both APIs accept this shape.
    pub fn to_function_tools(tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}
