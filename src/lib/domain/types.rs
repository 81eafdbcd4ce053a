use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// A model-issued request to call a named operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvocationRequest {
    pub id: String,
    pub name: String,
    #[schema(value_type = Object)]
    pub arguments: Value,
}

impl InvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Invocation requests carried by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<InvocationRequest>,
    /// Correlates a tool turn with the request it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Operation name a tool turn answers for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            invocations: Vec::new(),
            invocation_id: None,
            operation: None,
        }
    }

    pub fn assistant(content: impl Into<String>, invocations: Vec<InvocationRequest>) -> Self {
        Self {
            invocations,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    pub fn tool_result(
        invocation_id: impl Into<String>,
        operation: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            operation: Some(operation.into()),
            ..Self::new(MessageRole::Tool, content)
        }
    }
}

/// Ordered, append-only list of turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(MessageRole::System, content));
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::new(MessageRole::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, invocations: Vec<InvocationRequest>) {
        self.push(ChatMessage::assistant(content, invocations));
    }

    pub fn push_tool_result(
        &mut self,
        invocation_id: impl Into<String>,
        operation: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.push(ChatMessage::tool_result(invocation_id, operation, content));
    }

    /// Places a system turn ahead of everything except leading system turns.
    pub fn with_leading_system(mut self, content: impl Into<String>) -> Self {
        let position = self
            .messages
            .iter()
            .take_while(|message| message.role == MessageRole::System)
            .count();
        self.messages
            .insert(position, ChatMessage::new(MessageRole::System, content));
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
    }
}
