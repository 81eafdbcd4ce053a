use crate::application::capability::{ContentBlock, Operation, Prompt, Resource, ResourceTemplate};
use crate::application::router::OwnerStatus;
use crate::domain::{ChatMessage, Conversation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

/// Either a full message history, a single prompt, or both (the prompt is
/// appended as the latest user turn).
#[derive(Debug, Deserialize, ToSchema)]
pub struct RestChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl RestChatRequest {
    /// `None` when there is nothing to answer.
    pub fn conversation(&self) -> Option<Conversation> {
        let mut conversation = Conversation::from_messages(self.messages.clone());
        if let Some(prompt) = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            conversation.push_user(prompt);
        }
        if conversation.last_user_text().is_some() {
            Some(conversation)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OperationsResponse {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OwnersResponse {
    pub owners: Vec<OwnerStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddOwnerRequest {
    pub id: String,
    /// Streamable HTTP endpoint URL.
    pub endpoint: Option<String>,
    /// Executable for a stdio server.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddOwnerResponse {
    pub id: String,
    pub connected: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconnectResponse {
    pub id: String,
    pub connected: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourcesResponse {
    pub resources: Vec<Resource>,
    pub templates: Vec<ResourceTemplate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadResourceQuery {
    /// Resource URI as listed by the server.
    pub uri: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceContentsResponse {
    pub uri: String,
    pub contents: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PromptsResponse {
    pub prompts: Vec<Prompt>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResolvePromptRequest {
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}
