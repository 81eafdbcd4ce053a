use crate::domain::{MessageRole, ParameterSchema};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A named, invokable capability advertised by one owner.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Operation {
    pub name: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub input_schema: Value,
    pub parameters: ParameterSchema,
    pub owner_id: String,
}

impl Operation {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        let parameters = ParameterSchema::from_json_schema(&input_schema);
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            parameters,
            owner_id: owner_id.into(),
        }
    }

    pub(super) fn from_wire(owner_id: &str, tool: &Value) -> Option<Self> {
        let name = tool.get("name").and_then(Value::as_str)?;
        let description = tool
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = tool
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));
        Some(Self::new(owner_id, name, description, schema))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Binary {
        mime_type: String,
        /// Base64-encoded payload as sent by the server.
        data: String,
    },
    Resource {
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        blob: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub(super) fn from_wire(block: &Value) -> Option<Self> {
        let kind = block.get("type").and_then(Value::as_str)?;
        let field = |name: &str| block.get(name).and_then(Value::as_str).map(str::to_string);
        match kind {
            "text" => Some(ContentBlock::Text {
                text: field("text").unwrap_or_default(),
            }),
            "image" | "audio" => Some(ContentBlock::Binary {
                mime_type: field("mimeType").unwrap_or_else(|| "application/octet-stream".into()),
                data: field("data").unwrap_or_default(),
            }),
            "resource" => block.get("resource").and_then(Self::from_resource_contents),
            "resource_link" => Some(ContentBlock::Resource {
                uri: field("uri")?,
                mime_type: field("mimeType"),
                text: None,
                blob: None,
            }),
            _ => None,
        }
    }

    pub(super) fn from_resource_contents(contents: &Value) -> Option<Self> {
        let field = |name: &str| {
            contents
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Some(ContentBlock::Resource {
            uri: field("uri")?,
            mime_type: field("mimeType"),
            text: field("text"),
            blob: field("blob"),
        })
    }

    /// Decodes binary payloads. Text blocks yield their UTF-8 bytes.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match self {
            ContentBlock::Text { text } => Some(text.as_bytes().to_vec()),
            ContentBlock::Binary { data, .. } => STANDARD.decode(data).ok(),
            ContentBlock::Resource { text: Some(text), .. } => Some(text.as_bytes().to_vec()),
            ContentBlock::Resource { blob: Some(blob), .. } => STANDARD.decode(blob).ok(),
            ContentBlock::Resource { .. } => None,
        }
    }

    /// Model-facing rendering of the block.
    pub fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Binary { mime_type, .. } => {
                let size = self.bytes().map(|bytes| bytes.len()).unwrap_or_default();
                format!("[binary content: {mime_type}, {size} bytes]")
            }
            ContentBlock::Resource {
                text: Some(text), ..
            } => text.clone(),
            ContentBlock::Resource { uri, mime_type, .. } => match mime_type {
                Some(mime) => format!("[resource {uri} ({mime})]"),
                None => format!("[resource {uri}]"),
            },
        }
    }
}

pub(super) fn blocks_from_wire(value: Option<&Value>) -> Vec<ContentBlock> {
    value
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().filter_map(ContentBlock::from_wire).collect())
        .unwrap_or_default()
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InvocationOutcome {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub structured: Option<Value>,
}

impl InvocationOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured: None,
        }
    }

    /// Joins the blocks into the text fed back to the model.
    pub fn render(&self) -> String {
        if self.content.is_empty() {
            return self
                .structured
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
        }
        self.content
            .iter()
            .map(ContentBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: ContentBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResolvedPrompt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Identity reported by the server during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}
