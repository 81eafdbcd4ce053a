//! Ollama client implementation

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::VecDeque;
use tracing::{debug, info};
use uuid::Uuid;

use super::base::HttpClientBase;
use crate::config::ModelProviderConfig;
use crate::domain::InvocationRequest;
use crate::infrastructure::model::adapter::MessageAdapter;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{ModelChunk, ModelError, ModelRequest, ModelStream};

/// Ollama client for local LLM
#[derive(Clone)]
pub struct OllamaClient {
    base: HttpClientBase,
}

impl OllamaClient {
    /// Creates client from provider config.
    pub fn from_config(config: &ModelProviderConfig) -> Self {
        Self {
            base: HttpClientBase::new(config.id.clone(), config.endpoint.clone(), None),
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let url = self.base.build_url("/api/chat");

        let payload = OllamaRequest {
            model: request.model.clone(),
            messages: MessageAdapter::to_ollama_format(&request.messages),
            tools: MessageAdapter::to_function_tools(&request.tools),
            stream: true,
        };

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Streaming from Ollama"
        );

        let response = self.base.post_no_auth(&url, &payload).await?;
        let state = NdjsonState {
            body: response
                .bytes_stream()
                .map(|part| part.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: NdjsonDecoder::new(&self.base.id),
            pending: VecDeque::new(),
            done: false,
        };
        Ok(stream::unfold(state, next_chunk).boxed())
    }
}

struct NdjsonState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<ModelChunk>,
    done: bool,
}

async fn next_chunk(
    mut state: NdjsonState,
) -> Option<(Result<ModelChunk, ModelError>, NdjsonState)> {
    loop {
        if let Some(chunk) = state.pending.pop_front() {
            return Some((Ok(chunk), state));
        }
        if state.done {
            return None;
        }
        let step = match state.body.next().await {
            Some(Ok(bytes)) => state.decoder.push(&bytes),
            Some(Err(err)) => Err(ModelError::network(&state.decoder.provider, err)),
            None => {
                state.done = true;
                debug!(provider = state.decoder.provider.as_str(), "Ollama stream finished");
                state.decoder.finish()
            }
        };
        match step {
            Ok(chunks) => state.pending.extend(chunks),
            Err(err) => {
                state.done = true;
                state.pending.clear();
                return Some((Err(err), state));
            }
        }
    }
}

/// Splits a newline-delimited JSON body into model chunks.
pub(crate) struct NdjsonDecoder {
    provider: String,
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub(crate) fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            buffer: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) -> Result<Vec<ModelChunk>, ModelError> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = self.parse_line(&line)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    pub(crate) fn finish(&mut self) -> Result<Vec<ModelChunk>, ModelError> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(self.parse_line(&rest)?.into_iter().collect())
    }

    fn parse_line(&self, line: &[u8]) -> Result<Option<ModelChunk>, ModelError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }
        let frame: OllamaFrame = serde_json::from_slice(line)
            .map_err(|e| ModelError::invalid_response(&self.provider, e.to_string()))?;
        if let Some(error) = frame.error {
            return Err(ModelError::stream(&self.provider, error));
        }
        let Some(message) = frame.message else {
            return Ok(None);
        };

        let mut invocations = Vec::new();
        for call in message.tool_calls.unwrap_or_default() {
            let arguments = match call.function.arguments {
                Value::Null => json!({}),
                Value::String(raw) if raw.trim().is_empty() => json!({}),
                Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
                    ModelError::invalid_response(
                        &self.provider,
                        format!("malformed arguments for '{}': {e}", call.function.name),
                    )
                })?,
                other => other,
            };
            let id = format!("call_{}", Uuid::new_v4().simple());
            invocations.push(InvocationRequest::new(id, call.function.name, arguments));
        }

        let chunk = ModelChunk {
            reasoning: message.thinking.filter(|text| !text.is_empty()),
            text: message.content.filter(|text| !text.is_empty()),
            invocations,
        };
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaFrame {
    message: Option<OllamaMessage>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: Option<String>,
    thinking: Option<String>,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}
