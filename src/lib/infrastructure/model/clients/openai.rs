//! OpenAI-compatible client implementation

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::base::HttpClientBase;
use crate::config::ModelProviderConfig;
use crate::domain::InvocationRequest;
use crate::infrastructure::model::adapter::MessageAdapter;
use crate::infrastructure::model::factory::resolve_api_key;
use crate::infrastructure::model::traits::ModelClient;
use crate::infrastructure::model::types::{ModelChunk, ModelError, ModelRequest, ModelStream};

/// OpenAI-compatible client (works with OpenAI, Mistral, Groq, vLLM, etc.)
#[derive(Clone)]
pub struct OpenAIClient {
    base: HttpClientBase,
    api_path: String,
}

impl OpenAIClient {
    pub fn from_config(config: &ModelProviderConfig) -> Self {
        let api_key = resolve_api_key(&config.id, config.api_key.as_deref());
        Self {
            base: HttpClientBase::new(config.id.clone(), config.endpoint.clone(), api_key),
            api_path: config
                .api_path
                .clone()
                .unwrap_or_else(|| "/v1/chat/completions".to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let url = self.base.build_url(&self.api_path);

        let payload = OpenAIRequest {
            model: request.model.clone(),
            messages: MessageAdapter::to_openai_format(&request.messages),
            tools: MessageAdapter::to_function_tools(&request.tools),
            stream: true,
        };

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Streaming from OpenAI-compatible provider"
        );

        let builder = self.base.post_with_bearer(&url, &payload)?;
        let source = EventSource::new(builder)
            .map_err(|e| ModelError::stream(&self.base.id, e.to_string()))?;

        let state = SseState {
            source,
            decoder: SseDecoder::new(&self.base.id),
            done: false,
        };
        Ok(stream::unfold(state, next_chunk).boxed())
    }
}

struct SseState {
    source: EventSource,
    decoder: SseDecoder,
    done: bool,
}

async fn next_chunk(mut state: SseState) -> Option<(Result<ModelChunk, ModelError>, SseState)> {
    if state.done {
        return None;
    }
    loop {
        match state.source.next().await {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(message))) => {
                if message.data.trim() == "[DONE]" {
                    return finish(state);
                }
                match state.decoder.push(&message.data) {
                    Ok(Some(chunk)) => return Some((Ok(chunk), state)),
                    Ok(None) => continue,
                    Err(err) => {
                        state.source.close();
                        state.done = true;
                        return Some((Err(err), state));
                    }
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => return finish(state),
            Some(Err(err)) => {
                state.source.close();
                state.done = true;
                let err = ModelError::stream(&state.decoder.provider, err.to_string());
                return Some((Err(err), state));
            }
        }
    }
}

fn finish(mut state: SseState) -> Option<(Result<ModelChunk, ModelError>, SseState)> {
    state.source.close();
    state.done = true;
    debug!(provider = state.decoder.provider.as_str(), "OpenAI-compatible stream finished");
    match state.decoder.finish() {
        Ok(Some(chunk)) => Some((Ok(chunk), state)),
        Ok(None) => None,
        Err(err) => Some((Err(err), state)),
    }
}

/// Turns `chat.completion.chunk` frames into model chunks. Tool calls arrive
/// as fragments keyed by index and are only released once the stream ends.
pub(crate) struct SseDecoder {
    provider: String,
    calls: BTreeMap<usize, PendingCall>,
}

#[derive(Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl SseDecoder {
    pub(crate) fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            calls: BTreeMap::new(),
        }
    }

    pub(crate) fn push(&mut self, data: &str) -> Result<Option<ModelChunk>, ModelError> {
        let frame: StreamFrame = serde_json::from_str(data)
            .map_err(|e| ModelError::invalid_response(&self.provider, e.to_string()))?;
        if let Some(error) = frame.error {
            return Err(ModelError::stream(&self.provider, error.message));
        }

        let mut chunk = ModelChunk::default();
        for choice in frame.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta
                .reasoning_content
                .or(delta.reasoning)
                .filter(|text| !text.is_empty())
            {
                chunk.reasoning.get_or_insert_with(String::new).push_str(&reasoning);
            }
            if let Some(content) = delta.content.filter(|text| !text.is_empty()) {
                chunk.text.get_or_insert_with(String::new).push_str(&content);
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let pending = self.calls.entry(call.index).or_default();
                if let Some(id) = call.id {
                    pending.id = Some(id);
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name.filter(|_| pending.name.is_empty()) {
                        pending.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        pending.arguments.push_str(&arguments);
                    }
                }
            }
        }
        Ok((!chunk.is_empty()).then_some(chunk))
    }

    pub(crate) fn finish(&mut self) -> Result<Option<ModelChunk>, ModelError> {
        if self.calls.is_empty() {
            return Ok(None);
        }
        let mut invocations = Vec::with_capacity(self.calls.len());
        for (_, call) in std::mem::take(&mut self.calls) {
            if call.name.is_empty() {
                return Err(ModelError::invalid_response(
                    &self.provider,
                    "tool call without a function name",
                ));
            }
            let arguments = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(&call.arguments).map_err(|e| {
                    ModelError::invalid_response(
                        &self.provider,
                        format!("malformed arguments for '{}': {e}", call.name),
                    )
                })?
            };
            let id = call
                .id
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
            invocations.push(InvocationRequest::new(id, call.name, arguments));
        }
        Ok(Some(ModelChunk::invocations(invocations)))
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<FrameError>,
}

#[derive(Deserialize)]
struct FrameError {
    message: String,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
