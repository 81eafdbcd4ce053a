use super::chunk::ProgressChunk;
use super::errors::{AgentError, InvocationFailure};
use super::instructions::{FORCE_FINAL_INSTRUCTION, compose_system_instructions};
use super::stream::{ChunkStream, Emitter};
use crate::application::capability::Operation;
use crate::application::router::CapabilityRouter;
use crate::constants::{CHUNK_CHANNEL_CAPACITY, MAX_ITERATIONS};
use crate::domain::{Conversation, InvocationRequest};
use crate::infrastructure::model::{ModelBackend, ModelRequest, ToolSpec};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model and prompt selection for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub provider: String,
    pub model: String,
    pub system_prompt: Option<String>,
}

impl RunConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }
}

/// Drives model passes and routed invocations for a conversation.
#[derive(Clone)]
pub struct AgentLoop {
    backend: Arc<dyn ModelBackend>,
    router: Arc<CapabilityRouter>,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn ModelBackend>, router: Arc<CapabilityRouter>) -> Self {
        Self { backend, router }
    }

    pub fn router(&self) -> &Arc<CapabilityRouter> {
        &self.router
    }

    /// Starts a run in the background and hands back its chunk stream.
    pub fn run(&self, config: RunConfig, conversation: Conversation) -> ChunkStream {
        let (emitter, stream) = ChunkStream::channel(CHUNK_CHANNEL_CAPACITY);
        let worker = RunWorker {
            backend: Arc::clone(&self.backend),
            router: Arc::clone(&self.router),
            config,
            emitter,
        };
        tokio::spawn(worker.drive(conversation));
        stream
    }
}

#[derive(Default)]
struct Pass {
    text: String,
    invocations: Vec<InvocationRequest>,
}

struct RunWorker {
    backend: Arc<dyn ModelBackend>,
    router: Arc<CapabilityRouter>,
    config: RunConfig,
    emitter: Emitter,
}

impl RunWorker {
    async fn drive(self, conversation: Conversation) {
        info!(
            provider = self.config.provider.as_str(),
            model = self.config.model.as_str(),
            turns = conversation.len(),
            "Agent run started"
        );
        match self.execute(conversation).await {
            Ok(()) => info!("Agent run finished"),
            Err(AgentError::Cancelled) => debug!("Agent run cancelled"),
            Err(err) => {
                warn!(%err, "Agent run failed on model backend");
                let chunk = ProgressChunk::Error {
                    message: err.user_message(),
                };
                if self.emitter.emit(chunk).await.is_err() {
                    debug!("Consumer left before the error chunk was delivered");
                }
            }
        }
    }

    async fn execute(&self, conversation: Conversation) -> Result<(), AgentError> {
        let usable = self.emitter.guard(self.router.has_usable_owners()).await?;
        let (operations, guidance) = if usable {
            (
                self.emitter.guard(self.router.list_all_operations()).await?,
                self.emitter.guard(self.router.owner_instructions()).await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let system = compose_system_instructions(
            &operations,
            &guidance,
            self.config.system_prompt.as_deref(),
        );
        let mut working = conversation.with_leading_system(system);

        if operations.is_empty() {
            debug!("No operations bound; single reasoning pass");
            let pass = self.generate(&working, &[]).await?;
            if !pass.invocations.is_empty() {
                warn!(
                    dropped = pass.invocations.len(),
                    "Model requested invocations with no operations bound"
                );
            }
            return self
                .emitter
                .emit(ProgressChunk::Final {
                    answer: pass.text,
                    forced: false,
                })
                .await;
        }

        let tools: Vec<ToolSpec> = operations.iter().map(ToolSpec::from).collect();
        for number in 1..=MAX_ITERATIONS {
            self.emitter
                .emit(ProgressChunk::Cycle {
                    number,
                    limit: MAX_ITERATIONS,
                })
                .await?;

            let pass = self.generate(&working, &tools).await?;
            if pass.invocations.is_empty() {
                info!(cycles = number, "Model produced a final answer");
                return self
                    .emitter
                    .emit(ProgressChunk::Final {
                        answer: pass.text,
                        forced: false,
                    })
                    .await;
            }

            debug!(
                cycle = number,
                requests = pass.invocations.len(),
                "Dispatching invocation requests"
            );
            working.push_assistant(pass.text, pass.invocations.clone());
            for request in pass.invocations {
                let text = self.invoke(&request, &operations).await?;
                working.push_tool_result(request.id, request.name, text);
            }
        }

        warn!(limit = MAX_ITERATIONS, "Cycle limit reached; forcing final answer");
        working.push_user(FORCE_FINAL_INSTRUCTION);
        let pass = self.generate(&working, &[]).await?;
        if !pass.invocations.is_empty() {
            warn!(
                dropped = pass.invocations.len(),
                "Ignoring invocation requests from the forced final pass"
            );
        }
        self.emitter
            .emit(ProgressChunk::Final {
                answer: pass.text,
                forced: true,
            })
            .await
    }

    /// One streamed model pass. Returns the accumulated text and requests.
    async fn generate(&self, working: &Conversation, tools: &[ToolSpec]) -> Result<Pass, AgentError> {
        let request = ModelRequest {
            provider: self.config.provider.clone(),
            model: self.config.model.clone(),
            messages: working.messages().to_vec(),
            tools: tools.to_vec(),
        };
        let mut stream = self.emitter.guard(self.backend.stream(request)).await??;

        let mut pass = Pass::default();
        while let Some(item) = self.emitter.guard(stream.next()).await? {
            let chunk = item?;
            if let Some(text) = chunk.reasoning.filter(|text| !text.is_empty()) {
                self.emitter.emit(ProgressChunk::Reasoning { text }).await?;
            }
            if let Some(text) = chunk.text.filter(|text| !text.is_empty()) {
                pass.text.push_str(&text);
                self.emitter.emit(ProgressChunk::AnswerToken { text }).await?;
            }
            pass.invocations.extend(chunk.invocations);
        }
        Ok(pass)
    }

    /// Emits the started/observation/result triple and returns the text to
    /// feed back to the model. Failures become results.
    async fn invoke(
        &self,
        request: &InvocationRequest,
        operations: &[Operation],
    ) -> Result<String, AgentError> {
        self.emitter
            .emit(ProgressChunk::InvocationStarted {
                request_id: request.id.clone(),
                name: request.name.clone(),
                arguments: request.arguments.clone(),
            })
            .await?;

        let (text, is_error) = match self.emitter.guard(self.dispatch(request, operations)).await? {
            Ok(text) => (text, false),
            Err(failure) => {
                warn!(operation = request.name.as_str(), %failure, "Invocation failed");
                (failure.observation(), true)
            }
        };

        self.emitter
            .emit(ProgressChunk::Observation {
                name: request.name.clone(),
                text: text.clone(),
                is_error,
            })
            .await?;
        self.emitter
            .emit(ProgressChunk::InvocationResult {
                request_id: request.id.clone(),
                name: request.name.clone(),
                text: text.clone(),
                is_error,
            })
            .await?;
        Ok(text)
    }

    async fn dispatch(
        &self,
        request: &InvocationRequest,
        operations: &[Operation],
    ) -> Result<String, InvocationFailure> {
        if let Some(operation) = operations.iter().find(|op| op.name == request.name) {
            operation
                .parameters
                .validate(&request.arguments)
                .map_err(|violation| InvocationFailure::InvalidArguments {
                    name: request.name.clone(),
                    violation,
                })?;
        }
        let outcome = self
            .router
            .invoke(&request.name, request.arguments.clone())
            .await?;
        Ok(outcome.render())
    }
}
