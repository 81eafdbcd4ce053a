use super::agent::{AgentLoop, ChunkStream, RunConfig};
use super::retrieval::{self, Retriever};
use super::router::CapabilityRouter;
use crate::constants::DEFAULT_RETRIEVAL_TOP_K;
use crate::domain::Conversation;
use std::sync::Arc;

/// What the front ends (stdio, REST) share: the agent loop, default model
/// selection and an optional retriever.
#[derive(Clone)]
pub struct ChatService {
    agent: AgentLoop,
    defaults: RunConfig,
    retriever: Option<Arc<dyn Retriever>>,
    top_k: usize,
}

impl ChatService {
    pub fn new(agent: AgentLoop, defaults: RunConfig) -> Self {
        Self {
            agent,
            defaults,
            retriever: None,
            top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self
    }

    pub fn router(&self) -> &Arc<CapabilityRouter> {
        self.agent.router()
    }

    pub fn defaults(&self) -> &RunConfig {
        &self.defaults
    }

    /// Starts a run, overriding provider and model when given.
    pub async fn start(
        &self,
        conversation: Conversation,
        provider: Option<String>,
        model: Option<String>,
    ) -> ChunkStream {
        let config = RunConfig {
            provider: provider.unwrap_or_else(|| self.defaults.provider.clone()),
            model: model.unwrap_or_else(|| self.defaults.model.clone()),
            system_prompt: self.defaults.system_prompt.clone(),
        };
        let conversation =
            retrieval::with_context(self.retriever.as_deref(), self.top_k, conversation).await;
        self.agent.run(config, conversation)
    }
}
