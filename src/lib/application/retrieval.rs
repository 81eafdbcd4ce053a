//! Optional retrieval collaborator. Passages found for the latest user turn
//! are offered to the model as an extra system turn.

use crate::config::RetrievalConfig;
use crate::domain::Conversation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_id: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("retrieval request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("retrieval service returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// Posts `{query, top_k}` as JSON and accepts either a bare passage list or
/// `{"passages": [...]}`.
pub struct HttpRetriever {
    endpoint: String,
    http: Client,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: Client::new(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.endpoint.clone())
    }
}

#[derive(Serialize)]
struct RetrievalQuery<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RetrievalReply {
    Bare(Vec<RetrievedPassage>),
    Wrapped { passages: Vec<RetrievedPassage> },
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RetrievalQuery { query, top_k })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let passages = match response.json::<RetrievalReply>().await? {
            RetrievalReply::Bare(passages) | RetrievalReply::Wrapped { passages } => passages,
        };
        debug!(count = passages.len(), "Retrieved passages");
        Ok(passages.into_iter().take(top_k).collect())
    }
}

/// Renders passages as a system turn body, or `None` when there are none.
pub fn context_message(passages: &[RetrievedPassage]) -> Option<String> {
    if passages.is_empty() {
        return None;
    }
    let mut lines = vec!["Relevant context retrieved for this request:".to_string()];
    for (index, passage) in passages.iter().enumerate() {
        lines.push(format!(
            "[{}] ({}, score {:.2}) {}",
            index + 1,
            passage.source_id,
            passage.score,
            passage.text.trim()
        ));
    }
    Some(lines.join("\n"))
}

/// Prepends retrieved context for the latest user turn. Retrieval failures
/// are logged and the conversation is returned unchanged.
pub async fn with_context(
    retriever: Option<&dyn Retriever>,
    top_k: usize,
    conversation: Conversation,
) -> Conversation {
    let Some(retriever) = retriever else {
        return conversation;
    };
    let Some(query) = conversation.last_user_text().map(str::to_string) else {
        return conversation;
    };
    match retriever.retrieve(&query, top_k).await {
        Ok(passages) => match context_message(&passages) {
            Some(context) => conversation.with_leading_system(context),
            None => conversation,
        },
        Err(err) => {
            warn!(%err, "Retrieval failed; continuing without context");
            conversation
        }
    }
}
