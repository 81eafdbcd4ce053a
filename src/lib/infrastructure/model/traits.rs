//! Model traits

use super::types::{ModelError, ModelRequest, ModelStream};
use async_trait::async_trait;

/// Anything the agent loop can stream a conversation through.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Start generating. The returned stream yields output units as they
    /// arrive and ends when the model is done.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}

/// Trait for individual model clients
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Get the client ID
    fn id(&self) -> &str;

    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}
