//! Model infrastructure module
//!
//! Streaming LLM backends behind one trait, with a factory for new providers.
//!
//! # Structure
//! - `types` - Request, chunk, tool spec and error types
//! - `traits` - ModelBackend, ModelClient traits
//! - `adapter` - Message format adapters
//! - `factory` - Provider factory for creating clients
//! - `clients` - Individual client implementations
//! - `provider` - DynamicModelProvider for routing

pub mod adapter;
pub mod clients;
pub mod factory;
pub mod provider;
pub mod traits;
pub mod types;

pub use provider::DynamicModelProvider;
pub use traits::{ModelBackend, ModelClient};
pub use types::{ModelChunk, ModelError, ModelRequest, ModelStream, ToolSpec};
