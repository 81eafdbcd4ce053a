pub mod schema;
pub mod types;

pub use schema::{ParameterField, ParameterSchema, PrimitiveKind, SchemaViolation};
pub use types::{ChatMessage, Conversation, InvocationRequest, MessageRole};
