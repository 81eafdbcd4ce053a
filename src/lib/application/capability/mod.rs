//! # Capability Client
//!
//! One [`CapabilityClient`] per remote capability server. The client performs
//! the handshake, keeps the server-assigned session token, and exposes the
//! server's operations, resources and prompts. It never retries; callers
//! decide what a failure means.

mod client;
mod error;
pub mod transport;
mod types;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use client::CapabilityClient;
pub use error::CapabilityError;
pub use transport::{Transport, TransportError};
pub use types::{
    ConnectionState, ContentBlock, InvocationOutcome, Operation, Prompt, PromptArgument,
    PromptMessage, ResolvedPrompt, Resource, ResourceTemplate, ServerIdentity,
};
