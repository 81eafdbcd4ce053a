//! # Agent Module
//!
//! A bounded loop that alternates model passes with routed invocations and
//! reports everything it does as an ordered stream of [`ProgressChunk`]s.
//!
//! ## Key Types
//!
//! - [`AgentLoop`] - Starts runs against a model backend and a router
//! - [`RunConfig`] - Provider, model and optional system prompt for a run
//! - [`ChunkStream`] - The consumer end of a run; dropping it cancels the run
//! - [`RunTranscript`] - A finished run folded into one value
//!
//! ## Loop
//!
//! 1. Stream a model pass with the current operation set
//! 2. No invocation requests: that text is the final answer
//! 3. Otherwise dispatch each request in order and feed the results back
//! 4. After the cycle limit, force one tool-free pass as the final answer

mod chunk;
mod errors;
mod instructions;
mod runner;
mod stream;

pub use chunk::{ProgressChunk, RunTranscript, TranscriptStep};
pub use errors::{AgentError, InvocationFailure};
pub use instructions::{FORCE_FINAL_INSTRUCTION, compose_system_instructions};
pub use runner::{AgentLoop, RunConfig};
pub use stream::ChunkStream;
