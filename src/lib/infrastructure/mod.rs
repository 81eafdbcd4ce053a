//! Outward-facing adapters: LLM backends and the REST/SSE server.

pub mod model;
pub mod server;
