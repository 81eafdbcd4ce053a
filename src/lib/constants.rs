//! Application constants
//!
//! Single source of truth for paths and other constants.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/client.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Default REST bind address when neither CLI nor config provide one
pub const DEFAULT_REST_ADDR: &str = "127.0.0.1:8080";

/// Upper bound on reasoning/acting cycles in one agent run
pub const MAX_ITERATIONS: usize = 10;

/// Capacity of the progress chunk channel between the loop and its consumer
pub const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Passages requested from the retrieval collaborator when unset
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 4;

/// Protocol version offered during the capability handshake
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions accepted from capability servers
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Header carrying the server-assigned session token
pub const SESSION_HEADER: &str = "Mcp-Session-Id";
