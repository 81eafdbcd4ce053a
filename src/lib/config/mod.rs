pub mod app;
pub mod error;
pub mod loader;
pub mod provider;
pub mod server;

pub use crate::constants::CONFIG_PATH;

pub use app::{AppConfig, RestServerConfig, RetrievalConfig};
pub use error::ConfigError;
pub use provider::{ModelInfo, ModelProviderConfig};
pub use server::{OwnerConfig, OwnerEndpoint};
