use super::error::ConfigError;
use super::provider::ModelProviderConfig;
use super::server::OwnerConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Application configuration loaded from client.toml
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub default_provider: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub providers: Vec<ModelProviderConfig>,
    pub servers: Vec<OwnerConfig>,
    pub rest_server: RestServerConfig,
    pub retrieval: Option<RetrievalConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RestServerConfig {
    #[serde(default)]
    pub bind: Option<SocketAddr>,
}

/// Where the retrieval collaborator lives and how many passages to request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub endpoint: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    crate::constants::DEFAULT_RETRIEVAL_TOP_K
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        super::loader::parse_config(content, Path::new("<inline>"))
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = &OwnerConfig> {
        self.servers.iter().filter(|server| server.enabled)
    }

    pub fn provider(&self, id: &str) -> Option<&ModelProviderConfig> {
        self.providers.iter().find(|provider| provider.id == id)
    }
}
