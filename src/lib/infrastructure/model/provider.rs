//! Dynamic model provider with multiple backends

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::factory::ProviderFactory;
use super::traits::{ModelBackend, ModelClient};
use super::types::{ModelError, ModelRequest, ModelStream};
use crate::config::ModelProviderConfig;

/// Runtime container for a provider backend
struct ProviderRuntime {
    models: HashSet<String>,
    client: Box<dyn ModelClient>,
}

impl ProviderRuntime {
    fn supports(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.contains(model)
    }
}

/// Routes each request to the backend registered under its provider id.
#[derive(Default)]
pub struct DynamicModelProvider {
    backends: HashMap<String, ProviderRuntime>,
}

impl DynamicModelProvider {
    pub fn from_configs(configs: &[ModelProviderConfig]) -> Self {
        let backends = configs
            .iter()
            .map(|config| {
                let models = config.models.iter().map(|m| m.name.clone()).collect();
                let client = ProviderFactory::create(config);
                (config.id.clone(), ProviderRuntime { models, client })
            })
            .collect();
        Self { backends }
    }

    /// Registers (or replaces) a client under its own id.
    pub fn register(&mut self, client: Box<dyn ModelClient>, models: &[&str]) {
        let models = models.iter().map(|m| m.to_string()).collect();
        self.backends
            .insert(client.id().to_string(), ProviderRuntime { models, client });
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.backends.contains_key(provider)
    }
}

#[async_trait]
impl ModelBackend for DynamicModelProvider {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let provider_id = &request.provider;

        let runtime = self
            .backends
            .get(provider_id)
            .ok_or_else(|| ModelError::provider_not_found(provider_id))?;

        if !runtime.supports(&request.model) {
            return Err(ModelError::model_not_found(provider_id, &request.model));
        }

        runtime.client.stream(request).await
    }
}
