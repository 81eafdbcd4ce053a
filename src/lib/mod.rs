pub mod application;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, capability, retrieval, router, service, stdio};
pub use cli::{Cli, RunMode};
pub use config::{AppConfig, ModelProviderConfig, OwnerConfig};
pub use infrastructure::{model, server};

use agent::{AgentLoop, RunConfig};
use constants::DEFAULT_REST_ADDR;
use infrastructure::model::DynamicModelProvider;
use retrieval::HttpRetriever;
use router::CapabilityRouter;
use service::ChatService;
use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mode = cli.mode;
    init_tracing(matches!(mode, RunMode::Stdio | RunMode::All));
    info!("Starting toolrelay");
    debug!(
        mode = ?mode,
        config = ?cli.config,
        system = ?cli.system,
        "CLI arguments parsed"
    );

    let config_path = cli.config.as_deref().map(Path::new);
    let config = AppConfig::load(config_path)?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "Loaded configuration from file");
    } else {
        info!("Loaded configuration from default path");
    }

    let router = Arc::new(CapabilityRouter::new());
    let configured = config.enabled_servers().count();
    let connected = router.add_owners(config.enabled_servers().cloned()).await;
    info!(configured, connected, "Capability servers registered");
    if connected == 0 && configured > 0 {
        warn!("No capability server is reachable; answering without tools");
    }

    let service = build_service(&config, Arc::clone(&router), cli.system.clone());
    let rest_addr = match cli.rest_addr.or(config.rest_server.bind) {
        Some(addr) => addr,
        None => DEFAULT_REST_ADDR.parse::<SocketAddr>()?,
    };

    info!(mode = ?mode, "Running in selected mode");
    match mode {
        RunMode::Stdio => {
            let result = stdio::run(service).await;
            shutdown(&router).await;
            result?;
        }
        RunMode::Rest => {
            server::serve(service, rest_addr).await?;
        }
        RunMode::All => {
            let rest_service = service.clone();
            let rest_handle = tokio::spawn(async move {
                if let Err(e) = server::serve(rest_service, rest_addr).await {
                    tracing::error!(error = %e, "REST server error");
                }
            });

            let stdio_result = stdio::run(service).await;
            rest_handle.abort();
            shutdown(&router).await;
            stdio_result?;
        }
    }
    info!("toolrelay finished");
    Ok(())
}

/// Wires the model providers, agent loop and optional retriever from config.
pub fn build_service(
    config: &AppConfig,
    router: Arc<CapabilityRouter>,
    system_override: Option<String>,
) -> ChatService {
    debug!(
        provider_count = config.providers.len(),
        "Initializing dynamic model providers"
    );
    let backend = Arc::new(DynamicModelProvider::from_configs(&config.providers));
    let defaults = RunConfig::new(config.default_provider.clone(), config.model.clone())
        .with_system_prompt(system_override.or_else(|| config.system_prompt.clone()));
    let service = ChatService::new(AgentLoop::new(backend, router), defaults);
    match &config.retrieval {
        Some(retrieval) => {
            info!(endpoint = retrieval.endpoint.as_str(), "Retrieval enabled");
            service.with_retriever(Arc::new(HttpRetriever::from_config(retrieval)), retrieval.top_k)
        }
        None => service,
    }
}

async fn shutdown(router: &CapabilityRouter) {
    if let Err(err) = router.remove_all_owners().await {
        warn!(%err, "Capability servers did not all disconnect cleanly");
    }
}

fn init_tracing(quiet: bool) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = if quiet {
            EnvFilter::new("off")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        };
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
