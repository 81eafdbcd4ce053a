//! Router wiring over in-memory capability servers.

use super::CapabilityRouter;
use crate::application::capability::Transport;
use crate::application::capability::testing::FakeServer;
use crate::config::OwnerConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Unknown owner ids get an unreachable server.
pub(crate) fn router_over(servers: &[(&str, Arc<FakeServer>)]) -> CapabilityRouter {
    let servers: HashMap<String, Arc<FakeServer>> = servers
        .iter()
        .map(|(id, server)| (id.to_string(), Arc::clone(server)))
        .collect();
    CapabilityRouter::with_transport_factory(move |config: &OwnerConfig| -> Arc<dyn Transport> {
        match servers.get(&config.id) {
            Some(server) => Arc::clone(server) as Arc<dyn Transport>,
            None => Arc::new(FakeServer::new(&config.id).unreachable()),
        }
    })
}

pub(crate) fn owner(id: &str) -> OwnerConfig {
    OwnerConfig::http(id, format!("http://{id}.local/mcp"))
}
