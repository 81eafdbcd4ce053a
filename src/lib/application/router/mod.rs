//! # Capability Router
//!
//! Aggregates every owner's operations into one flat namespace and routes
//! invocations by name. A `name -> owner id` cache makes repeat dispatches
//! direct; a miss falls back to asking each connected owner in turn.
//!
//! Lock order is always `owners` before `routes`. Network I/O never happens
//! while either lock is held.

mod error;
#[cfg(test)]
pub(crate) mod testing;

pub use error::RouterError;

use crate::application::capability::{
    CapabilityClient, ConnectionState, InvocationOutcome, Operation, ServerIdentity, Transport,
    transport,
};
use crate::config::OwnerConfig;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

type TransportFactory = Arc<dyn Fn(&OwnerConfig) -> Arc<dyn Transport> + Send + Sync>;

struct OwnerSlot {
    config: OwnerConfig,
    client: Arc<CapabilityClient>,
}

impl OwnerSlot {
    fn id(&self) -> &str {
        &self.config.id
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnerStatus {
    pub id: String,
    pub endpoint: String,
    pub state: ConnectionState,
    pub operations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub connected_at: Option<DateTime<Utc>>,
}

pub struct CapabilityRouter {
    owners: RwLock<Vec<Arc<OwnerSlot>>>,
    routes: RwLock<HashMap<String, String>>,
    transports: TransportFactory,
}

impl Default for CapabilityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRouter {
    pub fn new() -> Self {
        Self::with_transport_factory(transport::for_owner)
    }

    /// Builds a router whose owners talk through transports produced by
    /// `factory` instead of the configured endpoints.
    pub fn with_transport_factory<F>(factory: F) -> Self
    where
        F: Fn(&OwnerConfig) -> Arc<dyn Transport> + Send + Sync + 'static,
    {
        Self {
            owners: RwLock::new(Vec::new()),
            routes: RwLock::new(HashMap::new()),
            transports: Arc::new(factory),
        }
    }

    /// Connects a new owner and caches its operations. Never fails: an owner
    /// that cannot connect is registered as disconnected and skipped.
    /// Returns whether the owner is connected.
    pub async fn add_owner(&self, config: OwnerConfig) -> bool {
        let client = Arc::new(CapabilityClient::new(
            config.id.clone(),
            (self.transports)(&config),
        ));
        let slot = Arc::new(OwnerSlot { config, client });

        let operations = match slot.client.connect().await {
            Ok(()) => match slot.client.list_operations().await {
                Ok(operations) => operations,
                Err(err) => {
                    warn!(owner = slot.id(), %err, "Owner connected but listing operations failed");
                    Vec::new()
                }
            },
            Err(err) => {
                warn!(
                    owner = slot.id(),
                    endpoint = %slot.config.endpoint,
                    %err,
                    "Owner unavailable; continuing with reduced capacity"
                );
                Vec::new()
            }
        };

        let connected = slot.client.is_connected().await;
        let replaced = self.register(Arc::clone(&slot), &operations).await;
        if let Some(previous) = replaced {
            if let Err(err) = previous.client.disconnect().await {
                debug!(owner = previous.id(), %err, "Replaced owner did not disconnect cleanly");
            }
        }
        if connected {
            info!(
                owner = slot.id(),
                operations = operations.len(),
                "Owner registered"
            );
        }
        connected
    }

    /// Adds several owners concurrently.
    pub async fn add_owners<I>(&self, configs: I) -> usize
    where
        I: IntoIterator<Item = OwnerConfig>,
    {
        join_all(configs.into_iter().map(|config| self.add_owner(config)))
            .await
            .into_iter()
            .filter(|connected| *connected)
            .count()
    }

    async fn register(&self, slot: Arc<OwnerSlot>, operations: &[Operation]) -> Option<Arc<OwnerSlot>> {
        let mut owners = self.owners.write().await;
        let mut routes = self.routes.write().await;

        let replaced = match owners.iter().position(|existing| existing.id() == slot.id()) {
            Some(index) => {
                routes.retain(|_, owner| owner != slot.id());
                Some(std::mem::replace(&mut owners[index], Arc::clone(&slot)))
            }
            None => {
                owners.push(Arc::clone(&slot));
                None
            }
        };

        for operation in operations {
            if let Some(previous) = routes.insert(operation.name.clone(), slot.id().to_string()) {
                if previous != slot.id() {
                    warn!(
                        operation = %operation.name,
                        shadowed = %previous,
                        owner = slot.id(),
                        "Operation name collision; latest owner wins"
                    );
                }
            }
        }
        replaced
    }

    /// Retries the handshake for a registered owner.
    pub async fn reconnect(&self, id: &str) -> Result<bool, RouterError> {
        let slot = self
            .snapshot()
            .await
            .into_iter()
            .find(|slot| slot.id() == id)
            .ok_or_else(|| RouterError::UnknownOwner { id: id.to_string() })?;
        if slot.client.is_connected().await {
            return Ok(true);
        }

        slot.client.connect().await?;
        let operations = slot.client.list_operations().await?;
        let owners = self.owners.read().await;
        if owners.iter().any(|registered| Arc::ptr_eq(registered, &slot)) {
            let mut routes = self.routes.write().await;
            for operation in &operations {
                routes.insert(operation.name.clone(), id.to_string());
            }
        }
        info!(owner = id, operations = operations.len(), "Owner reconnected");
        Ok(true)
    }

    pub async fn has_usable_owners(&self) -> bool {
        for slot in self.snapshot().await {
            if slot.client.is_connected().await {
                return true;
            }
        }
        false
    }

    /// Union of the operations of every connected owner. An owner whose
    /// listing fails is left out of this answer only.
    pub async fn list_all_operations(&self) -> Vec<Operation> {
        let mut merged: Vec<Operation> = Vec::new();
        for slot in self.snapshot().await {
            if !slot.client.is_connected().await {
                continue;
            }
            let operations = match slot.client.list_operations().await {
                Ok(operations) => operations,
                Err(err) => {
                    warn!(owner = slot.id(), %err, "Skipping owner while listing operations");
                    continue;
                }
            };

            self.fill_missing_routes(&slot, &operations).await;
            for operation in operations {
                match merged.iter_mut().find(|known| known.name == operation.name) {
                    Some(known) => *known = operation,
                    None => merged.push(operation),
                }
            }
        }
        merged
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<InvocationOutcome, RouterError> {
        if let Some(slot) = self.cached_owner(name).await {
            if slot.client.is_connected().await {
                debug!(operation = name, owner = slot.id(), "Routing via cache");
                return Ok(slot.client.invoke(name, arguments).await?);
            }
        }

        for slot in self.snapshot().await {
            if !slot.client.is_connected().await {
                continue;
            }
            match slot.client.list_operations().await {
                Ok(operations) if operations.iter().any(|op| op.name == name) => {
                    self.remember(name, &slot).await;
                    debug!(operation = name, owner = slot.id(), "Routing after discovery");
                    return Ok(slot.client.invoke(name, arguments).await?);
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(owner = slot.id(), %err, "Owner failed during operation lookup");
                }
            }
        }

        Err(RouterError::OperationNotFound {
            name: name.to_string(),
        })
    }

    /// Disconnects every owner and forgets all routes.
    pub async fn remove_all_owners(&self) -> Result<(), RouterError> {
        let drained = {
            let mut owners = self.owners.write().await;
            let mut routes = self.routes.write().await;
            routes.clear();
            std::mem::take(&mut *owners)
        };

        let mut failures = Vec::new();
        for slot in drained {
            if let Err(err) = slot.client.disconnect().await {
                warn!(owner = slot.id(), %err, "Owner failed to disconnect");
                failures.push(err);
            }
        }
        info!(failures = failures.len(), "All owners removed");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RouterError::Teardown { failures })
        }
    }

    pub async fn owner_statuses(&self) -> Vec<OwnerStatus> {
        let counts = {
            let routes = self.routes.read().await;
            let mut counts: HashMap<String, usize> = HashMap::new();
            for owner in routes.values() {
                *counts.entry(owner.clone()).or_default() += 1;
            }
            counts
        };

        let mut statuses = Vec::new();
        for slot in self.snapshot().await {
            statuses.push(OwnerStatus {
                id: slot.id().to_string(),
                endpoint: slot.config.endpoint.to_string(),
                state: slot.client.state().await,
                operations: counts.get(slot.id()).copied().unwrap_or_default(),
                server: slot.client.identity().await,
                connected_at: slot.client.connected_at().await,
            });
        }
        statuses
    }

    /// Server instructions per connected owner, in registration order.
    pub async fn owner_instructions(&self) -> Vec<(String, String)> {
        let mut guidance = Vec::new();
        for slot in self.snapshot().await {
            if let Some(text) = slot.client.instructions().await {
                guidance.push((slot.id().to_string(), text));
            }
        }
        guidance
    }

    /// Direct access to one owner's client for resource and prompt calls.
    pub async fn client(&self, id: &str) -> Option<Arc<CapabilityClient>> {
        self.owners
            .read()
            .await
            .iter()
            .find(|slot| slot.id() == id)
            .map(|slot| Arc::clone(&slot.client))
    }

    pub async fn routed_owner(&self, name: &str) -> Option<String> {
        self.cached_owner(name)
            .await
            .map(|slot| slot.id().to_string())
    }

    async fn snapshot(&self) -> Vec<Arc<OwnerSlot>> {
        self.owners.read().await.clone()
    }

    /// A cache entry naming an owner that is no longer registered is a miss.
    async fn cached_owner(&self, name: &str) -> Option<Arc<OwnerSlot>> {
        let owners = self.owners.read().await;
        let routes = self.routes.read().await;
        let owner_id = routes.get(name)?;
        owners.iter().find(|slot| slot.id() == owner_id).cloned()
    }

    async fn remember(&self, name: &str, slot: &Arc<OwnerSlot>) {
        let owners = self.owners.read().await;
        if owners.iter().any(|registered| Arc::ptr_eq(registered, slot)) {
            self.routes
                .write()
                .await
                .insert(name.to_string(), slot.id().to_string());
        }
    }

    async fn fill_missing_routes(&self, slot: &Arc<OwnerSlot>, operations: &[Operation]) {
        let owners = self.owners.read().await;
        if !owners.iter().any(|registered| Arc::ptr_eq(registered, slot)) {
            return;
        }
        let mut routes = self.routes.write().await;
        for operation in operations {
            routes
                .entry(operation.name.clone())
                .or_insert_with(|| slot.id().to_string());
        }
    }
}
