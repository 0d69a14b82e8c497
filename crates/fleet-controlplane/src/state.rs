//! Shared control plane state

use std::sync::Arc;

use fleet_core::config::{CatalogConfig, ControlPlaneConfig};
use fleet_store::StateStore;

use crate::auth::{Authenticator, KeyVerifier, TokenAuthority};
use crate::distribution::{DistributionEngine, DistributionService};
use crate::geoip::{GeoIpCache, GeoLocator};
use crate::keepalive::KeepaliveService;
use crate::registry::NodeRegistry;

/// Everything a request handler needs, built once at startup
pub struct ControlPlaneState {
    /// Configuration
    pub config: ControlPlaneConfig,
    /// Persistent state
    pub store: StateStore,
    /// App catalog
    pub catalog: Arc<CatalogConfig>,
    /// Live agent and controller sessions
    pub registry: Arc<NodeRegistry>,
    /// Country lookups
    pub geo: Arc<GeoIpCache>,
    pub auth: Arc<Authenticator>,
    pub keepalive: Arc<KeepaliveService>,
    pub distribution: Arc<DistributionService>,
}

impl ControlPlaneState {
    pub fn new(config: ControlPlaneConfig, store: StateStore, locator: Arc<dyn GeoLocator>) -> Self {
        let catalog = Arc::new(config.catalog.clone());
        let registry = Arc::new(NodeRegistry::new(config.registry.offline_threshold));
        let geo = Arc::new(GeoIpCache::new(
            locator,
            config.geo.cache_ttl,
            config.geo.timeout,
        ));
        let auth = Arc::new(Authenticator::new(
            store.clone(),
            TokenAuthority::new(&config.auth.jwt_secret),
            Arc::new(KeyVerifier),
        ));
        let keepalive = Arc::new(KeepaliveService::new(
            store.clone(),
            Arc::clone(&catalog),
            config.keepalive.clone(),
        ));
        let distribution = Arc::new(DistributionService::new(
            store.clone(),
            DistributionEngine::new(Arc::clone(&catalog)),
            Arc::clone(&geo),
            Arc::clone(&registry),
            Arc::clone(&keepalive),
        ));

        Self {
            config,
            store,
            catalog,
            registry,
            geo,
            auth,
            keepalive,
            distribution,
        }
    }

    /// Get the node registry
    pub fn node_registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }
}
