//! One distribution decision, end to end

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_core::config::{AppConfig, FileConfig};
use fleet_core::{BizStatus, NodeId, OverrideLayers};
use fleet_protocol::{ControllerQuery, DeviceReport, ResourceQuery};
use fleet_store::StateStore;
use tracing::{error, info, warn};

use super::engine::{DistributionEngine, SelectionRequest};
use super::overrides::apply_overrides;
use super::DistributionError;
use crate::business::guard;
use crate::geoip::GeoIpCache;
use crate::keepalive::KeepaliveService;
use crate::registry::NodeRegistry;

/// A configuration request from an authenticated controller
#[derive(Debug, Clone, Default)]
pub struct DistributionRequest {
    pub node_id: NodeId,
    pub uuid: String,
    pub channel: String,
    pub device: DeviceReport,
    pub resources: ResourceQuery,
    pub ip: Option<IpAddr>,
}

/// The apps handed to a node and the statuses reported alongside them
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub apps: Vec<AppConfig>,
    /// Status computed from this request alone
    pub init_state: BizStatus,
    /// Status stored for the node after the audit guard
    pub service_state: BizStatus,
}

pub struct DistributionService {
    store: StateStore,
    engine: DistributionEngine,
    geo: Arc<GeoIpCache>,
    registry: Arc<NodeRegistry>,
    keepalive: Arc<KeepaliveService>,
}

impl DistributionService {
    pub fn new(
        store: StateStore,
        engine: DistributionEngine,
        geo: Arc<GeoIpCache>,
        registry: Arc<NodeRegistry>,
        keepalive: Arc<KeepaliveService>,
    ) -> Self {
        Self {
            store,
            engine,
            geo,
            registry,
            keepalive,
        }
    }

    pub fn engine(&self) -> &DistributionEngine {
        &self.engine
    }

    /// Decide which apps a node runs.
    ///
    /// The base set comes from the catalog, the operator's override layers
    /// are applied on top, and the resulting status passes the audit guard
    /// before it is stored with the node. The final names are added to the
    /// node's app list.
    pub async fn decide(
        &self,
        request: &DistributionRequest,
        now: DateTime<Utc>,
    ) -> Result<Decision, DistributionError> {
        let id = &request.node_id;
        let region = self.geo.region(request.ip).await;

        let selection = self.engine.select(&SelectionRequest {
            node_id: id.as_str(),
            uuid: &request.uuid,
            channel: &request.channel,
            resources: &request.resources,
            region: region.as_deref(),
        });

        let (layers, previous) =
            futures::join!(self.store.override_layers(id), self.store.get_node(id));
        let layers = layers.unwrap_or_else(|e| {
            error!("failed to read overrides of {}: {}", id, e);
            OverrideLayers::default()
        });
        let previous = match previous {
            Ok(node) => node.service_state,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                return Err(DistributionError::Store {
                    op: "get_node",
                    source: e,
                })
            }
        };

        let apps = apply_overrides(self.engine.catalog(), selection.apps, &layers);
        let service_state = guard(previous, selection.state);
        let names: Vec<String> = apps.iter().map(|a| a.app_name.clone()).collect();
        info!(
            "apps for {} (region {:?}, channel {:?}): {:?}, state {}",
            id, region, request.channel, names, service_state
        );

        if let Some(node) = self
            .keepalive
            .sync_from_device(id, &request.device, service_state, request.ip, now)
            .await?
        {
            self.registry.update_controller(&node, now);
        }

        self.store
            .add_node_apps_to_list(id, &names)
            .await
            .map_err(|source| DistributionError::Store {
                op: "add_node_apps_to_list",
                source,
            })?;

        Ok(Decision {
            apps,
            init_state: selection.state,
            service_state,
        })
    }

    /// The controller binary for a node; an operator-pinned one wins
    pub async fn controller_for(&self, query: &ControllerQuery) -> Option<FileConfig> {
        match self
            .store
            .specified_controller(&NodeId::new(query.uuid.as_str()))
            .await
        {
            Ok(Some(file)) => return Some(file),
            Ok(None) => {}
            Err(e) => warn!("failed to read pinned controller of {}: {}", query.uuid, e),
        }
        self.engine.select_controller(query).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::StaticGeoLocator;
    use fleet_core::config::{CatalogConfig, KeepaliveConfig, ResourceProfile};
    use chrono::TimeZone;
    use std::time::Duration;

    fn catalog() -> CatalogConfig {
        let mut catalog = CatalogConfig::default();
        catalog.resources.insert(
            "small".into(),
            ResourceProfile {
                os: "linux".into(),
                min_cpu: 2,
                min_memory_mb: 4096.0,
                min_disk_gb: 50.0,
                arch: String::new(),
            },
        );
        catalog.apps.push(AppConfig {
            app_name: "app-us".into(),
            auto_load: true,
            req_resources: vec!["small".into()],
            req_locations: vec!["US".into()],
            ..Default::default()
        });
        catalog.apps.push(AppConfig {
            app_name: "app-x".into(),
            ..Default::default()
        });
        catalog
    }

    fn service(store: &StateStore, registry: Arc<NodeRegistry>) -> DistributionService {
        let catalog = Arc::new(catalog());
        let us: IpAddr = "8.8.8.8".parse().unwrap();
        let locator = StaticGeoLocator::new().with_country(us, "US");
        let geo = Arc::new(GeoIpCache::new(
            Arc::new(locator),
            Duration::from_secs(1800),
            Duration::from_secs(3),
        ));
        let keepalive = Arc::new(KeepaliveService::new(
            store.clone(),
            catalog.clone(),
            KeepaliveConfig::default(),
        ));
        DistributionService::new(
            store.clone(),
            DistributionEngine::new(catalog),
            geo,
            registry,
            keepalive,
        )
    }

    fn request(ip: &str) -> DistributionRequest {
        DistributionRequest {
            node_id: NodeId::new("n1"),
            uuid: "u1".into(),
            channel: String::new(),
            device: DeviceReport {
                os: "linux".into(),
                ..Default::default()
            },
            resources: ResourceQuery {
                os: "linux".into(),
                arch: "amd64".into(),
                cpu_cores: 4,
                memory_mb: 8192.0,
                disk_gb: 100.0,
            },
            ip: ip.parse().ok(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_decision_updates_node_registry_and_list() {
        let store = StateStore::in_memory();
        let registry = Arc::new(NodeRegistry::default());
        let svc = service(&store, registry.clone());

        let decision = svc.decide(&request("8.8.8.8"), now()).await.unwrap();

        assert_eq!(decision.apps.len(), 1);
        assert_eq!(decision.init_state, BizStatus::Initing);
        assert_eq!(decision.service_state, BizStatus::Initing);

        let id = NodeId::new("n1");
        let node = store.get_node(&id).await.unwrap();
        assert_eq!(node.service_state, Some(BizStatus::Initing));
        assert_eq!(node.ip, "8.8.8.8");
        assert!(registry.get_controller(&id).is_some());
        assert_eq!(
            store.get_node_app_list(&id).await.unwrap(),
            vec!["app-us".to_string()]
        );
    }

    #[tokio::test]
    async fn test_guard_keeps_audit_state() {
        let store = StateStore::in_memory();
        let svc = service(&store, Arc::new(NodeRegistry::default()));
        let id = NodeId::new("n1");
        let mut node = fleet_core::Node::new("n1");
        node.service_state = Some(BizStatus::WaitAudit);
        store.set_node(&node).await.unwrap();

        let decision = svc.decide(&request("8.8.8.8"), now()).await.unwrap();
        assert_eq!(decision.init_state, BizStatus::Initing);
        assert_eq!(decision.service_state, BizStatus::WaitAudit);
        assert_eq!(
            store.get_node(&id).await.unwrap().service_state,
            Some(BizStatus::WaitAudit)
        );

        // An unsupported region overrides the audit state
        let decision = svc.decide(&request("1.1.1.1"), now()).await.unwrap();
        assert_eq!(decision.service_state, BizStatus::AreaUnsupported);
    }

    #[tokio::test]
    async fn test_specified_apps_replace_selection() {
        let store = StateStore::in_memory();
        let svc = service(&store, Arc::new(NodeRegistry::default()));
        let id = NodeId::new("n1");
        store
            .set_specified_apps(&id, &["app-x".to_string()])
            .await
            .unwrap();

        let decision = svc.decide(&request("8.8.8.8"), now()).await.unwrap();
        let names: Vec<&str> = decision.apps.iter().map(|a| a.app_name.as_str()).collect();
        assert_eq!(names, vec!["app-x"]);
    }

    #[tokio::test]
    async fn test_pinned_controller_wins() {
        let store = StateStore::in_memory();
        let svc = service(&store, Arc::new(NodeRegistry::default()));
        let query = ControllerQuery {
            uuid: "u1".into(),
            os: "linux".into(),
            ..Default::default()
        };
        assert!(svc.controller_for(&query).await.is_none());

        let pinned = FileConfig {
            name: "ctl-pinned".into(),
            os: "linux".into(),
            ..Default::default()
        };
        store
            .set_specified_controller(&NodeId::new("u1"), Some(&pinned))
            .await
            .unwrap();
        assert_eq!(svc.controller_for(&query).await, Some(pinned));
    }
}
