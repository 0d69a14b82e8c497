//! Keepalive and metrics ingestion

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::config::{CatalogConfig, KeepaliveConfig};
use fleet_core::metrics::MetricFamily;
use fleet_core::{MetricPayload, Node, NodeApp, NodeId};
use fleet_protocol::{decode_app_reports, AppReport, KeepaliveRequest};
use fleet_store::StateStore;
use tracing::{debug, info, warn};

use super::{accrual_seconds, KeepaliveError};
use crate::business::MetricsVerdict;

/// Apps whose metric carries the host's cgroup and iptables probes
const DIAGNOSTIC_APP_MARKERS: [&str; 2] = ["airship", "pedge"];

/// Handles node reports against the store
pub struct KeepaliveService {
    pub(super) store: StateStore,
    catalog: Arc<CatalogConfig>,
    config: KeepaliveConfig,
}

impl KeepaliveService {
    pub fn new(store: StateStore, catalog: Arc<CatalogConfig>, config: KeepaliveConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Poll hint after a rejected report
    pub fn backoff_interval(&self) -> Duration {
        self.config.backoff_interval
    }

    /// Poll hint after an accepted report
    pub fn steady_interval(&self) -> Duration {
        self.config.steady_interval
    }

    pub(super) fn max_accrual_gap(&self) -> Duration {
        self.config.max_accrual_gap
    }

    /// Handle one keepalive body from an authenticated node.
    ///
    /// The stored node is loaded (a zero-value node when absent), the
    /// reported facts are merged on top, the gap since the previous report
    /// is credited as online time when short enough, and the node is
    /// written back with `now` as its activity time. App records are then
    /// overwritten; a failure there is logged and does not fail the report.
    pub async fn keepalive(
        &self,
        id: &NodeId,
        body: &[u8],
        ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<(), KeepaliveError> {
        let request = KeepaliveRequest::from_slice(body)?;
        if request.node.id != id.as_str() {
            return Err(KeepaliveError::NodeIdMismatch {
                authenticated: id.clone(),
                reported: request.node.id,
            });
        }

        let mut node = self
            .store
            .get_node_or_default(id)
            .await
            .map_err(KeepaliveError::store("get_node"))?;
        let previous = node.last_activity_time;

        node.absorb_report(&request.node);
        if let Some(ip) = ip {
            node.ip = ip.to_string();
        }

        if let Some(secs) = accrual_seconds(previous, now, self.max_accrual_gap()) {
            self.store
                .incr_online_duration(id, secs, now)
                .await
                .map_err(KeepaliveError::store("incr_online_duration"))?;
        }

        node.last_activity_time = Some(now);
        self.store
            .set_node(&node)
            .await
            .map_err(KeepaliveError::store("set_node"))?;

        self.overwrite_app_records(id, &request.apps, now).await;
        if node.is_android_app() {
            self.register_app_list(id, &request.apps).await;
        }

        debug!("keepalive from {} ({} apps)", id, request.apps.len());
        Ok(())
    }

    /// Handle one metrics body from an authenticated node.
    ///
    /// App records are overwritten, the host diagnostics carried by the
    /// first proxy app are recorded, and the business status implied by the
    /// metrics is stored. The node's activity time is left alone.
    pub async fn push_metrics(
        &self,
        id: &NodeId,
        body: &[u8],
        ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<MetricsVerdict, KeepaliveError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(KeepaliveError::Empty);
        }
        let apps = decode_app_reports(body)?;

        self.overwrite_app_records(id, &apps, now).await;

        let mut node = self
            .store
            .get_node(id)
            .await
            .map_err(KeepaliveError::store("get_node"))?;

        if node.is_android_app() {
            self.register_app_list(id, &apps).await;
        }
        if let Some(ip) = ip {
            node.ip = ip.to_string();
        }

        let diagnosed = record_diagnostics(&mut node, &apps);
        let verdict = MetricsVerdict::evaluate(&apps, &self.catalog);
        if let Some(status) = verdict.status {
            info!("node {} status from metrics: {}", id, status);
            node.service_state = Some(status);
        }

        if (diagnosed || verdict.status.is_some()) && self.serial_admitted(&node.android_serial_number).await? {
            self.store
                .set_node(&node)
                .await
                .map_err(KeepaliveError::store("set_node"))?;
        }
        Ok(verdict)
    }

    async fn overwrite_app_records(&self, id: &NodeId, apps: &[AppReport], now: DateTime<Utc>) {
        let records: Vec<NodeApp> = apps
            .iter()
            .filter(|app| !app.app_name.is_empty())
            .map(|app| NodeApp {
                app_name: app.app_name.clone(),
                md5: app.script_md5.clone(),
                metric: app.metric.clone(),
                last_activity_time: None,
            })
            .collect();
        if let Err(e) = self.store.set_node_apps(id, &records, now).await {
            warn!("failed to update app records of {}: {}", id, e);
        }
    }

    /// Nodes that never receive a computed distribution declare their apps themselves
    async fn register_app_list(&self, id: &NodeId, apps: &[AppReport]) {
        let names: Vec<String> = apps
            .iter()
            .filter(|app| !app.app_name.is_empty())
            .map(|app| app.app_name.clone())
            .collect();
        if let Err(e) = self.store.add_node_apps_to_list(id, &names).await {
            warn!("failed to register app list of {}: {}", id, e);
        }
    }
}

/// Record the cgroup and iptables probes of the first proxy app reporting a metric
fn record_diagnostics(node: &mut Node, apps: &[AppReport]) -> bool {
    let Some(app) = apps.iter().find(|app| {
        !app.metric.is_empty()
            && DIAGNOSTIC_APP_MARKERS
                .iter()
                .any(|marker| app.app_name.contains(marker))
    }) else {
        return false;
    };

    match MetricPayload::parse(MetricFamily::Vps, &app.metric) {
        Ok(MetricPayload::Vps(vps)) => {
            node.set_cgroup(vps.cgroup_flag(), vps.cgroup.clone());
            node.set_iptables(vps.iptables_flag(), vps.iptables.clone());
            true
        }
        Ok(_) => false,
        Err(e) => {
            debug!("no diagnostics in metric of {}: {}", app.app_name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleet_core::{BizStatus, DiagnosticFlag};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_717_200_000 + secs, 0).unwrap()
    }

    fn service(store: &StateStore) -> KeepaliveService {
        KeepaliveService::new(
            store.clone(),
            Arc::new(CatalogConfig::default()),
            KeepaliveConfig::default(),
        )
    }

    fn body(id: &str, extra: &str) -> Vec<u8> {
        format!(
            r#"{{"node":{{"id":"{}","os":"linux","cpuCores":4{}}},"apps":[{{"appName":"pedge","scriptMD5":"m1","metric":"{{}}"}}]}}"#,
            id, extra
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_keepalive_creates_and_refreshes_node() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("n1");
        let ip: IpAddr = "203.0.113.9".parse().unwrap();

        svc.keepalive(&id, &body("n1", ""), Some(ip), t(0)).await.unwrap();

        let node = store.get_node(&id).await.unwrap();
        assert_eq!(node.os, "linux");
        assert_eq!(node.cpu_cores, 4);
        assert_eq!(node.ip, "203.0.113.9");
        assert_eq!(node.last_activity_time, Some(t(0)));
        assert_eq!(store.get_node_app(&id, "pedge").await.unwrap().md5, "m1");
        assert_eq!(store.online_duration(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keepalive_accrues_short_gaps_only() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("n1");

        svc.keepalive(&id, &body("n1", ""), None, t(0)).await.unwrap();
        svc.keepalive(&id, &body("n1", ""), None, t(300)).await.unwrap();
        svc.keepalive(&id, &body("n1", ""), None, t(600)).await.unwrap();
        assert_eq!(store.online_duration(&id).await.unwrap(), 600);

        // A 31 minute outage is not online time
        svc.keepalive(&id, &body("n1", ""), None, t(600 + 31 * 60)).await.unwrap();
        assert_eq!(store.online_duration(&id).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn test_keepalive_keeps_omitted_fields() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("n1");

        svc.keepalive(&id, &body("n1", r#","gpu":"rtx""#), None, t(0))
            .await
            .unwrap();
        svc.keepalive(&id, &body("n1", ""), None, t(60)).await.unwrap();

        assert_eq!(store.get_node(&id).await.unwrap().gpu, "rtx");
    }

    #[tokio::test]
    async fn test_keepalive_rejects_mismatch_and_garbage() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("n1");

        let err = svc
            .keepalive(&id, &body("someone-else", ""), None, t(0))
            .await
            .unwrap_err();
        assert!(matches!(err, KeepaliveError::NodeIdMismatch { .. }));
        assert!(err.is_client_error());

        let err = svc.keepalive(&id, b"{nope", None, t(0)).await.unwrap_err();
        assert!(matches!(err, KeepaliveError::Malformed(_)));

        assert!(store.get_node(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_android_app_registers_its_apps() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("phone");
        let body = br#"{"node":{"id":"phone","os":"Android","platform":"Linux"},"apps":[{"appName":"qiniu"}]}"#;

        svc.keepalive(&id, body, None, t(0)).await.unwrap();

        assert_eq!(
            store.get_node_app_list(&id).await.unwrap(),
            vec!["qiniu".to_string()]
        );
    }

    #[tokio::test]
    async fn test_push_metrics_sets_status_and_diagnostics() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let id = NodeId::new("n1");
        svc.keepalive(&id, &body("n1", ""), None, t(0)).await.unwrap();

        let metrics = serde_json::json!([
            {
                "appName": "airship-vps",
                "tag": "pedge",
                "metric": serde_json::json!({
                    "client_id": "c-1",
                    "cgroup": "cgroup on /sys/fs/cgroup/cpu type cgroup (rw,nosuid)",
                    "iptables": "iptables v1.8.7"
                }).to_string()
            }
        ]);
        let verdict = svc
            .push_metrics(&id, metrics.to_string().as_bytes(), None, t(30))
            .await
            .unwrap();
        assert_eq!(verdict.status, Some(BizStatus::ResourceWaitAudit));

        let node = store.get_node(&id).await.unwrap();
        assert_eq!(node.service_state, Some(BizStatus::ResourceWaitAudit));
        assert_eq!(node.cgroup, DiagnosticFlag::Enabled);
        assert_eq!(node.iptables, DiagnosticFlag::Enabled);
        assert_eq!(node.last_activity_time, Some(t(0)));
    }

    #[tokio::test]
    async fn test_push_metrics_rejects_empty_body() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let err = svc
            .push_metrics(&NodeId::new("n1"), b"  ", None, t(0))
            .await
            .unwrap_err();
        assert!(matches!(err, KeepaliveError::Empty));
    }

    #[tokio::test]
    async fn test_push_metrics_unknown_node() {
        let store = StateStore::in_memory();
        let svc = service(&store);
        let err = svc
            .push_metrics(&NodeId::new("ghost"), b"[]", None, t(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KeepaliveError::Store { op: "get_node", ref source } if source.is_not_found()
        ));
    }
}
