//! Status verdicts from app metric reports

use fleet_core::config::CatalogConfig;
use fleet_core::{BizStatus, MetricPayload};
use fleet_protocol::AppReport;
use tracing::debug;

/// Outcome of scanning one batch of metric reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsVerdict {
    /// Status the node should take, if any report decided one
    pub status: Option<BizStatus>,
}

impl MetricsVerdict {
    /// Scan the reports carrying a metric, in order.
    ///
    /// The first report with a client id maps its tag through the catalog's
    /// client-id table and ends the scan. Otherwise a running app forces
    /// `Initing` and a persistent error forces `Err`; the last one applied
    /// wins. Reports whose metric does not parse are skipped.
    pub fn evaluate(apps: &[AppReport], catalog: &CatalogConfig) -> Self {
        let mut status = None;

        for app in apps.iter().filter(|a| !a.metric.is_empty()) {
            let tag = if app.tag.is_empty() {
                catalog
                    .app(&app.app_name)
                    .map(|a| a.tag.as_str())
                    .unwrap_or_default()
            } else {
                app.tag.as_str()
            };

            let payload = match MetricPayload::parse_tagged(tag, &app.metric) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!("skipping metric of {}: {}", app.app_name, e);
                    continue;
                }
            };

            if !payload.client_id().is_empty() {
                status = Some(catalog.client_id_state(tag));
                break;
            }
            if payload.is_running() {
                status = Some(BizStatus::Initing);
            }
            if payload.has_persistent_error() {
                status = Some(BizStatus::Err);
            }
        }

        Self { status }
    }
}

/// Split a `;`-separated client id list, dropping empty parts
pub fn split_client_ids(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// The business tag implied by a client id prefix
pub fn client_id_tag(client_id: &str) -> Option<&'static str> {
    if client_id.starts_with("box") {
        Some("painet")
    } else if client_id.starts_with("ant") {
        Some("niulinkant")
    } else {
        None
    }
}
