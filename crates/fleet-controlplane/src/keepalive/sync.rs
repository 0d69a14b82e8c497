//! Node updates driven by a configuration request

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use fleet_core::serial::is_box_serial;
use fleet_core::{BizStatus, Node, NodeId};
use fleet_protocol::DeviceReport;
use tracing::warn;

use super::{accrual_seconds, KeepaliveError, KeepaliveService};

impl KeepaliveService {
    /// Whether a node carrying `serial` may be persisted.
    ///
    /// Box serials must be on the whitelist; anything else is admitted.
    pub(crate) async fn serial_admitted(&self, serial: &str) -> Result<bool, KeepaliveError> {
        if !is_box_serial(serial) {
            return Ok(true);
        }
        let admitted = self
            .store
            .is_serial_whitelisted(serial)
            .await
            .map_err(KeepaliveError::store("is_serial_whitelisted"))?;
        if !admitted {
            warn!("serial {} is not whitelisted", serial);
        }
        Ok(admitted)
    }

    /// Merge the device facts of a configuration request onto the stored node.
    ///
    /// Stores the business status decided for the request, refreshes the
    /// activity time and credits the gap since the previous report. Returns
    /// the stored node, or `None` when the node's box serial is not
    /// whitelisted and nothing was written.
    pub async fn sync_from_device(
        &self,
        id: &NodeId,
        device: &DeviceReport,
        state: BizStatus,
        ip: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<Option<Node>, KeepaliveError> {
        if !self.serial_admitted(&device.android_serial_number).await? {
            return Ok(None);
        }

        let mut node = self
            .store
            .get_node_or_default(id)
            .await
            .map_err(KeepaliveError::store("get_node"))?;
        let previous = node.last_activity_time;

        node.absorb_report(device);
        node.service_state = Some(state);
        node.last_activity_time = Some(now);
        if let Some(ip) = ip {
            node.ip = ip.to_string();
        }

        self.store
            .set_node(&node)
            .await
            .map_err(KeepaliveError::store("set_node"))?;

        if let Some(secs) = accrual_seconds(previous, now, self.max_accrual_gap()) {
            if let Err(e) = self.store.incr_online_duration(id, secs, now).await {
                warn!("failed to accrue online time of {}: {}", id, e);
            }
        }
        Ok(Some(node))
    }
}
