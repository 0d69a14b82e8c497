//! Live session records

use chrono::{DateTime, Utc};
use fleet_core::{Node, NodeId};
use fleet_protocol::DeviceReport;
use serde::Serialize;

/// A bootstrap agent polling for its Lua script, keyed by its transient uuid
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub uuid: String,
    pub device: DeviceReport,
    pub ip: String,
    pub last_activity_time: DateTime<Utc>,
}

impl AgentSession {
    pub fn new(device: DeviceReport, ip: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uuid: device.uuid.clone(),
            device,
            ip: ip.into(),
            last_activity_time: now,
        }
    }
}

/// A controller that fetched its app configuration, keyed by its node id
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSession {
    pub node: Node,
    pub last_activity_time: DateTime<Utc>,
}

impl ControllerSession {
    pub fn new(node: Node, now: DateTime<Utc>) -> Self {
        Self {
            node,
            last_activity_time: now,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node.id
    }
}
