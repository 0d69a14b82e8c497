//! Live session registry
//!
//! Tracks which agents and controllers have been heard from recently. The
//! registry is a cache: it is never persisted, starts empty, and evicting
//! an entry leaves the stored node record untouched.

mod sessions;
mod sweep;

pub use sessions::{AgentSession, ControllerSession};
pub use sweep::{run_registry_sweep, OFFLINE_THRESHOLD, SWEEP_INTERVAL};

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fleet_core::{Node, NodeId};
use fleet_protocol::DeviceReport;

/// What one sweep evicted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub agents: usize,
    pub controllers: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.agents + self.controllers
    }
}

/// Agents keyed by uuid and controllers keyed by node id
pub struct NodeRegistry {
    agents: DashMap<String, AgentSession>,
    controllers: DashMap<NodeId, ControllerSession>,
    offline_threshold: Duration,
}

impl NodeRegistry {
    /// Create an empty registry evicting sessions silent for longer than
    /// `offline_threshold`
    pub fn new(offline_threshold: Duration) -> Self {
        Self {
            agents: DashMap::new(),
            controllers: DashMap::new(),
            offline_threshold,
        }
    }

    /// The silence after which a session is evicted
    pub fn offline_threshold(&self) -> Duration {
        self.offline_threshold
    }

    /// Insert an agent, or refresh the activity time of a known one.
    ///
    /// Reports without a uuid are ignored.
    pub fn update_agent(&self, device: DeviceReport, ip: &str, now: DateTime<Utc>) {
        if device.uuid.is_empty() {
            return;
        }
        self.agents
            .entry(device.uuid.clone())
            .and_modify(|session| session.last_activity_time = now)
            .or_insert_with(|| AgentSession::new(device, ip, now));
    }

    /// Insert a controller, or merge the set fields of `node` into the known one
    pub fn update_controller(&self, node: &Node, now: DateTime<Utc>) {
        if node.id.is_empty() {
            return;
        }
        self.controllers
            .entry(node.id.clone())
            .and_modify(|session| {
                session.node.absorb_node(node);
                session.last_activity_time = now;
            })
            .or_insert_with(|| ControllerSession::new(node.clone(), now));
    }

    pub fn get_agent(&self, uuid: &str) -> Option<AgentSession> {
        self.agents.get(uuid).map(|r| r.clone())
    }

    /// Snapshot of all agents; entries added mid-iteration may be missed
    pub fn get_agents(&self) -> Vec<AgentSession> {
        self.agents.iter().map(|r| r.clone()).collect()
    }

    pub fn get_controller(&self, id: &NodeId) -> Option<ControllerSession> {
        self.controllers.get(id).map(|r| r.clone())
    }

    /// Snapshot of all controllers; entries added mid-iteration may be missed
    pub fn get_controllers(&self) -> Vec<ControllerSession> {
        self.controllers.iter().map(|r| r.clone()).collect()
    }

    /// Evict every session silent for longer than the offline threshold
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let threshold = chrono::Duration::from_std(self.offline_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(OFFLINE_THRESHOLD.as_secs() as i64));
        let alive = |last: DateTime<Utc>| now - last <= threshold;

        let agents_before = self.agents.len();
        self.agents
            .retain(|_, session| alive(session.last_activity_time));
        let controllers_before = self.controllers.len();
        self.controllers
            .retain(|_, session| alive(session.last_activity_time));

        SweepStats {
            agents: agents_before.saturating_sub(self.agents.len()),
            controllers: controllers_before.saturating_sub(self.controllers.len()),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(OFFLINE_THRESHOLD)
    }
}
