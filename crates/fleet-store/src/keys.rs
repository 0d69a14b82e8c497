//! Key templates.
//!
//! The key layout is read directly by external tooling and must stay stable:
//!
//! ```text
//! node:<nodeID>                      hash
//! app:<appName>                      hash
//! nodeApp:<nodeID>:<appName>         hash, TTL 24h
//! nodeAppList:<nodeID>               set
//! nodeLastActiveTime                 zset member=nodeID
//! app:nodeLastActiveTime             zset member="<appName>@<nodeID>"
//! specified:apps:<nodeID>            set
//! specified:extra:apps:<nodeID>      set
//! removed:apps:<nodeID>              set
//! specified:controller:<nodeID>      string
//! sn:node:<serialNumber>             string
//! sn:whiteList                       set
//! blacklist                          set
//! nodeOnlineDuration:<nodeID>        string
//! onlineDurationStat:map:<nodeID>    hash
//! nodeRegist                         hash
//! ```

use fleet_core::NodeId;

/// Builds every key, optionally under a deployment-wide prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    /// Keys with `prefix` prepended; pass `""` for the bare layout.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The deployment prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, body: std::fmt::Arguments<'_>) -> String {
        format!("{}{}", self.prefix, body)
    }

    pub fn node(&self, id: &NodeId) -> String {
        self.key(format_args!("node:{}", id))
    }

    pub fn app(&self, name: &str) -> String {
        self.key(format_args!("app:{}", name))
    }

    pub fn node_app(&self, id: &NodeId, app: &str) -> String {
        self.key(format_args!("nodeApp:{}:{}", id, app))
    }

    pub fn node_app_list(&self, id: &NodeId) -> String {
        self.key(format_args!("nodeAppList:{}", id))
    }

    pub fn node_last_active(&self) -> String {
        self.key(format_args!("nodeLastActiveTime"))
    }

    pub fn app_node_last_active(&self) -> String {
        self.key(format_args!("app:nodeLastActiveTime"))
    }

    pub fn specified_apps(&self, id: &NodeId) -> String {
        self.key(format_args!("specified:apps:{}", id))
    }

    pub fn extra_apps(&self, id: &NodeId) -> String {
        self.key(format_args!("specified:extra:apps:{}", id))
    }

    pub fn removed_apps(&self, id: &NodeId) -> String {
        self.key(format_args!("removed:apps:{}", id))
    }

    pub fn specified_controller(&self, id: &NodeId) -> String {
        self.key(format_args!("specified:controller:{}", id))
    }

    pub fn serial_node(&self, serial: &str) -> String {
        self.key(format_args!("sn:node:{}", serial))
    }

    pub fn serial_whitelist(&self) -> String {
        self.key(format_args!("sn:whiteList"))
    }

    pub fn blacklist(&self) -> String {
        self.key(format_args!("blacklist"))
    }

    pub fn online_duration(&self, id: &NodeId) -> String {
        self.key(format_args!("nodeOnlineDuration:{}", id))
    }

    pub fn online_duration_stats(&self, id: &NodeId) -> String {
        self.key(format_args!("onlineDurationStat:map:{}", id))
    }

    pub fn registrations(&self) -> String {
        self.key(format_args!("nodeRegist"))
    }

    /// Member of the app activity index for one app on one node.
    pub fn app_node_member(app: &str, id: &NodeId) -> String {
        format!("{}@{}", app, id)
    }

    /// Split an app activity member into `(app, node)`.
    pub fn split_app_node_member(member: &str) -> Option<(&str, NodeId)> {
        let (app, node) = member.split_once('@')?;
        if app.is_empty() || node.is_empty() {
            return None;
        }
        Some((app, NodeId::new(node)))
    }
}
