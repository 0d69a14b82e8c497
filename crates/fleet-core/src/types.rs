//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a fleet node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Business status of a node's current app rollout
///
/// The numeric codes are part of the wire contract: they are persisted in
/// the node hash and returned in the `ServiceState`/`InitState` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum BizStatus {
    /// Resource audit in progress, short ETA
    WaitAudit,
    /// Resource audit in progress, long ETA
    ResourceWaitAudit,
    /// The node's region is not served
    AreaUnsupported,
    /// Region served but no app fits the node's resources
    NoTask,
    /// Environment preparation in progress
    Initing,
    /// An app reported a persistent error
    Err,
    /// Node already fulfils a long-running external role
    ReservedRunning,
}

impl BizStatus {
    /// Numeric wire code
    pub fn code(self) -> i64 {
        match self {
            BizStatus::WaitAudit => 0,
            BizStatus::ResourceWaitAudit => 2,
            BizStatus::AreaUnsupported => 5,
            BizStatus::NoTask => 7,
            BizStatus::Initing => 11,
            BizStatus::Err => 12,
            BizStatus::ReservedRunning => 100,
        }
    }

    /// Decode a wire code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(BizStatus::WaitAudit),
            2 => Some(BizStatus::ResourceWaitAudit),
            5 => Some(BizStatus::AreaUnsupported),
            7 => Some(BizStatus::NoTask),
            11 => Some(BizStatus::Initing),
            12 => Some(BizStatus::Err),
            100 => Some(BizStatus::ReservedRunning),
            _ => None,
        }
    }

    /// Whether the node is waiting on a resource audit
    pub fn is_audit_pending(self) -> bool {
        matches!(self, BizStatus::WaitAudit | BizStatus::ResourceWaitAudit)
    }
}

impl From<BizStatus> for i64 {
    fn from(status: BizStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for BizStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        BizStatus::from_code(code).ok_or_else(|| format!("unknown business status code {}", code))
    }
}

impl fmt::Display for BizStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BizStatus::WaitAudit => "wait-audit",
            BizStatus::ResourceWaitAudit => "resource-wait-audit",
            BizStatus::AreaUnsupported => "area-unsupported",
            BizStatus::NoTask => "no-task",
            BizStatus::Initing => "initing",
            BizStatus::Err => "err",
            BizStatus::ReservedRunning => "reserved-running",
        };
        write!(f, "{}({})", name, self.code())
    }
}

/// Result of a host diagnostic such as the cgroup or iptables check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum DiagnosticFlag {
    /// Never checked
    #[default]
    Unchecked,
    /// Enabled or installed
    Enabled,
    /// Disabled or missing
    Disabled,
}

impl DiagnosticFlag {
    /// Numeric wire code
    pub fn code(self) -> i64 {
        match self {
            DiagnosticFlag::Unchecked => 0,
            DiagnosticFlag::Enabled => 1,
            DiagnosticFlag::Disabled => 2,
        }
    }
}

impl From<DiagnosticFlag> for i64 {
    fn from(flag: DiagnosticFlag) -> Self {
        flag.code()
    }
}

impl TryFrom<i64> for DiagnosticFlag {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(DiagnosticFlag::Unchecked),
            1 => Ok(DiagnosticFlag::Enabled),
            2 => Ok(DiagnosticFlag::Disabled),
            other => Err(format!("unknown diagnostic flag {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biz_status_codes_roundtrip() {
        for status in [
            BizStatus::WaitAudit,
            BizStatus::ResourceWaitAudit,
            BizStatus::AreaUnsupported,
            BizStatus::NoTask,
            BizStatus::Initing,
            BizStatus::Err,
            BizStatus::ReservedRunning,
        ] {
            assert_eq!(BizStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(BizStatus::from_code(3), None);
    }

    #[test]
    fn test_biz_status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&BizStatus::Initing).unwrap(), "11");
        let status: BizStatus = serde_json::from_str("100").unwrap();
        assert_eq!(status, BizStatus::ReservedRunning);
        assert!(serde_json::from_str::<BizStatus>("42").is_err());
    }

    #[test]
    fn test_audit_pending() {
        assert!(BizStatus::WaitAudit.is_audit_pending());
        assert!(BizStatus::ResourceWaitAudit.is_audit_pending());
        assert!(!BizStatus::Initing.is_audit_pending());
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(format!("{}", NodeId::new("node-1")), "node-1");
        assert!(NodeId::default().is_empty());
    }
}
