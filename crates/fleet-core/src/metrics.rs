//! App metric payloads
//!
//! Every app reports a free-form JSON metric whose shape depends on the app
//! family. The family is chosen from the app's tag and the payload decoded
//! into the matching variant of [`MetricPayload`].

use std::fmt;

use serde::Deserialize;

use crate::error::MetricError;
use crate::types::DiagnosticFlag;

/// Status string an app reports while it is healthy
pub const RUNNING: &str = "running";

/// Closed set of metric payload shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFamily {
    Generic,
    VmBox,
    TitanL2,
    Vps,
}

impl MetricFamily {
    /// Select the family from an app tag, case-insensitively
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "vmbox" | "vmboxes" => MetricFamily::VmBox,
            "titanl2" => MetricFamily::TitanL2,
            "vps" => MetricFamily::Vps,
            _ => MetricFamily::Generic,
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFamily::Generic => write!(f, "generic"),
            MetricFamily::VmBox => write!(f, "vmbox"),
            MetricFamily::TitanL2 => write!(f, "titanl2"),
            MetricFamily::Vps => write!(f, "vps"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenericMetric {
    pub client_id: String,
    pub status: String,
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VmBoxMetric {
    pub client_id: String,
    pub status: String,
    pub err: String,
    pub cdn_vendor: String,
    pub vm_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TitanL2Metric {
    /// The L2 node id doubles as the third-party client id
    pub node_id: String,
    pub status: String,
    pub err: String,
    #[serde(rename = "nodeInfo")]
    pub node_info: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VpsMetric {
    pub client_id: String,
    pub status: String,
    pub err: String,
    /// Raw `mount` output for cgroup filesystems
    pub cgroup: String,
    /// Raw iptables version output
    pub iptables: String,
}

impl VpsMetric {
    /// Enabled when a writable cgroup v1 hierarchy is mounted
    pub fn cgroup_flag(&self) -> DiagnosticFlag {
        if self.cgroup.lines().any(is_writable_cgroup_mount) {
            DiagnosticFlag::Enabled
        } else {
            DiagnosticFlag::Disabled
        }
    }

    /// Enabled when iptables printed anything at all
    pub fn iptables_flag(&self) -> DiagnosticFlag {
        if self.iptables.trim().is_empty() {
            DiagnosticFlag::Disabled
        } else {
            DiagnosticFlag::Enabled
        }
    }
}

/// Match `<src> on /sys/fs/cgroup/<x> type cgroup (...rw...)`.
fn is_writable_cgroup_mount(line: &str) -> bool {
    let mut fields = line.split_whitespace();
    let (Some(_source), Some("on"), Some(target), Some("type"), Some("cgroup")) = (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) else {
        return false;
    };

    let under_cgroup_root = target
        .strip_prefix("/sys/fs/cgroup/")
        .is_some_and(|rest| !rest.is_empty());
    if !under_cgroup_root {
        return false;
    }

    fields.any(|options| {
        options
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .any(|word| word == "rw")
    })
}

/// A decoded metric payload
#[derive(Debug, Clone, PartialEq)]
pub enum MetricPayload {
    Generic(GenericMetric),
    VmBox(VmBoxMetric),
    TitanL2(TitanL2Metric),
    Vps(VpsMetric),
}

impl MetricPayload {
    /// Decode `raw` as the shape of `family`.
    pub fn parse(family: MetricFamily, raw: &str) -> Result<Self, MetricError> {
        if raw.trim().is_empty() {
            return Err(MetricError::Empty);
        }
        let decode_err = |source| MetricError::Decode { family, source };
        let payload = match family {
            MetricFamily::Generic => {
                MetricPayload::Generic(serde_json::from_str(raw).map_err(decode_err)?)
            }
            MetricFamily::VmBox => {
                MetricPayload::VmBox(serde_json::from_str(raw).map_err(decode_err)?)
            }
            MetricFamily::TitanL2 => {
                MetricPayload::TitanL2(serde_json::from_str(raw).map_err(decode_err)?)
            }
            MetricFamily::Vps => MetricPayload::Vps(serde_json::from_str(raw).map_err(decode_err)?),
        };
        Ok(payload)
    }

    /// Decode `raw` with the family selected by `tag`.
    pub fn parse_tagged(tag: &str, raw: &str) -> Result<Self, MetricError> {
        Self::parse(MetricFamily::from_tag(tag), raw)
    }

    /// Third-party client id, empty until the app has been provisioned
    pub fn client_id(&self) -> &str {
        match self {
            MetricPayload::Generic(m) => &m.client_id,
            MetricPayload::VmBox(m) => &m.client_id,
            MetricPayload::TitanL2(m) => &m.node_id,
            MetricPayload::Vps(m) => &m.client_id,
        }
    }

    /// Reported status, `"running"` when healthy
    pub fn status(&self) -> &str {
        match self {
            MetricPayload::Generic(m) => &m.status,
            MetricPayload::VmBox(m) => &m.status,
            MetricPayload::TitanL2(m) => &m.status,
            MetricPayload::Vps(m) => &m.status,
        }
    }

    /// Reported error string
    pub fn error(&self) -> &str {
        match self {
            MetricPayload::Generic(m) => &m.err,
            MetricPayload::VmBox(m) => &m.err,
            MetricPayload::TitanL2(m) => &m.err,
            MetricPayload::Vps(m) => &m.err,
        }
    }

    /// Whether the payload reports a healthy app
    pub fn is_running(&self) -> bool {
        self.status() == RUNNING
    }

    /// Whether the payload reports a persistent, non-transient error
    pub fn has_persistent_error(&self) -> bool {
        let err = self.error();
        !err.is_empty() && err != RUNNING
    }
}
