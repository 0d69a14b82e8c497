//! Persisted node record and the report merge rule

use chrono::{DateTime, Utc};
use fleet_protocol::DeviceReport;
use serde::{Deserialize, Serialize};

use crate::types::{BizStatus, DiagnosticFlag, NodeId};

/// One physical or virtual fleet member as persisted by the control plane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub uuid: String,
    pub android_id: String,
    pub android_serial_number: String,
    pub os: String,
    pub platform: String,
    pub platform_version: String,
    pub arch: String,
    pub boot_time: i64,
    pub macs: String,
    pub cpu_module_name: String,
    pub cpu_cores: i64,
    pub cpu_mhz: f64,
    pub cpu_usage: f64,
    pub gpu: String,
    pub total_memory: i64,
    pub used_memory: i64,
    pub available_memory: i64,
    pub memory_model: String,
    pub net_i_rate: f64,
    pub net_o_rate: f64,
    pub baseboard: String,
    pub total_disk: i64,
    pub free_disk: i64,
    pub disk_model: String,
    /// `None` until the node has been seen once
    pub last_activity_time: Option<DateTime<Utc>>,
    pub ip: String,
    pub version: String,
    pub channel: String,
    /// `None` until a distribution decision has been stored
    pub service_state: Option<BizStatus>,
    pub cgroup: DiagnosticFlag,
    pub cgroup_out: String,
    pub iptables: DiagnosticFlag,
    pub iptables_out: String,
}

fn merge_text(dst: &mut String, src: &str) {
    if !src.is_empty() {
        *dst = src.to_string();
    }
}

fn merge_int(dst: &mut i64, src: i64) {
    if src != 0 {
        *dst = src;
    }
}

fn merge_float(dst: &mut f64, src: f64) {
    if src != 0.0 {
        *dst = src;
    }
}

impl Node {
    /// A zero-value node keyed by `id`
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Copy the reported facts that are set onto this node.
    ///
    /// Text overwrites only when non-empty and numbers only when non-zero,
    /// so a report that omits a field never erases what is stored. The
    /// identity field `id` is owned by the caller and never touched.
    pub fn absorb_report(&mut self, report: &DeviceReport) {
        merge_text(&mut self.uuid, &report.uuid);
        merge_text(&mut self.android_id, &report.android_id);
        merge_text(&mut self.android_serial_number, &report.android_serial_number);
        merge_text(&mut self.os, &report.os);
        merge_text(&mut self.platform, &report.platform);
        merge_text(&mut self.platform_version, &report.platform_version);
        merge_text(&mut self.arch, &report.arch);
        merge_int(&mut self.boot_time, report.boot_time);
        merge_text(&mut self.macs, &report.macs);
        merge_text(&mut self.cpu_module_name, &report.cpu_module_name);
        merge_int(&mut self.cpu_cores, report.cpu_cores);
        merge_float(&mut self.cpu_mhz, report.cpu_mhz);
        merge_float(&mut self.cpu_usage, report.cpu_usage);
        merge_text(&mut self.gpu, &report.gpu);
        merge_int(&mut self.total_memory, report.total_memory);
        merge_int(&mut self.used_memory, report.used_memory);
        merge_int(&mut self.available_memory, report.available_memory);
        merge_text(&mut self.memory_model, &report.memory_model);
        merge_float(&mut self.net_i_rate, report.net_i_rate);
        merge_float(&mut self.net_o_rate, report.net_o_rate);
        merge_text(&mut self.baseboard, &report.baseboard);
        merge_int(&mut self.total_disk, report.total_disk);
        merge_int(&mut self.free_disk, report.free_disk);
        merge_text(&mut self.disk_model, &report.disk_model);
        merge_text(&mut self.version, &report.version);
        merge_text(&mut self.channel, &report.channel);
    }

    /// Copy the set fields of another node record onto this one.
    ///
    /// Same rule as [`Node::absorb_report`]; optional fields overwrite only
    /// when `Some`, diagnostics only when checked.
    pub fn absorb_node(&mut self, other: &Node) {
        merge_text(&mut self.uuid, &other.uuid);
        merge_text(&mut self.android_id, &other.android_id);
        merge_text(&mut self.android_serial_number, &other.android_serial_number);
        merge_text(&mut self.os, &other.os);
        merge_text(&mut self.platform, &other.platform);
        merge_text(&mut self.platform_version, &other.platform_version);
        merge_text(&mut self.arch, &other.arch);
        merge_int(&mut self.boot_time, other.boot_time);
        merge_text(&mut self.macs, &other.macs);
        merge_text(&mut self.cpu_module_name, &other.cpu_module_name);
        merge_int(&mut self.cpu_cores, other.cpu_cores);
        merge_float(&mut self.cpu_mhz, other.cpu_mhz);
        merge_float(&mut self.cpu_usage, other.cpu_usage);
        merge_text(&mut self.gpu, &other.gpu);
        merge_int(&mut self.total_memory, other.total_memory);
        merge_int(&mut self.used_memory, other.used_memory);
        merge_int(&mut self.available_memory, other.available_memory);
        merge_text(&mut self.memory_model, &other.memory_model);
        merge_float(&mut self.net_i_rate, other.net_i_rate);
        merge_float(&mut self.net_o_rate, other.net_o_rate);
        merge_text(&mut self.baseboard, &other.baseboard);
        merge_int(&mut self.total_disk, other.total_disk);
        merge_int(&mut self.free_disk, other.free_disk);
        merge_text(&mut self.disk_model, &other.disk_model);
        if other.last_activity_time.is_some() {
            self.last_activity_time = other.last_activity_time;
        }
        merge_text(&mut self.ip, &other.ip);
        merge_text(&mut self.version, &other.version);
        merge_text(&mut self.channel, &other.channel);
        if other.service_state.is_some() {
            self.service_state = other.service_state;
        }
        if other.cgroup != DiagnosticFlag::Unchecked {
            self.cgroup = other.cgroup;
        }
        merge_text(&mut self.cgroup_out, &other.cgroup_out);
        if other.iptables != DiagnosticFlag::Unchecked {
            self.iptables = other.iptables;
        }
        merge_text(&mut self.iptables_out, &other.iptables_out);
    }

    /// Whether the node is the mobile app build rather than a full host
    pub fn is_android_app(&self) -> bool {
        self.os == "Android" && self.platform == "Linux"
    }

    /// Record the outcome of the cgroup check along with its raw output
    pub fn set_cgroup(&mut self, flag: DiagnosticFlag, raw: impl Into<String>) {
        self.cgroup = flag;
        self.cgroup_out = raw.into();
    }

    /// Record the outcome of the iptables check along with its raw output
    pub fn set_iptables(&mut self, flag: DiagnosticFlag, raw: impl Into<String>) {
        self.iptables = flag;
        self.iptables_out = raw.into();
    }
}
