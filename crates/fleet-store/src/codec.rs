//! Hash field encoding of stored records.
//!
//! Field names are part of the key layout contract. Unset optional values
//! are written as empty strings and read back as `None`.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use fleet_core::{App, BizStatus, DiagnosticFlag, Node, NodeApp, NodeId};

use crate::error::StoreError;

type Fields = Vec<(String, String)>;

struct Writer(Fields);

impl Writer {
    fn text(mut self, field: &str, value: &str) -> Self {
        self.0.push((field.to_string(), value.to_string()));
        self
    }

    fn num(mut self, field: &str, value: impl ToString) -> Self {
        self.0.push((field.to_string(), value.to_string()));
        self
    }

    fn time(self, field: &str, value: Option<DateTime<Utc>>) -> Self {
        let encoded = value
            .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .unwrap_or_default();
        self.text(field, &encoded)
    }
}

struct Reader<'a> {
    key: &'a str,
    map: &'a HashMap<String, String>,
}

impl<'a> Reader<'a> {
    fn text(&self, field: &str) -> String {
        self.map.get(field).cloned().unwrap_or_default()
    }

    fn num<T: FromStr + Default>(&self, field: &str) -> Result<T, StoreError> {
        match self.map.get(field).map(|v| v.trim()) {
            None | Some("") => Ok(T::default()),
            Some(raw) => raw
                .parse()
                .map_err(|_| StoreError::corrupt(self.key, format!("{}={:?}", field, raw))),
        }
    }

    fn time(&self, field: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.map.get(field).map(|v| v.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| StoreError::corrupt(self.key, format!("{}: {}", field, e))),
        }
    }

    fn status(&self, field: &str) -> Result<Option<BizStatus>, StoreError> {
        match self.map.get(field).map(|v| v.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .and_then(BizStatus::from_code)
                .map(Some)
                .ok_or_else(|| StoreError::corrupt(self.key, format!("{}={:?}", field, raw))),
        }
    }

    fn flag(&self, field: &str) -> Result<DiagnosticFlag, StoreError> {
        let code: i64 = self.num(field)?;
        DiagnosticFlag::try_from(code).map_err(|e| StoreError::corrupt(self.key, e))
    }
}

pub(crate) fn node_fields(node: &Node) -> Fields {
    let service_state = node
        .service_state
        .map(|s| s.code().to_string())
        .unwrap_or_default();

    Writer(Vec::with_capacity(34))
        .text("id", node.id.as_str())
        .text("uuid", &node.uuid)
        .text("androidId", &node.android_id)
        .text("androidSerialNumber", &node.android_serial_number)
        .text("os", &node.os)
        .text("platform", &node.platform)
        .text("platformVersion", &node.platform_version)
        .text("arch", &node.arch)
        .num("bootTime", node.boot_time)
        .text("macs", &node.macs)
        .text("cpuModuleName", &node.cpu_module_name)
        .num("cpuCores", node.cpu_cores)
        .num("cpuMhz", node.cpu_mhz)
        .num("cpuUsage", node.cpu_usage)
        .text("gpu", &node.gpu)
        .num("totalMemory", node.total_memory)
        .num("usedMemory", node.used_memory)
        .num("availableMemory", node.available_memory)
        .text("memoryModel", &node.memory_model)
        .num("netIRate", node.net_i_rate)
        .num("netORate", node.net_o_rate)
        .text("baseboard", &node.baseboard)
        .num("totalDisk", node.total_disk)
        .num("freeDisk", node.free_disk)
        .text("diskModel", &node.disk_model)
        .time("lastActivityTime", node.last_activity_time)
        .text("ip", &node.ip)
        .text("version", &node.version)
        .text("channel", &node.channel)
        .text("serviceState", &service_state)
        .num("cgroup", node.cgroup.code())
        .text("cgroupOut", &node.cgroup_out)
        .num("iptables", node.iptables.code())
        .text("iptablesOut", &node.iptables_out)
        .0
}

/// Decode a node hash, `Ok(None)` when the hash is empty or has no id.
pub(crate) fn node_from_fields(
    key: &str,
    map: &HashMap<String, String>,
) -> Result<Option<Node>, StoreError> {
    let r = Reader { key, map };
    let id = r.text("id");
    if id.is_empty() {
        return Ok(None);
    }

    Ok(Some(Node {
        id: NodeId::new(id),
        uuid: r.text("uuid"),
        android_id: r.text("androidId"),
        android_serial_number: r.text("androidSerialNumber"),
        os: r.text("os"),
        platform: r.text("platform"),
        platform_version: r.text("platformVersion"),
        arch: r.text("arch"),
        boot_time: r.num("bootTime")?,
        macs: r.text("macs"),
        cpu_module_name: r.text("cpuModuleName"),
        cpu_cores: r.num("cpuCores")?,
        cpu_mhz: r.num("cpuMhz")?,
        cpu_usage: r.num("cpuUsage")?,
        gpu: r.text("gpu"),
        total_memory: r.num("totalMemory")?,
        used_memory: r.num("usedMemory")?,
        available_memory: r.num("availableMemory")?,
        memory_model: r.text("memoryModel"),
        net_i_rate: r.num("netIRate")?,
        net_o_rate: r.num("netORate")?,
        baseboard: r.text("baseboard"),
        total_disk: r.num("totalDisk")?,
        free_disk: r.num("freeDisk")?,
        disk_model: r.text("diskModel"),
        last_activity_time: r.time("lastActivityTime")?,
        ip: r.text("ip"),
        version: r.text("version"),
        channel: r.text("channel"),
        service_state: r.status("serviceState")?,
        cgroup: r.flag("cgroup")?,
        cgroup_out: r.text("cgroupOut"),
        iptables: r.flag("iptables")?,
        iptables_out: r.text("iptablesOut"),
    }))
}

pub(crate) fn app_fields(app: &App) -> Fields {
    Writer(Vec::with_capacity(6))
        .text("appName", &app.app_name)
        .text("appDir", &app.app_dir)
        .text("scriptName", &app.script_name)
        .text("scriptMD5", &app.script_md5)
        .text("version", &app.version)
        .text("scriptURL", &app.script_url)
        .0
}

pub(crate) fn app_from_fields(map: &HashMap<String, String>) -> Option<App> {
    let app_name = map.get("appName").cloned().unwrap_or_default();
    if app_name.is_empty() {
        return None;
    }
    let text = |field: &str| map.get(field).cloned().unwrap_or_default();
    Some(App {
        app_name,
        app_dir: text("appDir"),
        script_name: text("scriptName"),
        script_md5: text("scriptMD5"),
        version: text("version"),
        script_url: text("scriptURL"),
    })
}

pub(crate) fn node_app_fields(app: &NodeApp) -> Fields {
    Writer(Vec::with_capacity(4))
        .text("appName", &app.app_name)
        .text("md5", &app.md5)
        .text("metric", &app.metric)
        .time("lastActivityTime", app.last_activity_time)
        .0
}

pub(crate) fn node_app_from_fields(
    key: &str,
    map: &HashMap<String, String>,
) -> Result<Option<NodeApp>, StoreError> {
    let r = Reader { key, map };
    let app_name = r.text("appName");
    if app_name.is_empty() {
        return Ok(None);
    }
    Ok(Some(NodeApp {
        app_name,
        md5: r.text("md5"),
        metric: r.text("metric"),
        last_activity_time: r.time("lastActivityTime")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn to_map(fields: Fields) -> HashMap<String, String> {
        fields.into_iter().collect()
    }

    #[test]
    fn test_node_fields_roundtrip() {
        let node = Node {
            id: NodeId::new("n1"),
            os: "linux".into(),
            cpu_cores: 4,
            cpu_mhz: 2399.5,
            total_memory: 8 << 30,
            last_activity_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
            service_state: Some(BizStatus::ResourceWaitAudit),
            iptables: DiagnosticFlag::Enabled,
            iptables_out: "iptables v1.8".into(),
            ..Default::default()
        };

        let map = to_map(node_fields(&node));
        assert_eq!(map["serviceState"], "2");
        assert_eq!(map["cpuCores"], "4");

        let back = node_from_fields("node:n1", &map).unwrap().unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_unset_optionals_roundtrip() {
        let node = Node::new("n2");
        let map = to_map(node_fields(&node));
        assert_eq!(map["lastActivityTime"], "");
        assert_eq!(map["serviceState"], "");
        let back = node_from_fields("node:n2", &map).unwrap().unwrap();
        assert_eq!(back.last_activity_time, None);
        assert_eq!(back.service_state, None);
    }

    #[test]
    fn test_empty_hash_is_absent() {
        assert_eq!(node_from_fields("node:x", &HashMap::new()).unwrap(), None);
    }

    #[test]
    fn test_corrupt_number() {
        let mut map = to_map(node_fields(&Node::new("n3")));
        map.insert("cpuCores".into(), "many".into());
        let err = node_from_fields("node:n3", &map).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_app_fields_roundtrip() {
        let app = App {
            app_name: "pedge".into(),
            app_dir: "apps/pedge".into(),
            script_name: "pedge.lua".into(),
            script_md5: "abc".into(),
            version: "1.0".into(),
            script_url: "https://example.invalid/pedge.lua".into(),
        };
        let map = to_map(app_fields(&app));
        assert_eq!(app_from_fields(&map), Some(app));
    }
}
