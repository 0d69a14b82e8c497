//! Device facts reported by a node
//!
//! The same shape arrives two ways: as the `node` object of a keepalive
//! body, and as URL query parameters on the configuration endpoints.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Hardware, network and identity facts a node reports about itself
///
/// Fields a node did not collect are left at their zero value; the control
/// plane never lets a zero value overwrite previously stored data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceReport {
    pub id: String,
    pub uuid: String,
    #[serde(rename = "androidID", alias = "androidId")]
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
    #[serde(rename = "totalmemory", alias = "totalMemory")]
    pub total_memory: i64,
    pub used_memory: i64,
    pub available_memory: i64,
    pub memory_model: String,
    pub total_disk: i64,
    pub free_disk: i64,
    pub disk_model: String,
    pub net_i_rate: f64,
    pub net_o_rate: f64,
    pub baseboard: String,
    pub working_dir: String,
    pub channel: String,
    pub version: String,
}

impl DeviceReport {
    /// Build a report from URL query parameters.
    ///
    /// Numeric parameters that fail to parse are treated as not reported.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let text = |key: &str| params.get(key).cloned().unwrap_or_default();
        let int = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or_default()
        };
        let float = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or_default()
        };

        Self {
            id: text("node_id"),
            uuid: text("uuid"),
            android_id: text("androidID"),
            android_serial_number: text("androidSerialNumber"),
            os: text("os"),
            platform: text("platform"),
            platform_version: text("platformVersion"),
            arch: text("arch"),
            boot_time: int("bootTime"),
            macs: text("macs"),
            cpu_module_name: text("cpuModuleName"),
            cpu_cores: int("cpuCores"),
            cpu_mhz: float("cpuMhz"),
            cpu_usage: float("cpuUsage"),
            gpu: text("gpu"),
            total_memory: int("totalmemory"),
            used_memory: int("usedMemory"),
            available_memory: int("availableMemory"),
            memory_model: text("memoryModel"),
            total_disk: int("totalDisk"),
            free_disk: int("freeDisk"),
            disk_model: text("diskModel"),
            net_i_rate: float("netIRate"),
            net_o_rate: float("netORate"),
            baseboard: text("baseboard"),
            working_dir: text("workingDir"),
            channel: text("channel"),
            version: text("version"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_query_reads_known_fields() {
        let report = DeviceReport::from_query(&params(&[
            ("uuid", "u-1"),
            ("os", "linux"),
            ("cpuCores", "8"),
            ("cpuUsage", "12.5"),
            ("totalmemory", "8589934592"),
            ("channel", "edge"),
        ]));

        assert_eq!(report.uuid, "u-1");
        assert_eq!(report.os, "linux");
        assert_eq!(report.cpu_cores, 8);
        assert_eq!(report.cpu_usage, 12.5);
        assert_eq!(report.total_memory, 8_589_934_592);
        assert_eq!(report.channel, "edge");
    }

    #[test]
    fn test_from_query_tolerates_garbage_numbers() {
        let report = DeviceReport::from_query(&params(&[("cpuCores", ""), ("cpuMhz", "fast")]));
        assert_eq!(report.cpu_cores, 0);
        assert_eq!(report.cpu_mhz, 0.0);
    }

    #[test]
    fn test_json_field_names() {
        let json = r#"{"id":"n1","androidID":"a","totalmemory":1024,"netIRate":1.5,"cpuMhz":2400}"#;
        let report: DeviceReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.id, "n1");
        assert_eq!(report.android_id, "a");
        assert_eq!(report.total_memory, 1024);
        assert_eq!(report.net_i_rate, 1.5);
        assert_eq!(report.cpu_mhz, 2400.0);
    }
}
