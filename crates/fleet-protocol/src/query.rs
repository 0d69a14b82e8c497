//! Query parameters of the configuration endpoints

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Resources a node declares when it asks for its app list
///
/// Memory and disk arrive in bytes and are normalised to MiB and GiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuery {
    pub os: String,
    pub arch: String,
    pub cpu_cores: i64,
    pub memory_mb: f64,
    pub disk_gb: f64,
}

impl ResourceQuery {
    /// Read `os`, `arch`, `cpu`, `memory` and `disk` from the query string.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let bytes = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or_default()
        };

        Self {
            os: params.get("os").cloned().unwrap_or_default(),
            arch: params.get("arch").cloned().unwrap_or_default(),
            cpu_cores: params
                .get("cpu")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_default(),
            memory_mb: bytes("memory") / BYTES_PER_MIB,
            disk_gb: bytes("disk") / BYTES_PER_GIB,
        }
    }
}

/// Parameters of the controller binary lookup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerQuery {
    pub uuid: String,
    pub os: String,
    pub arch: String,
    #[serde(rename = "isBox")]
    pub is_box: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_query_units() {
        let params: HashMap<String, String> = [
            ("os", "linux"),
            ("cpu", "4"),
            ("memory", "8589934592"),
            ("disk", "107374182400"),
            ("arch", "x86_64"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let query = ResourceQuery::from_query(&params);
        assert_eq!(query.os, "linux");
        assert_eq!(query.cpu_cores, 4);
        assert_eq!(query.memory_mb, 8192.0);
        assert_eq!(query.disk_gb, 100.0);
        assert_eq!(query.arch, "x86_64");
    }

    #[test]
    fn test_resource_query_missing_values() {
        let query = ResourceQuery::from_query(&HashMap::new());
        assert_eq!(query, ResourceQuery::default());
    }
}
