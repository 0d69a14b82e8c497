//! Control plane daemon configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::CatalogConfig;

/// Configuration for the control plane daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// Persistent state store
    pub store: StoreConfig,

    /// Geo-IP lookups
    pub geo: GeoConfig,

    /// Token signing and login
    pub auth: AuthConfig,

    /// Keepalive polling hints and online-duration accrual
    pub keepalive: KeepaliveConfig,

    /// Live session registry
    pub registry: RegistryConfig,

    /// Apps, resource profiles, channels and test nodes
    pub catalog: CatalogConfig,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            store: StoreConfig::default(),
            geo: GeoConfig::default(),
            auth: AuthConfig::default(),
            keepalive: KeepaliveConfig::default(),
            registry: RegistryConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

/// Which key-value backend holds durable state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// Redis server at `StoreConfig::url`
    Redis,
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,

    /// Connection URL for the redis backend
    pub url: String,

    /// Prefix prepended to every key, empty by default
    pub key_prefix: String,

    /// Upper bound on any single store round trip
    #[serde(with = "duration_secs")]
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// Geo-IP lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Location API; the client IP is appended as the `ip` query parameter.
    /// Empty disables lookups and every region is unknown.
    pub endpoint: String,

    /// Timeout of one lookup
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// How long a resolved region is reused
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout: Duration::from_secs(3),
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Token settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for node tokens; a random one is generated when empty
    pub jwt_secret: String,

    /// Returned to nodes in the `Web-Server` header on login
    pub web_server: String,
}

/// Keepalive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Hint sent after a rejected report
    #[serde(with = "duration_secs")]
    pub backoff_interval: Duration,

    /// Hint sent after an accepted report
    #[serde(with = "duration_secs")]
    pub steady_interval: Duration,

    /// Longest gap between reports still counted as online time
    #[serde(with = "duration_secs")]
    pub max_accrual_gap: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            backoff_interval: Duration::from_secs(2 * 60),
            steady_interval: Duration::from_secs(5 * 60),
            max_accrual_gap: Duration::from_secs(30 * 60),
        }
    }
}

/// Live session registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Sessions silent for longer than this are evicted
    #[serde(with = "duration_secs")]
    pub offline_threshold: Duration,

    /// How often the sweep runs
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::from_secs(7 * 60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}
