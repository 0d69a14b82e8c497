//! App, per-node app and registration records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::types::NodeId;

/// Persisted projection of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct App {
    pub app_name: String,
    pub app_dir: String,
    pub script_name: String,
    #[serde(rename = "scriptMD5")]
    pub script_md5: String,
    pub version: String,
    #[serde(rename = "scriptURL")]
    pub script_url: String,
}

impl From<&AppConfig> for App {
    fn from(config: &AppConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            app_dir: config.app_dir.clone(),
            script_name: config.script_name.clone(),
            script_md5: config.script_md5.clone(),
            version: config.version.clone(),
            script_url: config.script_url.clone(),
        }
    }
}

/// The runtime record of one app on one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeApp {
    pub app_name: String,
    pub md5: String,
    /// Raw metric payload as last reported, never merged
    pub metric: String,
    pub last_activity_time: Option<DateTime<Utc>>,
}

/// Cryptographic identity bound to a node
///
/// In practice exactly one of the two keys is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeRegistration {
    pub node_id: NodeId,
    /// PEM encoded RSA public key
    pub public_key: String,
    /// Hex encoded compressed secp256k1 public key
    pub secp256k1_public_key: String,
    /// Unix seconds of the first registration
    pub created_time: i64,
}

/// Operator overrides applied on top of the computed app set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideLayers {
    /// Replaces the computed set when non-empty
    pub specified: Vec<String>,
    /// Appended to whichever set survives
    pub extra: Vec<String>,
    /// Filtered out last, whatever the source
    pub removed: Vec<String>,
}

impl OverrideLayers {
    /// Whether no layer is set
    pub fn is_empty(&self) -> bool {
        self.specified.is_empty() && self.extra.is_empty() && self.removed.is_empty()
    }
}
