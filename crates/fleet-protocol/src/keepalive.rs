//! Keepalive and metrics bodies

use serde::{Deserialize, Serialize};

use crate::device::DeviceReport;
use crate::error::ProtocolError;

/// Periodic report a node posts to the keepalive endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveRequest {
    pub node: DeviceReport,
    pub apps: Vec<AppReport>,
}

impl KeepaliveRequest {
    /// Decode a keepalive body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// One application as seen running on the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppReport {
    #[serde(rename = "appName")]
    pub app_name: String,
    #[serde(rename = "scriptMD5")]
    pub script_md5: String,
    /// Free-form JSON whose shape depends on the app family
    pub metric: String,
    /// App family tag, selects how `metric` is interpreted
    pub tag: String,
}

/// Decode the body of a metrics push, a bare JSON array of apps.
pub fn decode_app_reports(body: &[u8]) -> Result<Vec<AppReport>, ProtocolError> {
    Ok(serde_json::from_slice(body)?)
}
