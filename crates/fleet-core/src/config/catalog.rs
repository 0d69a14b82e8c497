//! App catalog
//!
//! The catalog is loaded once from configuration and is immutable at
//! runtime. It lists the deployable apps, the named resource profiles they
//! require, per-channel app lists, test nodes that bypass matching, the Lua
//! scripts and controller binaries handed to nodes, and the business state a
//! node jumps to once an app of a given tag reports a client id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::BizStatus;

/// A deployable application definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    /// Directory relative to the node's working directory
    pub app_dir: String,
    pub script_name: String,
    #[serde(rename = "scriptMD5")]
    pub script_md5: String,
    pub version: String,
    #[serde(rename = "scriptURL")]
    pub script_url: String,
    /// Names of resource profiles, any one of which must fit
    pub req_resources: Vec<String>,
    /// Countries the app is served in, empty means everywhere
    pub req_locations: Vec<String>,
    /// Countries the app is never served in
    pub req_locations_exclude: Vec<String>,
    /// Whether the app is handed out in default mode
    pub auto_load: bool,
    /// Business tag, also selects the metric family
    pub tag: String,
}

/// Minimum resources for an app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceProfile {
    pub os: String,
    pub min_cpu: i64,
    pub min_memory_mb: f64,
    pub min_disk_gb: f64,
    /// Matched by substring containment against the node's arch
    pub arch: String,
}

/// Static override for a node under test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestNode {
    /// Exact app list the node receives
    pub apps: Vec<String>,
    /// Lua script name the node receives
    pub lua_script: String,
    /// Controller binary name the node receives
    pub controller: String,
}

/// A downloadable file: a Lua script or a controller binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub name: String,
    pub os: String,
    pub url: String,
    pub md5: String,
    pub version: String,
    /// Empty for the generic build, an arch or `box` for specialised ones
    pub tag: String,
}

/// The whole catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub apps: Vec<AppConfig>,
    pub resources: HashMap<String, ResourceProfile>,
    /// Channel name to the app names served on it
    pub channel_apps: HashMap<String, Vec<String>>,
    /// Node id to its test override
    pub test_nodes: HashMap<String, TestNode>,
    pub lua_files: Vec<FileConfig>,
    pub controller_files: Vec<FileConfig>,
    /// App tag to the state a node takes once the app reports a client id.
    /// Keys ending in `:` match any tag with that prefix.
    pub client_id_states: HashMap<String, BizStatus>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let client_id_states = [
            ("pedge", BizStatus::ResourceWaitAudit),
            ("niulinkant", BizStatus::WaitAudit),
            ("painet", BizStatus::ResourceWaitAudit),
            ("vmbox:", BizStatus::ReservedRunning),
            ("emc-titan-l2", BizStatus::ReservedRunning),
        ]
        .into_iter()
        .map(|(tag, state)| (tag.to_string(), state))
        .collect();

        Self {
            apps: Vec::new(),
            resources: HashMap::new(),
            channel_apps: HashMap::new(),
            test_nodes: HashMap::new(),
            lua_files: Vec::new(),
            controller_files: Vec::new(),
            client_id_states,
        }
    }
}

impl CatalogConfig {
    /// Look up an app by name
    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.app_name == name)
    }

    /// Look up a resource profile by name
    pub fn resource(&self, name: &str) -> Option<&ResourceProfile> {
        self.resources.get(name)
    }

    /// The test override for a node, if any
    pub fn test_node(&self, node_id: &str) -> Option<&TestNode> {
        self.test_nodes.get(node_id)
    }

    /// Whether `app` is listed under `channel`
    pub fn channel_includes(&self, channel: &str, app: &str) -> bool {
        self.channel_apps
            .get(channel)
            .is_some_and(|apps| apps.iter().any(|a| a == app))
    }

    /// State a node takes once an app with `tag` reports a client id.
    ///
    /// Exact tags win over `prefix:` entries; unknown tags map to `Initing`.
    pub fn client_id_state(&self, tag: &str) -> BizStatus {
        if let Some(state) = self.client_id_states.get(tag) {
            return *state;
        }
        self.client_id_states
            .iter()
            .filter(|(key, _)| key.ends_with(':') && tag.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, state)| *state)
            .unwrap_or(BizStatus::Initing)
    }

    /// Lua script by name
    pub fn lua_file(&self, name: &str) -> Option<&FileConfig> {
        self.lua_files.iter().find(|f| f.name == name)
    }

    /// Controller binary by name
    pub fn controller_file(&self, name: &str) -> Option<&FileConfig> {
        self.controller_files.iter().find(|f| f.name == name)
    }
}
