//! App selection against the catalog

use std::sync::Arc;

use fleet_core::config::{AppConfig, CatalogConfig, FileConfig, TestNode};
use fleet_core::BizStatus;
use fleet_protocol::{ControllerQuery, ResourceQuery};

use super::matcher::{region_served, region_supported, resource_match};
use crate::business::state_before_init;

/// What a node asked for
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub node_id: &'a str,
    pub uuid: &'a str,
    /// Empty for default mode
    pub channel: &'a str,
    pub resources: &'a ResourceQuery,
    /// `None` when the client address or its country is unknown
    pub region: Option<&'a str>,
}

/// The base app set and the status it implies, before overrides
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub apps: Vec<AppConfig>,
    pub state: BizStatus,
}

impl Selection {
    pub fn app_names(&self) -> Vec<String> {
        self.apps.iter().map(|a| a.app_name.clone()).collect()
    }
}

/// Pure selection logic over an immutable catalog
#[derive(Clone)]
pub struct DistributionEngine {
    catalog: Arc<CatalogConfig>,
}

impl DistributionEngine {
    pub fn new(catalog: Arc<CatalogConfig>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &CatalogConfig {
        &self.catalog
    }

    fn test_node(&self, node_id: &str, uuid: &str) -> Option<&TestNode> {
        self.catalog
            .test_node(node_id)
            .or_else(|| self.catalog.test_node(uuid))
    }

    /// Compute the base app set and the status it implies.
    ///
    /// A test node receives exactly its listed apps. A region no catalog
    /// app lists is unsupported. Otherwise a channel request receives the
    /// channel's apps that may run in the region, and a default request
    /// receives every auto-load app that fits its resources and may run in
    /// the region; an empty result means no task.
    pub fn select(&self, req: &SelectionRequest<'_>) -> Selection {
        let catalog = &*self.catalog;

        if let Some(test) = self
            .test_node(req.node_id, req.uuid)
            .filter(|t| !t.apps.is_empty())
        {
            let apps: Vec<AppConfig> = catalog
                .apps
                .iter()
                .filter(|app| test.apps.contains(&app.app_name))
                .cloned()
                .collect();
            let state = state_before_init(!apps.is_empty());
            return Selection { apps, state };
        }

        if !region_served(catalog, req.region) {
            return Selection {
                apps: Vec::new(),
                state: BizStatus::AreaUnsupported,
            };
        }

        let candidates = catalog.apps.iter().filter(|app| {
            if req.channel.is_empty() {
                app.auto_load
            } else {
                catalog.channel_includes(req.channel, &app.app_name)
            }
        });
        let apps: Vec<AppConfig> = candidates
            .filter(|app| region_supported(app, req.region))
            .filter(|app| !req.channel.is_empty() || resource_match(catalog, app, req.resources))
            .cloned()
            .collect();
        let state = state_before_init(!apps.is_empty());
        Selection { apps, state }
    }

    /// The Lua script for a bootstrap agent.
    ///
    /// A test node gets its configured script and nothing else; any other
    /// agent gets the first script for its OS.
    pub fn select_lua_script(&self, os: &str, uuid: &str) -> Option<&FileConfig> {
        match self
            .catalog
            .test_node(uuid)
            .filter(|t| !t.lua_script.is_empty())
        {
            Some(test) => self.catalog.lua_file(&test.lua_script),
            None => self.catalog.lua_files.iter().find(|f| f.os == os),
        }
    }

    /// The controller binary for a node.
    ///
    /// A test node's configured controller wins. Otherwise, among the
    /// builds for the node's OS, the first one tagged with the node's arch
    /// (or `box` on a box) beats the first untagged one.
    pub fn select_controller(&self, query: &ControllerQuery) -> Option<&FileConfig> {
        let test_name = self
            .catalog
            .test_node(&query.uuid)
            .map(|t| t.controller.as_str())
            .unwrap_or_default();

        let mut generic = None;
        for file in &self.catalog.controller_files {
            if !test_name.is_empty() && file.name == test_name {
                return Some(file);
            }
            if file.os != query.os {
                continue;
            }
            if file.tag.is_empty() {
                generic = generic.or(Some(file));
            } else if !query.arch.is_empty() && file.tag.contains(query.arch.as_str()) {
                return Some(file);
            } else if query.is_box && file.tag == "box" {
                return Some(file);
            }
        }
        generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::config::ResourceProfile;

    fn linux_node() -> ResourceQuery {
        ResourceQuery {
            os: "linux".into(),
            arch: "amd64".into(),
            cpu_cores: 4,
            memory_mb: 8192.0,
            disk_gb: 100.0,
        }
    }

    fn catalog() -> CatalogConfig {
        let mut catalog = CatalogConfig::default();
        catalog.resources.insert(
            "small".into(),
            ResourceProfile {
                os: "linux".into(),
                min_cpu: 2,
                min_memory_mb: 4096.0,
                min_disk_gb: 50.0,
                arch: String::new(),
            },
        );
        catalog.apps.push(AppConfig {
            app_name: "app-us".into(),
            auto_load: true,
            req_resources: vec!["small".into()],
            req_locations: vec!["US".into()],
            ..Default::default()
        });
        catalog.apps.push(AppConfig {
            app_name: "app-manual".into(),
            auto_load: false,
            req_resources: vec!["small".into()],
            ..Default::default()
        });
        catalog.apps.push(AppConfig {
            app_name: "app-edge".into(),
            req_locations_exclude: vec!["CN".into()],
            ..Default::default()
        });
        catalog
            .channel_apps
            .insert("edge".into(), vec!["app-edge".into()]);
        catalog
    }

    fn request<'a>(resources: &'a ResourceQuery, region: Option<&'a str>) -> SelectionRequest<'a> {
        SelectionRequest {
            node_id: "n1",
            uuid: "u1",
            channel: "",
            resources,
            region,
        }
    }

    #[test]
    fn test_default_mode_served_region() {
        let engine = DistributionEngine::new(Arc::new(catalog()));
        let node = linux_node();
        let selection = engine.select(&request(&node, Some("US")));
        assert_eq!(selection.app_names(), vec!["app-us".to_string()]);
        assert_eq!(selection.state, BizStatus::Initing);
    }

    #[test]
    fn test_default_mode_unserved_region() {
        let engine = DistributionEngine::new(Arc::new(catalog()));
        let node = linux_node();
        let selection = engine.select(&request(&node, Some("KP")));
        assert!(selection.apps.is_empty());
        assert_eq!(selection.state, BizStatus::AreaUnsupported);

        let selection = engine.select(&request(&node, None));
        assert_eq!(selection.state, BizStatus::AreaUnsupported);
    }

    #[test]
    fn test_default_mode_no_resource_fit() {
        let engine = DistributionEngine::new(Arc::new(catalog()));
        let mut node = linux_node();
        node.cpu_cores = 1;
        let selection = engine.select(&request(&node, Some("US")));
        assert!(selection.apps.is_empty());
        assert_eq!(selection.state, BizStatus::NoTask);
    }

    #[test]
    fn test_channel_mode_skips_resources() {
        let engine = DistributionEngine::new(Arc::new(catalog()));
        let tiny = ResourceQuery::default();
        let mut req = request(&tiny, Some("US"));
        req.channel = "edge";
        let selection = engine.select(&req);
        assert_eq!(selection.app_names(), vec!["app-edge".to_string()]);
        assert_eq!(selection.state, BizStatus::Initing);

        req.region = Some("CN");
        assert_eq!(engine.select(&req).state, BizStatus::AreaUnsupported);
    }

    #[test]
    fn test_served_region_without_candidates_is_no_task() {
        let mut catalog = catalog();
        catalog.apps.push(AppConfig {
            app_name: "manual-de".into(),
            auto_load: false,
            req_locations: vec!["DE".into()],
            ..Default::default()
        });
        let engine = DistributionEngine::new(Arc::new(catalog));
        let node = linux_node();

        // Only a manual app lists DE
        let selection = engine.select(&request(&node, Some("DE")));
        assert!(selection.apps.is_empty());
        assert_eq!(selection.state, BizStatus::NoTask);

        // A channel nobody configured, in a listed region
        let mut req = request(&node, Some("US"));
        req.channel = "nochan";
        let selection = engine.select(&req);
        assert!(selection.apps.is_empty());
        assert_eq!(selection.state, BizStatus::NoTask);

        req.region = Some("KP");
        assert_eq!(engine.select(&req).state, BizStatus::AreaUnsupported);
    }

    #[test]
    fn test_test_node_bypass() {
        let mut catalog = catalog();
        catalog.test_nodes.insert(
            "u1".into(),
            TestNode {
                apps: vec!["app-manual".into()],
                ..Default::default()
            },
        );
        let engine = DistributionEngine::new(Arc::new(catalog));
        let node = ResourceQuery::default();
        let selection = engine.select(&request(&node, Some("KP")));
        assert_eq!(selection.app_names(), vec!["app-manual".to_string()]);
        assert_eq!(selection.state, BizStatus::Initing);
    }

    fn file(name: &str, os: &str, tag: &str) -> FileConfig {
        FileConfig {
            name: name.into(),
            os: os.into(),
            tag: tag.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_lua_script() {
        let mut catalog = catalog();
        catalog.lua_files = vec![
            file("win.lua", "windows", ""),
            file("linux.lua", "linux", ""),
            file("debug.lua", "linux", ""),
        ];
        catalog.test_nodes.insert(
            "u-test".into(),
            TestNode {
                lua_script: "debug.lua".into(),
                ..Default::default()
            },
        );
        let engine = DistributionEngine::new(Arc::new(catalog));

        assert_eq!(engine.select_lua_script("linux", "u1").unwrap().name, "linux.lua");
        assert_eq!(
            engine.select_lua_script("windows", "u-test").unwrap().name,
            "debug.lua"
        );
        assert!(engine.select_lua_script("darwin", "u1").is_none());
    }

    #[test]
    fn test_select_controller_prefers_tagged_build() {
        let mut catalog = catalog();
        catalog.controller_files = vec![
            file("generic", "linux", ""),
            file("arm", "linux", "arm64,aarch64"),
            file("box", "linux", "box"),
        ];
        let engine = DistributionEngine::new(Arc::new(catalog));

        let mut query = ControllerQuery {
            uuid: "u1".into(),
            os: "linux".into(),
            arch: "amd64".into(),
            is_box: false,
        };
        assert_eq!(engine.select_controller(&query).unwrap().name, "generic");

        query.arch = "aarch64".into();
        assert_eq!(engine.select_controller(&query).unwrap().name, "arm");

        query.arch = String::new();
        query.is_box = true;
        assert_eq!(engine.select_controller(&query).unwrap().name, "box");

        query.os = "windows".into();
        assert!(engine.select_controller(&query).is_none());
    }
}
