//! Per-app location and resource checks

use fleet_core::config::{AppConfig, CatalogConfig, ResourceProfile};
use fleet_protocol::ResourceQuery;

/// Whether the app is served in `region`.
///
/// An app without location constraints is served everywhere; an unknown
/// region never satisfies a constraint.
pub fn location_match(app: &AppConfig, region: Option<&str>) -> bool {
    if app.req_locations.is_empty() {
        return true;
    }
    region.is_some_and(|r| app.req_locations.iter().any(|loc| loc == r))
}

/// Whether `region` is on the app's exclusion list.
///
/// An unknown region counts as excluded whenever the list is non-empty.
pub fn location_excluded(app: &AppConfig, region: Option<&str>) -> bool {
    if app.req_locations_exclude.is_empty() {
        return false;
    }
    match region {
        Some(r) => app.req_locations_exclude.iter().any(|loc| loc == r),
        None => true,
    }
}

/// Whether any catalog app names `region` in its location list.
///
/// This is the fleet-wide coverage gate: a region nobody lists is
/// unsupported no matter which apps the node would otherwise be offered.
pub fn region_served(catalog: &CatalogConfig, region: Option<&str>) -> bool {
    region.is_some_and(|r| {
        catalog
            .apps
            .iter()
            .any(|app| app.req_locations.iter().any(|loc| loc == r))
    })
}

/// Whether the app may run in `region`
pub fn region_supported(app: &AppConfig, region: Option<&str>) -> bool {
    location_match(app, region) && !location_excluded(app, region)
}

/// Whether one profile fits the node.
///
/// The arch constraint is a substring test: a profile arch of
/// `"x86_64,amd64"` accepts a node reporting `"amd64"`.
pub fn profile_fits(profile: &ResourceProfile, node: &ResourceQuery) -> bool {
    if !profile.arch.is_empty() && !profile.arch.contains(node.arch.as_str()) {
        return false;
    }
    profile.os == node.os
        && node.cpu_cores >= profile.min_cpu
        && node.memory_mb >= profile.min_memory_mb
        && node.disk_gb >= profile.min_disk_gb
}

/// Whether any of the app's named profiles fits the node; unknown names are skipped
pub fn resource_match(catalog: &CatalogConfig, app: &AppConfig, node: &ResourceQuery) -> bool {
    app.req_resources
        .iter()
        .filter_map(|name| catalog.resource(name))
        .any(|profile| profile_fits(profile, node))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(locations: &[&str], exclude: &[&str]) -> AppConfig {
        AppConfig {
            app_name: "a".into(),
            req_locations: locations.iter().map(|s| s.to_string()).collect(),
            req_locations_exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn node() -> ResourceQuery {
        ResourceQuery {
            os: "linux".into(),
            arch: "amd64".into(),
            cpu_cores: 4,
            memory_mb: 8192.0,
            disk_gb: 100.0,
        }
    }

    fn profile() -> ResourceProfile {
        ResourceProfile {
            os: "linux".into(),
            min_cpu: 2,
            min_memory_mb: 4096.0,
            min_disk_gb: 50.0,
            arch: String::new(),
        }
    }

    #[test]
    fn test_location_include() {
        assert!(location_match(&app(&[], &[]), None));
        assert!(location_match(&app(&["US"], &[]), Some("US")));
        assert!(!location_match(&app(&["US"], &[]), Some("KP")));
        assert!(!location_match(&app(&["US"], &[]), None));
    }

    #[test]
    fn test_location_exclude() {
        assert!(!location_excluded(&app(&[], &[]), None));
        assert!(location_excluded(&app(&[], &["CN"]), Some("CN")));
        assert!(!location_excluded(&app(&[], &["CN"]), Some("US")));
        assert!(location_excluded(&app(&[], &["CN"]), None));
        assert!(!region_supported(&app(&["US"], &["US"]), Some("US")));
    }

    #[test]
    fn test_region_served_by_whole_catalog() {
        let mut catalog = CatalogConfig::default();
        catalog.apps.push(app(&[], &["CN"]));
        assert!(!region_served(&catalog, Some("US")));

        let mut manual = app(&["US", "DE"], &[]);
        manual.auto_load = false;
        catalog.apps.push(manual);
        assert!(region_served(&catalog, Some("DE")));
        assert!(!region_served(&catalog, Some("KP")));
        assert!(!region_served(&catalog, None));
    }

    #[test]
    fn test_profile_minimums() {
        assert!(profile_fits(&profile(), &node()));

        let mut small = node();
        small.cpu_cores = 1;
        assert!(!profile_fits(&profile(), &small));

        let mut windows = node();
        windows.os = "windows".into();
        assert!(!profile_fits(&profile(), &windows));
    }

    #[test]
    fn test_profile_arch_is_substring() {
        let mut p = profile();
        p.arch = "x86_64,amd64".into();
        assert!(profile_fits(&p, &node()));

        let mut arm = node();
        arm.arch = "arm".into();
        p.arch = "arm64".into();
        assert!(profile_fits(&p, &arm));

        arm.arch = "riscv".into();
        assert!(!profile_fits(&p, &arm));
    }

    #[test]
    fn test_resource_match_skips_unknown_profiles() {
        let mut catalog = CatalogConfig::default();
        catalog.resources.insert("small".into(), profile());
        let mut a = app(&[], &[]);
        a.req_resources = vec!["missing".into(), "small".into()];
        assert!(resource_match(&catalog, &a, &node()));

        a.req_resources = vec!["missing".into()];
        assert!(!resource_match(&catalog, &a, &node()));
    }
}
