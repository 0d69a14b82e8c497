//! Operator override layers

use fleet_core::config::{AppConfig, CatalogConfig};
use fleet_core::OverrideLayers;

/// Apply the override layers to a computed app set.
///
/// A non-empty specified list replaces the base set, extra apps are
/// appended, and removed apps are filtered out of whatever is left. Names
/// are resolved against the catalog; unknown names are ignored.
pub fn apply_overrides(
    catalog: &CatalogConfig,
    base: Vec<AppConfig>,
    layers: &OverrideLayers,
) -> Vec<AppConfig> {
    let resolve = |names: &[String]| -> Vec<AppConfig> {
        names
            .iter()
            .filter_map(|name| catalog.app(name))
            .cloned()
            .collect()
    };

    let mut apps = if layers.specified.is_empty() {
        base
    } else {
        resolve(&layers.specified)
    };

    for extra in resolve(&layers.extra) {
        if !apps.iter().any(|a| a.app_name == extra.app_name) {
            apps.push(extra);
        }
    }

    apps.retain(|a| !layers.removed.contains(&a.app_name));
    apps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogConfig {
        let mut catalog = CatalogConfig::default();
        for name in ["a", "b", "x", "y"] {
            catalog.apps.push(AppConfig {
                app_name: name.into(),
                ..Default::default()
            });
        }
        catalog
    }

    fn names(apps: &[AppConfig]) -> Vec<&str> {
        apps.iter().map(|a| a.app_name.as_str()).collect()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_layers_keeps_base() {
        let catalog = catalog();
        let base = vec![catalog.apps[0].clone()];
        let apps = apply_overrides(&catalog, base, &OverrideLayers::default());
        assert_eq!(names(&apps), vec!["a"]);
    }

    #[test]
    fn test_specified_replaces_base() {
        let catalog = catalog();
        let base = vec![catalog.apps[0].clone(), catalog.apps[1].clone()];
        let layers = OverrideLayers {
            specified: list(&["x", "unknown"]),
            ..Default::default()
        };
        let apps = apply_overrides(&catalog, base, &layers);
        assert_eq!(names(&apps), vec!["x"]);
    }

    #[test]
    fn test_extra_then_removed() {
        let catalog = catalog();
        let base = vec![catalog.apps[0].clone(), catalog.apps[1].clone()];
        let layers = OverrideLayers {
            specified: Vec::new(),
            extra: list(&["y", "a"]),
            removed: list(&["b"]),
        };
        let apps = apply_overrides(&catalog, base, &layers);
        assert_eq!(names(&apps), vec!["a", "y"]);
    }

    #[test]
    fn test_removed_beats_specified_and_extra() {
        let catalog = catalog();
        let layers = OverrideLayers {
            specified: list(&["x"]),
            extra: list(&["y"]),
            removed: list(&["x", "y"]),
        };
        assert!(apply_overrides(&catalog, Vec::new(), &layers).is_empty());
    }
}
