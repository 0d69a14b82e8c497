//! Configuration management for the fleet control plane

mod catalog;
mod controlplane;
pub mod serde_utils;

pub use catalog::{AppConfig, CatalogConfig, FileConfig, ResourceProfile, TestNode};
pub use controlplane::{
    AuthConfig, ControlPlaneConfig, GeoConfig, KeepaliveConfig, RegistryConfig, StoreBackendKind,
    StoreConfig,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable overriding [`default_config_dir`]
pub const CONFIG_DIR_ENV: &str = "FLEET_CONFIG_DIR";

/// Directory holding `config.toml`: `$FLEET_CONFIG_DIR`, else the platform
/// config directory.
pub fn default_config_dir() -> PathBuf {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => {
            tracing::debug!("Config dir from {}: {:?}", CONFIG_DIR_ENV, dir);
            PathBuf::from(dir)
        }
        _ => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleet-controlplane"),
    }
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load a TOML configuration file.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)),
    })?;
    let config = toml::from_str(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a TOML configuration file, replacing any previous one whole.
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let io_err = |what: &str, e: std::io::Error| ConfigError::Invalid(format!("{}: {}", what, e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err("Failed to create config dir", e))?;
    }

    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, content).map_err(|e| io_err("Failed to write config", e))?;
    std::fs::rename(&staging, path).map_err(|e| io_err("Failed to replace config", e))?;
    tracing::info!("Saved config to {}", path.display());
    Ok(())
}
