use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audit::AuditPolicy;

/// Name of the per-directory config file.
pub const PROJECT_CONFIG_FILE: &str = "fibertrack.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FibertrackConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    /// Preferred CLI output mode (`pretty`, `text`, `json`).
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// Fail the mutation when its audit entry cannot be written.
    #[serde(default)]
    pub strict: bool,
}

impl AuditConfig {
    #[must_use]
    pub const fn policy(&self) -> AuditPolicy {
        AuditPolicy::from_strict(self.strict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Upper bound on worker threads per fan-out stage.
    #[serde(default = "default_max_fan_out")]
    pub max_fan_out: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_fan_out: default_max_fan_out(),
        }
    }
}

/// Load `fibertrack.toml` from `dir`, falling back to the user config and
/// then to defaults. Environment overrides are applied last.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed,
/// or if an override variable holds an invalid value.
pub fn load_config(dir: &Path) -> Result<FibertrackConfig> {
    let config = match load_config_file(&dir.join(PROJECT_CONFIG_FILE))? {
        Some(config) => config,
        None => load_user_config()?,
    };
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Parse the config at `path`; `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<Option<FibertrackConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<FibertrackConfig>(&content)
        .map(Some)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_user_config() -> Result<FibertrackConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(FibertrackConfig::default());
    };

    Ok(load_config_file(&config_dir.join("fibertrack/config.toml"))?.unwrap_or_default())
}

/// Apply `FIBERTRACK_DB` and `FIBERTRACK_PORT` from `lookup`.
///
/// # Errors
///
/// Returns an error if `FIBERTRACK_PORT` is not a valid port number.
pub fn apply_env_overrides(
    mut config: FibertrackConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<FibertrackConfig> {
    if let Some(path) = lookup("FIBERTRACK_DB").filter(|p| !p.trim().is_empty()) {
        config.database.path = PathBuf::from(path);
    }
    if let Some(port) = lookup("FIBERTRACK_PORT") {
        config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("FIBERTRACK_PORT must be a port number, got '{port}'"))?;
    }
    Ok(config)
}

const fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("fibertrack.sqlite3")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_fan_out() -> usize {
    4
}
