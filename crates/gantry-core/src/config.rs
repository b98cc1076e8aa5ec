//! Gantry configuration system.
//!
//! Loaded from `~/.gantry/config.toml` unless `GANTRY_CONFIG` or `--config`
//! points elsewhere. Every field has a default, so an empty (or missing) file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GantryError, Result};

/// Env var that overrides the config file location.
pub const CONFIG_ENV: &str = "GANTRY_CONFIG";
/// Env var that overrides `app.address`.
pub const ADDRESS_ENV: &str = "ADDRESS";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GantryConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl GantryConfig {
    /// Load config from `GANTRY_CONFIG` or the default path.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("📄 No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GantryError::config(format!("Failed to read config {}: {e}", path.display())))?;
        tracing::debug!("📄 Loaded config from {}", path.display());
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GantryError::config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.app.close_wait == 0 {
            return Err(GantryError::config("app.close_wait must be >= 1"));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Gantry home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gantry")
    }

    /// Resolve the HTTP listen address.
    ///
    /// Order: explicit flag, `ADDRESS` env var, `app.address`. A bare
    /// `:PORT` binds every interface.
    pub fn resolve_address(&self, flag: Option<&str>) -> String {
        let raw = flag
            .map(str::to_string)
            .filter(|a| !a.is_empty())
            .or_else(|| std::env::var(ADDRESS_ENV).ok().filter(|a| !a.is_empty()))
            .unwrap_or_else(|| self.app.address.clone());
        normalize_address(&raw)
    }
}

/// Turn `:8888` into `0.0.0.0:8888`; leave full addresses alone.
pub fn normalize_address(raw: &str) -> String {
    match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Node identity used as lease holder. Empty means generated per process.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_address")]
    pub address: String,
    /// Graceful shutdown budget in seconds.
    #[serde(default = "default_close_wait")]
    pub close_wait: u64,
}

fn default_app_name() -> String { "gantry".into() }
fn default_address() -> String { ":8888".into() }
fn default_close_wait() -> u64 { 5 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            id: String::new(),
            address: default_address(),
            close_wait: default_close_wait(),
        }
    }
}

/// `[paths]` section. Empty strings fall back to folders under `base`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub log: String,
}

fn default_base() -> String { "~/.gantry".into() }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            runtime: String::new(),
            log: String::new(),
        }
    }
}

/// How a job behaves when its previous invocation is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlap {
    /// Start another invocation regardless.
    #[default]
    Allow,
    /// Skip the tick while the previous invocation runs.
    Skip,
}

impl std::fmt::Display for Overlap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// `[cron]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    /// Default overlap policy for entries that don't set one.
    #[serde(default)]
    pub overlap: Overlap,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GantryConfig::parse("").unwrap();
        assert_eq!(config.app.close_wait, 5);
        assert_eq!(config.app.address, ":8888");
        assert_eq!(config.cron.overlap, Overlap::Allow);
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(config.app.id.is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let config = GantryConfig::parse(
            r#"
[app]
id = "node-a"
close_wait = 2

[paths]
runtime = "/var/run/gantry"

[cron]
overlap = "skip"

[log]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.app.id, "node-a");
        assert_eq!(config.app.close_wait, 2);
        assert_eq!(config.paths.runtime, "/var/run/gantry");
        assert_eq!(config.cron.overlap, Overlap::Skip);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_zero_close_wait_rejected() {
        let err = GantryConfig::parse("[app]\nclose_wait = 0\n").unwrap_err();
        assert!(matches!(err, GantryError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[app]\naddress = \"127.0.0.1:9000\"\n").unwrap();
        let config = GantryConfig::load_from(&path).unwrap();
        assert_eq!(config.app.address, "127.0.0.1:9000");
    }

    #[test]
    fn test_flag_wins_address_resolution() {
        let config = GantryConfig::default();
        assert_eq!(config.resolve_address(Some(":7000")), "0.0.0.0:7000");
        assert_eq!(
            config.resolve_address(Some("127.0.0.1:7001")),
            "127.0.0.1:7001"
        );
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(":8888"), "0.0.0.0:8888");
        assert_eq!(normalize_address("localhost:1"), "localhost:1");
    }
}
