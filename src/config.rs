use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "KpiDashboard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "KPI_DASHBOARD_CONFIG";
/// Overrides the HTTP bind address.
pub const BIND_ADDR_ENV: &str = "KPI_DASHBOARD_ADDR";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_SESSION_TTL_HOURS: u32 = 12;

/// Tracing filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "kpi_dashboard=info,tower_http=info"
}

/// Get the application data directory
/// `<platform data dir>/KpiDashboard/`, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Config file location: `$KPI_DASHBOARD_CONFIG` or `<data dir>/config.json`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("config.json"))
}

pub fn bind_addr() -> Result<SocketAddr, ConfigError> {
    let raw = std::env::var(BIND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    raw.parse()
        .map_err(|_| ConfigError::InvalidBindAddr(raw.clone()))
}

// ═══════════════════════════════════════════════════════════
// Persisted configuration
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid bind address '{0}'")]
    InvalidBindAddr(String),

    #[error("Session lifetime must be at least one hour")]
    InvalidSessionTtl,
}

/// Written by the setup wizard, read at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub database_path: PathBuf,
    /// Directory with replacement aggregation SQL files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_dir: Option<PathBuf>,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
}

fn default_session_ttl_hours() -> u32 {
    DEFAULT_SESSION_TTL_HOURS
}

impl DashboardConfig {
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            database_path,
            sql_dir: None,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidSessionTtl);
        }
        Ok(())
    }

    /// Load from `path`. A missing file means "not configured yet".
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn missing_file_is_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = DashboardConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = DashboardConfig::new(dir.path().join("kpi.db"));
        config.sql_dir = Some(dir.path().join("sql"));
        config.save(&path).unwrap();

        let loaded = DashboardConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn ttl_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"database_path": "/srv/kpi.db"}"#).unwrap();
        let loaded = DashboardConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded.session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);
        assert_eq!(loaded.sql_dir, None);
    }

    #[test]
    fn zero_ttl_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"database_path": "x.db", "session_ttl_hours": 0}"#).unwrap();
        assert!(matches!(
            DashboardConfig::load(&path),
            Err(ConfigError::InvalidSessionTtl)
        ));
    }

    #[test]
    fn garbage_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DashboardConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().contains("kpi_dashboard=info"));
    }
}
