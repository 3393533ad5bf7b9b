//! Shared application state.
//!
//! `CoreState` holds the active configuration and the loaded aggregation
//! statements. It starts unconfigured when no config file exists; the setup
//! wizard fills it in at runtime. Uses `RwLock` since reads (every request)
//! vastly outnumber writes (setup, once).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::aggregation::AggregationQueries;
use crate::config::{ConfigError, DashboardConfig};
use crate::db;

struct Active {
    config: DashboardConfig,
    queries: Arc<AggregationQueries>,
}

impl Active {
    fn log_activation(&self) {
        tracing::info!(
            database = %self.config.database_path.display(),
            sql_dir = ?self.config.sql_dir,
            "Configuration active"
        );
    }
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    /// Where the setup wizard persists the config.
    config_path: PathBuf,
    active: RwLock<Option<Active>>,
}

impl CoreState {
    /// Unconfigured state. Only setup and health work until `apply_config`.
    pub fn unconfigured(config_path: PathBuf) -> Self {
        Self {
            config_path,
            active: RwLock::new(None),
        }
    }

    /// Load the config file at `config_path`, if there is one.
    pub fn load(config_path: PathBuf) -> Result<Self, CoreError> {
        let state = Self::unconfigured(config_path);
        match DashboardConfig::load(&state.config_path)? {
            Some(config) => state.apply_config(config)?,
            None => tracing::warn!(
                path = %state.config_path.display(),
                "No configuration found, starting in setup mode"
            ),
        }
        Ok(state)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn is_configured(&self) -> bool {
        self.active
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Activate `config`: load its aggregation statements and make it current.
    /// Does not write the config file.
    pub fn apply_config(&self, config: DashboardConfig) -> Result<(), CoreError> {
        let active = Self::prepare(config)?;
        let mut guard = self.active.write().map_err(|_| CoreError::LockPoisoned)?;
        active.log_activation();
        *guard = Some(active);
        Ok(())
    }

    /// Activate `config` only if nothing is active yet.
    ///
    /// The check, `persist` and the activation all run under one write lock,
    /// so concurrent callers see exactly one winner.
    pub fn activate_once<F>(&self, config: DashboardConfig, persist: F) -> Result<(), CoreError>
    where
        F: FnOnce(&DashboardConfig) -> Result<(), ConfigError>,
    {
        let active = Self::prepare(config)?;
        let mut guard = self.active.write().map_err(|_| CoreError::LockPoisoned)?;
        if guard.is_some() {
            return Err(CoreError::AlreadyConfigured);
        }
        persist(&active.config)?;
        active.log_activation();
        *guard = Some(active);
        Ok(())
    }

    fn prepare(config: DashboardConfig) -> Result<Active, CoreError> {
        config.validate()?;
        let queries = AggregationQueries::load(config.sql_dir.as_deref())
            .map_err(|e| CoreError::Queries(e.to_string()))?;
        Ok(Active {
            config,
            queries: Arc::new(queries),
        })
    }

    /// Owned copy of the active configuration.
    pub fn config(&self) -> Result<DashboardConfig, CoreError> {
        let guard = self.active.read().map_err(|_| CoreError::LockPoisoned)?;
        let active = guard.as_ref().ok_or(CoreError::NotConfigured)?;
        Ok(active.config.clone())
    }

    pub fn queries(&self) -> Result<Arc<AggregationQueries>, CoreError> {
        let guard = self.active.read().map_err(|_| CoreError::LockPoisoned)?;
        let active = guard.as_ref().ok_or(CoreError::NotConfigured)?;
        Ok(Arc::clone(&active.queries))
    }

    /// Open a database connection for the active configuration.
    ///
    /// Acquires a read lock, reads the path, releases the lock, then opens.
    /// Most common operation in handlers.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        let path = {
            let guard = self.active.read().map_err(|_| CoreError::LockPoisoned)?;
            let active = guard.as_ref().ok_or(CoreError::NotConfigured)?;
            active.config.database_path.clone()
        };
        db::open_database(&path).map_err(CoreError::Database)
    }

    pub fn session_ttl_hours(&self) -> Result<u32, CoreError> {
        Ok(self.config()?.session_ttl_hours)
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Dashboard is not configured")]
    NotConfigured,
    #[error("Dashboard is already configured")]
    AlreadyConfigured,
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Cannot load aggregation SQL: {0}")]
    Queries(String),
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_unconfigured() {
        let state = CoreState::unconfigured(PathBuf::from("/nonexistent/config.json"));
        assert!(!state.is_configured());
        assert!(matches!(state.open_db(), Err(CoreError::NotConfigured)));
        assert!(matches!(state.queries(), Err(CoreError::NotConfigured)));
    }

    #[test]
    fn load_without_file_stays_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::load(dir.path().join("config.json")).unwrap();
        assert!(!state.is_configured());
    }

    #[test]
    fn apply_config_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::unconfigured(dir.path().join("config.json"));
        state
            .apply_config(DashboardConfig::new(dir.path().join("kpi.db")))
            .unwrap();

        assert!(state.is_configured());
        let conn = state.open_db().unwrap();
        assert_eq!(db::count_tables(&conn).unwrap(), 10);
        assert_eq!(state.session_ttl_hours().unwrap(), 12);
    }

    #[test]
    fn load_reads_saved_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        DashboardConfig::new(dir.path().join("kpi.db"))
            .save(&path)
            .unwrap();

        let state = CoreState::load(path).unwrap();
        assert!(state.is_configured());
        assert_eq!(state.config().unwrap().database_path, dir.path().join("kpi.db"));
    }

    #[test]
    fn activate_once_refuses_second_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::unconfigured(dir.path().join("config.json"));
        let mut persisted = Vec::new();

        state
            .activate_once(DashboardConfig::new(dir.path().join("a.db")), |c| {
                persisted.push(c.database_path.clone());
                Ok(())
            })
            .unwrap();
        let second = state.activate_once(DashboardConfig::new(dir.path().join("b.db")), |c| {
            persisted.push(c.database_path.clone());
            Ok(())
        });

        assert!(matches!(second, Err(CoreError::AlreadyConfigured)));
        assert_eq!(persisted, vec![dir.path().join("a.db")]);
        assert_eq!(state.config().unwrap().database_path, dir.path().join("a.db"));
    }

    #[test]
    fn failed_persist_leaves_state_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::unconfigured(dir.path().join("config.json"));
        let result = state.activate_once(DashboardConfig::new(dir.path().join("a.db")), |_| {
            Err(ConfigError::InvalidSessionTtl)
        });
        assert!(matches!(result, Err(CoreError::Config(_))));
        assert!(!state.is_configured());
    }

    #[test]
    fn missing_sql_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::unconfigured(dir.path().join("config.json"));
        let mut config = DashboardConfig::new(dir.path().join("kpi.db"));
        config.sql_dir = Some(dir.path().join("no-such-dir"));
        state.apply_config(config).unwrap();
        assert!(state.queries().is_ok());
    }
}
