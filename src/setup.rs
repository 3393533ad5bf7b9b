//! First-run setup wizard.
//!
//! Until a config file exists the server runs in setup mode. The wizard
//! can probe a database path, then write the config, optionally create the
//! first superuser, and activate the configuration without a restart.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DashboardConfig, DEFAULT_SESSION_TTL_HOURS};
use crate::core_state::{CoreError, CoreState};
use crate::credentials::hash_password;
use crate::db::repository::{self, NewUser};
use crate::db::{self, DatabaseError};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Already configured")]
    AlreadyConfigured,
    #[error("{0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Core(#[from] CoreError),
}

// ═══════════════════════════════════════════════════════════
// Connection probe
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Open (creating and migrating if needed) the database at `path`.
/// Nothing is saved.
pub fn test_connection(path: &std::path::Path) -> ConnectionReport {
    match db::open_database(path).and_then(|conn| db::count_tables(&conn)) {
        Ok(tables) => ConnectionReport {
            ok: true,
            tables: Some(tables),
            error: None,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Setup connection test failed");
            ConnectionReport {
                ok: false,
                tables: None,
                error: Some(e.to_string()),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Configure
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct SetupRequest {
    pub database_path: PathBuf,
    #[serde(default)]
    pub sql_dir: Option<PathBuf>,
    #[serde(default)]
    pub session_ttl_hours: Option<u32>,
    #[serde(default)]
    pub admin_login: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupOutcome {
    pub configured: bool,
    pub admin_created: bool,
}

fn admin_credentials(request: &SetupRequest) -> Result<Option<(&str, &str)>, SetupError> {
    let login = request
        .admin_login
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let password = request.admin_password.as_deref().filter(|p| !p.is_empty());

    match (login, password) {
        (None, None) => Ok(None),
        (Some(login), Some(password)) => {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                return Err(SetupError::Invalid(format!(
                    "Administrator password must be at least {MIN_PASSWORD_LENGTH} characters"
                )));
            }
            Ok(Some((login, password)))
        }
        _ => Err(SetupError::Invalid(
            "Administrator login and password must be given together".into(),
        )),
    }
}

/// Validate, persist and activate a configuration.
pub fn configure(core: &CoreState, request: SetupRequest) -> Result<SetupOutcome, SetupError> {
    if core.is_configured() {
        return Err(SetupError::AlreadyConfigured);
    }
    if request.database_path.as_os_str().is_empty() {
        return Err(SetupError::Invalid("Database path is required".into()));
    }
    let admin = admin_credentials(&request)?;

    let config = DashboardConfig {
        database_path: request.database_path.clone(),
        sql_dir: request.sql_dir.clone(),
        session_ttl_hours: request
            .session_ttl_hours
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS),
    };
    config.validate()?;

    let conn = db::open_database(&config.database_path)?;

    let admin_created = match admin {
        Some((login, password)) => {
            let hash = hash_password(password);
            repository::insert_user(
                &conn,
                &NewUser {
                    login,
                    password_hash: &hash,
                    role_code: Some("administrator"),
                    manid: None,
                    is_superuser: true,
                },
            )
            .map_err(|e| match e {
                DatabaseError::ConstraintViolation(_) => {
                    SetupError::Invalid(format!("User '{login}' already exists"))
                }
                other => SetupError::Database(other),
            })?;
            tracing::info!(login, "Superuser created");
            true
        }
        None => false,
    };

    core.activate_once(config, |config| config.save(core.config_path()))
        .map_err(|e| match e {
            CoreError::AlreadyConfigured => SetupError::AlreadyConfigured,
            other => SetupError::Core(other),
        })?;
    tracing::info!(path = %core.config_path().display(), "Setup complete");

    Ok(SetupOutcome {
        configured: true,
        admin_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> SetupRequest {
        SetupRequest {
            database_path: dir.join("kpi.db"),
            sql_dir: None,
            session_ttl_hours: None,
            admin_login: None,
            admin_password: None,
        }
    }

    #[test]
    fn probe_reports_tables() {
        let dir = tempfile::tempdir().unwrap();
        let report = test_connection(&dir.path().join("probe.db"));
        assert!(report.ok);
        assert_eq!(report.tables, Some(10));
    }

    #[test]
    fn probe_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let report = test_connection(&dir.path().join("missing").join("x.db"));
        assert!(!report.ok);
        assert!(report.error.is_some());
    }

    #[test]
    fn configure_writes_config_and_activates() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));
        let outcome = configure(&core, request(dir.path())).unwrap();

        assert!(outcome.configured);
        assert!(!outcome.admin_created);
        assert!(core.is_configured());
        assert!(DashboardConfig::load(core.config_path()).unwrap().is_some());
    }

    #[test]
    fn configure_creates_superuser() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));
        let mut req = request(dir.path());
        req.admin_login = Some("admin".into());
        req.admin_password = Some("long-enough-pw".into());
        assert!(configure(&core, req).unwrap().admin_created);

        let conn = core.open_db().unwrap();
        let user = repository::find_user_by_login(&conn, "admin").unwrap().unwrap();
        assert!(user.is_superuser);
        assert_eq!(user.role_code.as_deref(), Some("administrator"));
    }

    #[test]
    fn second_configure_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));
        configure(&core, request(dir.path())).unwrap();
        assert!(matches!(
            configure(&core, request(dir.path())),
            Err(SetupError::AlreadyConfigured)
        ));
    }

    #[test]
    fn concurrent_configure_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = ["a", "b", "c"]
                .iter()
                .map(|name| {
                    let core = &core;
                    let mut req = request(dir.path());
                    req.database_path = dir.path().join(format!("{name}.db"));
                    s.spawn(move || configure(core, req))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SetupError::AlreadyConfigured)));
        let saved = DashboardConfig::load(core.config_path()).unwrap().unwrap();
        assert_eq!(saved.database_path, core.config().unwrap().database_path);
    }

    #[test]
    fn half_admin_credentials_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));
        let mut req = request(dir.path());
        req.admin_login = Some("admin".into());
        assert!(matches!(configure(&core, req), Err(SetupError::Invalid(_))));
        assert!(!core.is_configured());
    }

    #[test]
    fn short_password_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let core = CoreState::unconfigured(dir.path().join("config.json"));
        let mut req = request(dir.path());
        req.admin_login = Some("admin".into());
        req.admin_password = Some("short".into());
        assert!(matches!(configure(&core, req), Err(SetupError::Invalid(_))));
    }
}
