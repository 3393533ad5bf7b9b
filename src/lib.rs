pub mod aggregation;
pub mod api;
pub mod authorization;
pub mod config;
pub mod core_state;
pub mod credentials;
pub mod db;
pub mod filters;
pub mod formatter;
pub mod plans;
pub mod presentation;
pub mod report;
pub mod setup;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
    #[error("Cannot listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Start the dashboard and serve until Ctrl-C.
pub async fn run() -> Result<(), RunError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("KPI dashboard starting v{}", config::APP_VERSION);

    let core = Arc::new(core_state::CoreState::load(config::config_path())?);
    let addr = config::bind_addr()?;
    let server = api::start_server(core, addr).await?;
    tracing::info!(addr = %server.local_addr(), "Listening");

    tokio::signal::ctrl_c().await.map_err(RunError::Signal)?;
    server.shutdown().await;
    Ok(())
}
