//! Dashboard server lifecycle: binds the listener, mounts
//! `dashboard_router()` and serves it in a background task.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::router::dashboard_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Handle to a running dashboard server.
pub struct DashboardServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl DashboardServer {
    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Dashboard server shutdown signal sent");
        }
        if let Err(e) = self.task.await {
            tracing::error!("Dashboard server task failed: {e}");
        }
    }
}

/// Start serving the dashboard API on `addr`.
pub async fn start_server(core: Arc<CoreState>, addr: SocketAddr) -> Result<DashboardServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = dashboard_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Dashboard server received shutdown signal");
        };

        tracing::info!(%addr, "Dashboard server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Dashboard server error: {e}");
        }

        tracing::info!("Dashboard server stopped");
    });

    Ok(DashboardServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
