//! Audit logging middleware.
//!
//! Logs every API request with login, method, path, and
//! response status. Runs innermost (after auth has injected AuthContext).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let login = req
        .extensions()
        .get::<AuthContext>()
        .map(|a| a.principal.login.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    tracing::info!(target: "kpi_dashboard::audit", %login, %method, %path, status, "API access");

    response
}
