//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub configured: bool,
    pub version: &'static str,
}

/// `GET /api/health`: liveness plus setup state. Unauthenticated.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        configured: ctx.core.is_configured(),
        version: crate::config::APP_VERSION,
    })
}
