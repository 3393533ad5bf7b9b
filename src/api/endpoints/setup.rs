//! Setup wizard endpoints. Unauthenticated; closed once configured.
//!
//! `GET  /setup/status`
//! `POST /setup/test`: probe a database path
//! `POST /setup/configure`: persist + activate

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::setup::{self, ConnectionReport, SetupError, SetupOutcome, SetupRequest};

impl From<SetupError> for ApiError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::AlreadyConfigured => ApiError::AlreadyConfigured,
            e @ (SetupError::Invalid(_) | SetupError::Config(_) | SetupError::Database(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            SetupError::Core(e) => ApiError::from(e),
        }
    }
}

fn ensure_unconfigured(ctx: &ApiContext) -> Result<(), ApiError> {
    if ctx.core.is_configured() {
        Err(ApiError::AlreadyConfigured)
    } else {
        Ok(())
    }
}

#[derive(Serialize)]
pub struct SetupStatus {
    pub configured: bool,
}

pub async fn status(State(ctx): State<ApiContext>) -> Json<SetupStatus> {
    Json(SetupStatus {
        configured: ctx.core.is_configured(),
    })
}

#[derive(Deserialize)]
pub struct TestRequest {
    pub database_path: PathBuf,
}

pub async fn test(
    State(ctx): State<ApiContext>,
    Json(request): Json<TestRequest>,
) -> Result<Json<ConnectionReport>, ApiError> {
    ensure_unconfigured(&ctx)?;
    Ok(Json(setup::test_connection(&request.database_path)))
}

pub async fn configure(
    State(ctx): State<ApiContext>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupOutcome>, ApiError> {
    ensure_unconfigured(&ctx)?;
    let core = ctx.core.clone();
    let outcome = tokio::task::spawn_blocking(move || setup::configure(&core, request))
        .await
        .map_err(|e| ApiError::Internal(format!("setup task: {e}")))??;
    Ok(Json(outcome))
}
