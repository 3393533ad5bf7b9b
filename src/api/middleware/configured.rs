//! Setup gate: every dashboard route answers 503 until configured.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

pub async fn require_configured(req: Request<axum::body::Body>, next: Next) -> Response {
    let configured = req
        .extensions()
        .get::<ApiContext>()
        .map(|ctx| ctx.core.is_configured());

    match configured {
        Some(true) => next.run(req).await,
        Some(false) => ApiError::SetupRequired.into_response(),
        None => ApiError::Internal("missing API context".into()).into_response(),
    }
}
