//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to an active user
//! through `user_sessions`, and injects `AuthContext` into request
//! extensions for downstream handlers.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Principal;
use crate::credentials::hash_token;
use crate::db::repository;

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `AuthContext` and adds `Cache-Control: no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    // 1. Extract bearer token
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    let token_hash = hash_token(token);

    // 2. Resolve session → user. Connection dropped before any .await
    let user = {
        let conn = ctx.core.open_db()?;
        repository::find_session_user(&conn, &token_hash)?
    }
    .ok_or(ApiError::Unauthorized)?;

    // 3. Inject auth context for downstream handlers
    req.extensions_mut().insert(AuthContext {
        principal: Principal::from(user),
        token_hash,
    });

    // 4. Process request
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
