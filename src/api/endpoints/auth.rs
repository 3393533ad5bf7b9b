//! Login and logout.
//!
//! `POST /api/auth/login`: Unprotected: exchanges credentials for a bearer token
//! `POST /api/auth/logout`: Protected: ends the current session
//! `GET /api/auth/me`: Protected: the caller's identity and access level

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::{is_manager, Principal};
use crate::credentials::{dummy_hash, generate_token, hash_token, verify_password};
use crate::db::repository::{self, UserRecord};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub login: String,
    pub display_name: String,
    pub role: Option<&'static str>,
    pub is_manager: bool,
    pub is_staff: bool,
    pub doctor_id: Option<i64>,
}

impl UserInfo {
    fn new(principal: &Principal, display_name: Option<String>) -> Self {
        Self {
            login: principal.login.clone(),
            display_name: display_name.unwrap_or_else(|| principal.login.clone()),
            role: principal.role.map(|r| r.as_str()),
            is_manager: is_manager(principal),
            is_staff: principal.is_staff(),
            doctor_id: principal.external_id,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Seconds until the session expires.
    pub expires_in: u64,
    pub user: UserInfo,
}

fn display_name(conn: &rusqlite::Connection, principal: &Principal) -> Option<String> {
    let manid = principal.external_id?;
    repository::doctor_name(conn, manid).unwrap_or_else(|e| {
        tracing::warn!(manid, error = %e, "Doctor name lookup failed");
        None
    })
}

/// Hash to verify against: the user's own, or a dummy for unknown and
/// inactive logins.
fn stored_hash(user: Option<&UserRecord>) -> String {
    user.map_or_else(dummy_hash, |u| u.password_hash.clone())
}

/// `POST /api/auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ttl_hours = ctx.core.session_ttl_hours()?;

    let user = {
        let conn = ctx.core.open_db()?;
        repository::find_user_by_login(&conn, request.login.trim())?
    }
    .filter(|u| u.is_active);

    // PBKDF2 runs on a blocking thread, also for unknown logins
    let password = request.password;
    let stored = stored_hash(user.as_ref());
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("password check task: {e}")))?;
    let valid = verified.unwrap_or_else(|e| {
        tracing::warn!(login = %request.login, error = %e, "Stored password hash unusable");
        false
    });
    let user = match user {
        Some(user) if valid => user,
        _ => {
            tracing::info!(login = %request.login, "Login rejected");
            return Err(ApiError::InvalidCredentials);
        }
    };

    let token = generate_token();
    let conn = ctx.core.open_db()?;
    repository::insert_session(&conn, &hash_token(&token), user.user_id, ttl_hours)?;
    repository::touch_last_login(&conn, user.user_id)?;
    if let Err(e) = repository::prune_expired_sessions(&conn) {
        tracing::warn!(error = %e, "Session pruning failed");
    }

    let principal = Principal::from(user);
    tracing::info!(login = %principal.login, "Login succeeded");

    Ok(Json(LoginResponse {
        token,
        expires_in: u64::from(ttl_hours) * 3600,
        user: UserInfo::new(&principal, display_name(&conn, &principal)),
    }))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    repository::delete_session(&conn, &auth.token_hash)?;
    tracing::info!(login = %auth.principal.login, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserInfo>, ApiError> {
    let conn = ctx.core.open_db()?;
    let name = display_name(&conn, &auth.principal);
    Ok(Json(UserInfo::new(&auth.principal, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PBKDF2_ITERATIONS;

    #[test]
    fn unknown_login_still_pays_for_pbkdf2() {
        let stored = stored_hash(None);
        assert!(stored.starts_with(&format!("pbkdf2_sha256${PBKDF2_ITERATIONS}$")));
    }

    #[test]
    fn known_login_uses_its_own_hash() {
        let user = UserRecord {
            user_id: 1,
            login: "ivanova".into(),
            password_hash: "pbkdf2_sha256$1000$AAAA$BBBB".into(),
            role_code: Some("doctor".into()),
            manid: Some(42),
            is_active: true,
            is_superuser: false,
        };
        assert_eq!(stored_hash(Some(&user)), user.password_hash);
    }
}
