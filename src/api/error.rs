//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::authorization::ScopeError;
use crate::core_state::CoreError;
use crate::plans::PlanError;

/// Shown when a restricted account has no MIS doctor binding.
pub const UNBOUND_ACCOUNT_MESSAGE: &str = "Your account is not linked to a doctor ID from the MIS";

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid login or password")]
    InvalidCredentials,
    #[error("Forbidden")]
    Forbidden,
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Already configured")]
    AlreadyConfigured,
    #[error("Setup required")]
    SetupRequired,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid login or password".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this page".to_string(),
            ),
            ApiError::AccessDenied(detail) => {
                (StatusCode::FORBIDDEN, "ACCESS_DENIED", detail.clone())
            }
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::AlreadyConfigured => (
                StatusCode::CONFLICT,
                "ALREADY_CONFIGURED",
                "The dashboard is already configured".to_string(),
            ),
            ApiError::SetupRequired => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SETUP_REQUIRED",
                "The dashboard has not been configured yet".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConfigured => ApiError::SetupRequired,
            CoreError::AlreadyConfigured => ApiError::AlreadyConfigured,
            CoreError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::MissingExternalBinding { login } => {
                tracing::warn!(login, "Account has no MIS doctor binding");
                ApiError::AccessDenied(UNBOUND_ACCOUNT_MESSAGE.into())
            }
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::NotFound(id) => ApiError::NotFound(format!("Plan {id} not found")),
            e @ PlanError::Duplicate { .. } => ApiError::Conflict(e.to_string()),
            e @ (PlanError::NegativeValue(_) | PlanError::YearRequired | PlanError::InvalidCsv(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            e @ (PlanError::Export(_) | PlanError::Database(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn missing_binding_returns_access_denied() {
        let api_err: ApiError = ScopeError::MissingExternalBinding {
            login: "petrov".into(),
        }
        .into();
        let response = api_err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ACCESS_DENIED");
        assert_eq!(json["error"]["message"], UNBOUND_ACCOUNT_MESSAGE);
    }

    #[tokio::test]
    async fn not_configured_returns_503() {
        let api_err: ApiError = CoreError::NotConfigured.into();
        let response = api_err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "SETUP_REQUIRED");
    }

    #[tokio::test]
    async fn duplicate_plan_returns_409() {
        let api_err: ApiError = PlanError::Duplicate {
            year: 2025,
            specid: 1,
            plan_vistype: 10,
        }
        .into();
        assert_eq!(api_err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn plan_validation_returns_400() {
        let api_err: ApiError = PlanError::YearRequired.into();
        assert_eq!(api_err.into_response().status(), StatusCode::BAD_REQUEST);
        let api_err: ApiError = PlanError::NotFound(3).into();
        assert_eq!(api_err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_returns_500_without_details() {
        let response = ApiError::Internal("something broke".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn already_configured_returns_409() {
        let response = ApiError::AlreadyConfigured.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ALREADY_CONFIGURED");
    }
}
