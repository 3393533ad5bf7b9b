//! Shared types for the dashboard API layer.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::authorization::Principal;
use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    /// Reporting "today". Fixed in tests, local date otherwise.
    today: Option<NaiveDate>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core, today: None }
    }

    #[cfg(test)]
    pub(crate) fn with_today(core: Arc<CoreState>, today: NaiveDate) -> Self {
        Self {
            core,
            today: Some(today),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

// ═══════════════════════════════════════════════════════════
// Auth context: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions
/// by the auth middleware after successful token validation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
    /// SHA-256 of the presented bearer token (for logout).
    pub token_hash: [u8; 32],
}
