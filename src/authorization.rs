//! Report scope resolution.
//!
//! Decides how much of the organization a principal may see:
//! 1. Accountant/manager role → MANAGER (org-wide)
//! 2. Superuser → MANAGER
//! 3. Anyone else with a bound MIS doctor id → RESTRICTED to that id
//! 4. Anyone else without a binding → `MissingExternalBinding`
//!
//! Checked in order. No side effects.

use serde::Serialize;

use crate::db::repository::UserRecord;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Account role as stored in `roles.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Head of department; sees every doctor's numbers.
    Accountant,
    Doctor,
    /// Maintains plans and reference data.
    Administrator,
}

impl Role {
    /// Parse from database code. `manager` is accepted as an alias of `accountant`.
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accountant" | "manager" => Some(Self::Accountant),
            "doctor" => Some(Self::Doctor),
            "administrator" => Some(Self::Administrator),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accountant => "accountant",
            Self::Doctor => "doctor",
            Self::Administrator => "administrator",
        }
    }
}

/// An authenticated caller, as supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub login: String,
    pub role: Option<Role>,
    pub is_superuser: bool,
    /// Doctor id in the upstream MIS, if bound.
    pub external_id: Option<i64>,
}

impl Principal {
    /// Staff may use the plan administration surface.
    pub fn is_staff(&self) -> bool {
        self.is_superuser || self.role == Some(Role::Administrator)
    }
}

impl From<UserRecord> for Principal {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            login: user.login,
            role: user.role_code.as_deref().and_then(Role::from_code),
            is_superuser: user.is_superuser,
            external_id: user.manid,
        }
    }
}

/// Visibility scope for report queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    Manager,
    Restricted { external_id: i64 },
}

impl Scope {
    pub fn is_restricted(&self) -> bool {
        matches!(self, Scope::Restricted { .. })
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// Restricted principal without a bound MIS doctor id.
    #[error("Account '{login}' is not linked to a doctor ID from the MIS")]
    MissingExternalBinding { login: String },
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

/// True for principals with org-wide visibility.
pub fn is_manager(principal: &Principal) -> bool {
    principal.role == Some(Role::Accountant) || principal.is_superuser
}

/// Resolve the report scope of a principal.
pub fn resolve_scope(principal: &Principal) -> Result<Scope, ScopeError> {
    if is_manager(principal) {
        return Ok(Scope::Manager);
    }

    match principal.external_id {
        Some(external_id) => Ok(Scope::Restricted { external_id }),
        None => Err(ScopeError::MissingExternalBinding {
            login: principal.login.clone(),
        }),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
