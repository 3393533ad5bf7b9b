//! API endpoint handlers.
//!
//! Each module corresponds to a dashboard page or feature.
//! Handlers reuse the report, plan and setup logic from the core modules.

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod plan_fact;
pub mod plans;
pub mod setup;
