//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Configured gate: 503 until the setup wizard has run
//! 2. Auth validator: session token → principal
//! 3. Audit logger: logs after auth, has the login

pub mod audit;
pub mod auth;
pub mod configured;
