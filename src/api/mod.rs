//! Dashboard HTTP API.
//!
//! JSON endpoints for the plan/fact dashboard, plan administration and the
//! first-run setup wizard. Dashboard routes are nested under `/api/` and
//! protected by a middleware stack: Setup gate → Auth → Audit → Handler.
//!
//! The router is composable: `dashboard_router()` returns a `Router`
//! that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::dashboard_router;
pub use server::{start_server, DashboardServer, ServerError};
pub use types::ApiContext;
