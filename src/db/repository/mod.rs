//! Repository layer: table-scoped database operations.
//!
//! One sub-module per table group. All public functions are re-exported here.

mod plan;
mod reference;
mod session;
mod user;

pub use plan::*;
pub use reference::*;
pub use session::*;
pub use user::*;
