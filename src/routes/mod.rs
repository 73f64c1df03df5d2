//! Routes declared in code and their synchronization into the rule store.
//!
//! Applications describe their endpoints with [`RouteSpec`], collect them in a
//! [`RouteRegistry`], and call [`sync_routes`] at startup so the stored rules
//! follow the code.

mod registry;
mod sync;

pub use registry::{RouteRegistry, RouteSpec};
pub use sync::{SyncError, SyncReport, sync_routes};
