//! Route authorization for axum services.
//!
//! Requests are decided against a cached set of `PUBLIC`/`ALLOW`/`FORBID`
//! rules keyed by method and path pattern. Principals come from signed
//! tokens that carry their role ids, so the hot path never touches storage.
//! Refresh tokens are opaque, stored hashed, and rotated on every use.

pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod jobs;
pub mod middleware;
pub mod models;
#[cfg(feature = "server")]
pub mod observability;
pub mod routes;
pub mod services;

#[cfg(test)]
mod tests;
