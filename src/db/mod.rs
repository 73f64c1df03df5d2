//! Storage contracts consumed by the engine, plus in-memory implementations.
//!
//! Persistent backends live outside this crate; they only need to implement
//! the traits in [`repos`].

mod error;
pub mod memory;
pub mod repos;

pub use error::{DbError, DbResult};
pub use repos::*;
