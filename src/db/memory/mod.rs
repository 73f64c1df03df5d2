//! In-memory repositories (single-node only).
//!
//! Used by the demo binary and as fakes in tests.

mod accounts;
mod refresh_tokens;
mod roles;
mod rules;

pub use accounts::MemoryAccountRepo;
pub use refresh_tokens::MemoryRefreshTokenRepo;
pub use roles::MemoryRoleRepo;
#[cfg(test)]
pub use rules::{FailingRuleRepo, StaticRuleRepo};
pub use rules::MemoryRuleRepo;
