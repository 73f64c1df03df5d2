//! Route authorization: rule cache, role directory and decision engine.

mod engine;
mod error;
pub mod path;
mod role_directory;
mod rule_cache;

pub use engine::{Decision, DecisionEngine, DecisionState, Denial, Grant, evaluate_rules};
pub use error::AuthzError;
pub use role_directory::{DEFAULT_NEGATIVE_CACHE_TTL, DynRoleRepo, RoleDirectory};
pub use rule_cache::{CacheInvalidator, DEFAULT_STALE_AFTER, RuleCache, RuleIndex};
