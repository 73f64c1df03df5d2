mod refresh_token_cleanup;
mod rule_cache_refresh;

pub use refresh_token_cleanup::start_refresh_token_cleanup_worker;
pub use rule_cache_refresh::start_rule_cache_refresh_worker;
