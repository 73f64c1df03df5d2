mod rules;

pub use rules::{CreateRule, RuleService, RuleServiceError, UpdateRule};
