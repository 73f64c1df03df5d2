use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::ValidationError;

/// Route paths: leading slash, no whitespace, query or fragment.
pub static RULE_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[^\s?#]*$").unwrap());

/// Maximum length for a rule path
const MAX_PATH_LENGTH: usize = 512;

/// Maximum length for a single role name
const MAX_ROLE_LENGTH: usize = 64;

/// Maximum number of roles per rule
const MAX_ROLES_COUNT: usize = 100;

/// Validate a rule path.
///
/// Wildcard segments must be exactly `*`; partial wildcards such as
/// `/api/blog*` are rejected because they would only ever match literally.
pub fn validate_rule_path(path: &str) -> Result<(), ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        let mut err = ValidationError::new("path_too_long");
        err.message = Some(Cow::Owned(format!(
            "Paths cannot exceed {} characters",
            MAX_PATH_LENGTH
        )));
        return Err(err);
    }
    if !RULE_PATH_REGEX.is_match(path) {
        let mut err = ValidationError::new("invalid_path");
        err.message = Some(Cow::Borrowed(
            "Paths must start with '/' and contain no whitespace, query or fragment",
        ));
        return Err(err);
    }
    if path
        .split('/')
        .any(|segment| segment.contains('*') && segment != "*")
    {
        let mut err = ValidationError::new("partial_wildcard");
        err.message = Some(Cow::Borrowed(
            "A wildcard must occupy a whole path segment",
        ));
        return Err(err);
    }
    Ok(())
}

/// Validate role names attached to a rule.
///
/// Ensures that:
/// - No more than MAX_ROLES_COUNT roles are provided
/// - No role is empty or whitespace-only
/// - No role exceeds MAX_ROLE_LENGTH characters
pub fn validate_role_names(roles: &[String]) -> Result<(), ValidationError> {
    if roles.len() > MAX_ROLES_COUNT {
        let mut err = ValidationError::new("too_many_roles");
        err.message = Some(Cow::Owned(format!(
            "Maximum {} roles allowed",
            MAX_ROLES_COUNT
        )));
        return Err(err);
    }

    for role in roles {
        if role.trim().is_empty() {
            let mut err = ValidationError::new("empty_role");
            err.message = Some(Cow::Borrowed(
                "Role names cannot be empty or whitespace-only",
            ));
            return Err(err);
        }
        if role.len() > MAX_ROLE_LENGTH {
            let mut err = ValidationError::new("role_too_long");
            err.message = Some(Cow::Owned(format!(
                "Role names cannot exceed {} characters",
                MAX_ROLE_LENGTH
            )));
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rule_path() {
        assert!(validate_rule_path("/").is_ok());
        assert!(validate_rule_path("/api/blogs").is_ok());
        assert!(validate_rule_path("/api/blogs/*/comments").is_ok());

        assert!(validate_rule_path("api/blogs").is_err());
        assert!(validate_rule_path("/api/blogs?x=1").is_err());
        assert!(validate_rule_path("/api/ blogs").is_err());
        assert!(validate_rule_path("").is_err());
    }

    #[test]
    fn test_validate_rule_path_partial_wildcard() {
        let err = validate_rule_path("/api/blog*").unwrap_err();
        assert_eq!(err.code, "partial_wildcard");
    }

    #[test]
    fn test_validate_rule_path_too_long() {
        let path = format!("/{}", "a".repeat(MAX_PATH_LENGTH));
        let err = validate_rule_path(&path).unwrap_err();
        assert_eq!(err.code, "path_too_long");
    }

    #[test]
    fn test_validate_role_names() {
        assert!(validate_role_names(&[]).is_ok());
        assert!(validate_role_names(&["admin".into(), "editor".into()]).is_ok());

        let err = validate_role_names(&["  ".into()]).unwrap_err();
        assert_eq!(err.code, "empty_role");

        let err = validate_role_names(&["x".repeat(MAX_ROLE_LENGTH + 1)]).unwrap_err();
        assert_eq!(err.code, "role_too_long");

        let many: Vec<String> = (0..=MAX_ROLES_COUNT).map(|i| format!("r{i}")).collect();
        let err = validate_role_names(&many).unwrap_err();
        assert_eq!(err.code, "too_many_roles");
    }
}
