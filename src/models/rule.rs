use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::RoleId;

/// Service names longer than this are truncated before being stamped on rules.
pub const MAX_SERVICE_NAME_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

impl TryFrom<&http::Method> for HttpMethod {
    type Error = UnknownMethod;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// What a matching rule does to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    /// No authentication required.
    Public,
    /// Grants the listed roles, or any authenticated principal when empty.
    Allow,
    /// Denies the listed roles, or every principal when empty. Wins over `Allow`.
    #[serde(alias = "FORBIDE")]
    Forbid,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Public => "PUBLIC",
            AccessType::Allow => "ALLOW",
            AccessType::Forbid => "FORBID",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown access type: {0} (expected PUBLIC, ALLOW or FORBID)")]
pub struct UnknownAccessType(pub String);

impl FromStr for AccessType {
    type Err = UnknownAccessType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(AccessType::Public),
            "ALLOW" => Ok(AccessType::Allow),
            "FORBID" | "FORBIDE" => Ok(AccessType::Forbid),
            _ => Err(UnknownAccessType(s.to_string())),
        }
    }
}

/// An access-control statement for one `(method, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// `METHOD|PATH`, see [`rule_id`].
    pub id: String,
    pub method: HttpMethod,
    /// Slash-separated pattern; a `*` segment matches exactly one path segment.
    pub path: String,
    #[serde(rename = "type")]
    pub access: AccessType,
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Declared by code. The administrative surface must not mutate it.
    #[serde(default)]
    pub fixed: bool,
    /// Empty or absent means the rule applies to every service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Rule {
    pub fn new(method: HttpMethod, path: impl Into<String>, access: AccessType) -> Self {
        let path = path.into();
        Self {
            id: rule_id(method, &path),
            method,
            path,
            access,
            roles: Vec::new(),
            fixed: false,
            service_name: None,
            description: String::new(),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether this rule is visible to a service filtering on `service_name`.
    pub fn applies_to_service(&self, service_name: Option<&str>) -> bool {
        match (service_name, self.service_name.as_deref()) {
            (None, _) | (_, None) | (_, Some("")) => true,
            (Some(wanted), Some(own)) => wanted == own,
        }
    }
}

/// Deterministic rule id for a `(method, path)` pair.
pub fn rule_id(method: HttpMethod, path: &str) -> String {
    format!("{}|{}", method.as_str(), path)
}

/// Truncate a service name to [`MAX_SERVICE_NAME_LEN`] characters.
pub fn normalize_service_name(name: &str) -> String {
    name.chars().take(MAX_SERVICE_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_id_format() {
        assert_eq!(rule_id(HttpMethod::Get, "/api/blogs"), "GET|/api/blogs");
        let rule = Rule::new(HttpMethod::Delete, "/api/blogs/*", AccessType::Allow);
        assert_eq!(rule.id, "DELETE|/api/blogs/*");
    }

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_method_from_http() {
        assert_eq!(
            HttpMethod::try_from(&http::Method::PATCH).unwrap(),
            HttpMethod::Patch
        );
        assert!(HttpMethod::try_from(&http::Method::CONNECT).is_err());
    }

    #[test]
    fn test_access_type_accepts_legacy_forbid_spelling() {
        let access: AccessType = serde_json::from_str("\"FORBIDE\"").unwrap();
        assert_eq!(access, AccessType::Forbid);
        assert_eq!("forbide".parse::<AccessType>().unwrap(), AccessType::Forbid);
        assert_eq!(serde_json::to_string(&access).unwrap(), "\"FORBID\"");
    }

    #[test]
    fn test_rule_serializes_access_as_type() {
        let rule = Rule::new(HttpMethod::Get, "/api/blogs", AccessType::Public);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "PUBLIC");
        assert_eq!(json["method"], "GET");
        assert!(json.get("service_name").is_none());
    }

    #[test]
    fn test_applies_to_service() {
        let global = Rule::new(HttpMethod::Get, "/a", AccessType::Public);
        let empty = global.clone().with_service("");
        let scoped = global.clone().with_service("billing");

        assert!(global.applies_to_service(Some("billing")));
        assert!(empty.applies_to_service(Some("billing")));
        assert!(scoped.applies_to_service(Some("billing")));
        assert!(!scoped.applies_to_service(Some("blog")));
        assert!(scoped.applies_to_service(None));
    }

    #[test]
    fn test_normalize_service_name() {
        assert_eq!(normalize_service_name("blog"), "blog");
        assert_eq!(
            normalize_service_name("a-very-long-service-name-indeed"),
            "a-very-long-service-"
        );
    }
}
