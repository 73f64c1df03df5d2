//! Claim shapes carried by access tokens.
//!
//! Two shapes coexist. The fixed shape (`StandardClaims`) carries exactly a
//! user id, an email and role ids. The open shape (`OpenClaims`) adds an
//! optional username, role names and arbitrary custom fields. Both normalize
//! into a [`TokenPrincipal`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{HasId, HasRoles, RoleId};

/// Value of the `iss` claim on every issued token.
pub const ISSUER: &str = "routeguard";

/// Claim names that custom fields may not overwrite.
pub const RESERVED_CLAIMS: &[&str] = &[
    "user_id",
    "email",
    "username",
    "role_ids",
    "role_names",
    "exp",
    "iat",
    "nbf",
    "iss",
];

/// Keys allowed in the fixed claim shape.
const STANDARD_CLAIM_KEYS: &[&str] = &["user_id", "email", "role_ids", "exp", "iat", "nbf", "iss"];

/// Which role representation is embedded in issued tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFormat {
    #[default]
    Ids,
    Names,
    Both,
}

impl RoleFormat {
    pub fn includes_ids(&self) -> bool {
        matches!(self, RoleFormat::Ids | RoleFormat::Both)
    }

    pub fn includes_names(&self) -> bool {
        matches!(self, RoleFormat::Names | RoleFormat::Both)
    }
}

/// Fixed-shape claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardClaims {
    pub user_id: String,
    pub email: String,
    pub role_ids: Vec<RoleId>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub nbf: i64,
    pub iss: String,
}

/// Open-shape claims with optional role data and custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenClaims {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ids: Option<Vec<RoleId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_names: Option<Vec<String>>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub nbf: i64,
    pub iss: String,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

/// Which claim shape a validated token used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimShape {
    Standard,
    Open,
}

/// Claims of a token that passed signature and temporal validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedClaims {
    Standard(StandardClaims),
    Open(OpenClaims),
}

impl ValidatedClaims {
    /// Classify a verified claim map.
    ///
    /// A payload is the fixed shape only when it carries `role_ids` and no key
    /// outside the fixed set; anything else is read as the open shape.
    pub(crate) fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let is_standard = map.get("role_ids").is_some_and(Value::is_array)
            && map.keys().all(|k| STANDARD_CLAIM_KEYS.contains(&k.as_str()));

        let value = Value::Object(map);
        if is_standard {
            serde_json::from_value(value).map(ValidatedClaims::Standard)
        } else {
            serde_json::from_value(value).map(ValidatedClaims::Open)
        }
    }

    pub fn shape(&self) -> ClaimShape {
        match self {
            ValidatedClaims::Standard(_) => ClaimShape::Standard,
            ValidatedClaims::Open(_) => ClaimShape::Open,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            ValidatedClaims::Standard(c) => &c.user_id,
            ValidatedClaims::Open(c) => &c.user_id,
        }
    }

    /// Normalize either shape into the principal consumed by the engine.
    pub fn into_principal(self) -> TokenPrincipal {
        match self {
            ValidatedClaims::Standard(c) => TokenPrincipal {
                user_id: c.user_id,
                email: c.email,
                username: None,
                role_ids: Some(c.role_ids),
                role_names: None,
                custom: Map::new(),
                expires_at: c.exp,
            },
            ValidatedClaims::Open(c) => TokenPrincipal {
                user_id: c.user_id,
                email: c.email,
                username: c.username,
                role_ids: c.role_ids,
                role_names: c.role_names,
                custom: c.custom,
                expires_at: c.exp,
            },
        }
    }
}

/// The request-scoped principal derived from a validated token.
///
/// `role_ids` is trusted for the lifetime of the request. It is `None` for
/// tokens that only embed role names or predate embedded role ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrincipal {
    pub user_id: String,
    pub email: String,
    pub username: Option<String>,
    pub role_ids: Option<Vec<RoleId>>,
    pub role_names: Option<Vec<String>>,
    pub custom: Map<String, Value>,
    /// Unix timestamp of the `exp` claim.
    pub expires_at: i64,
}

impl TokenPrincipal {
    pub fn custom_field(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }
}

impl HasId for TokenPrincipal {
    type Id = String;

    fn id(&self) -> String {
        self.user_id.clone()
    }
}

impl HasRoles for TokenPrincipal {
    fn role_ids(&self) -> Option<&[RoleId]> {
        self.role_ids.as_deref()
    }

    fn role_names(&self) -> Option<&[String]> {
        self.role_names.as_deref()
    }
}
