//! Signing and verification of role-carrying access tokens.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    TokenError,
    claims::{
        ISSUER, OpenClaims, RESERVED_CLAIMS, RoleFormat, StandardClaims, TokenPrincipal,
        ValidatedClaims,
    },
};
use crate::{config::TokenConfig, models::RoleId};

/// The only accepted signing algorithm.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Everything embedded in a token at issuance.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub user_id: String,
    pub email: String,
    pub role_ids: Vec<RoleId>,
    pub role_names: Vec<String>,
    pub username: Option<String>,
    /// Extra claims. Keys colliding with reserved claims are dropped.
    pub custom: Map<String, Value>,
    /// Overrides the codec's configured role format.
    pub role_format: Option<RoleFormat>,
}

impl TokenRequest {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn role_ids(mut self, role_ids: impl IntoIterator<Item = RoleId>) -> Self {
        self.role_ids = role_ids.into_iter().collect();
        self
    }

    pub fn role_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.role_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn custom_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn role_format(mut self, format: RoleFormat) -> Self {
        self.role_format = Some(format);
        self
    }
}

/// HS256 token codec bound to one secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    role_format: RoleFormat,
    leeway_secs: u64,
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            role_format: RoleFormat::default(),
            leeway_secs: 0,
        }
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.access_ttl())
            .with_role_format(config.role_format)
            .with_leeway(config.leeway_secs)
    }

    pub fn with_role_format(mut self, role_format: RoleFormat) -> Self {
        self.role_format = role_format;
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn role_format(&self) -> RoleFormat {
        self.role_format
    }

    /// Issue a token valid from now until now + ttl.
    pub fn issue(&self, request: &TokenRequest) -> Result<String, TokenError> {
        self.issue_at(request, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    pub fn issue_at(&self, request: &TokenRequest, now: i64) -> Result<String, TokenError> {
        let format = request.role_format.unwrap_or(self.role_format);
        let exp = now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));

        let uses_standard_shape =
            format == RoleFormat::Ids && request.username.is_none() && request.custom.is_empty();

        if uses_standard_shape {
            let claims = StandardClaims {
                user_id: request.user_id.clone(),
                email: request.email.clone(),
                role_ids: request.role_ids.clone(),
                exp,
                iat: now,
                nbf: now,
                iss: ISSUER.to_string(),
            };
            return self.sign(&claims);
        }

        let mut custom = Map::new();
        for (key, value) in &request.custom {
            if RESERVED_CLAIMS.contains(&key.as_str()) {
                tracing::debug!(
                    field = %key,
                    "Skipping custom field that collides with a reserved claim"
                );
                continue;
            }
            custom.insert(key.clone(), value.clone());
        }

        let claims = OpenClaims {
            user_id: request.user_id.clone(),
            email: request.email.clone(),
            username: request.username.clone(),
            // Embedded even when empty; zero roles is authoritative too.
            role_ids: format.includes_ids().then(|| request.role_ids.clone()),
            role_names: format.includes_names().then(|| request.role_names.clone()),
            exp,
            iat: now,
            nbf: now,
            iss: ISSUER.to_string(),
            custom,
        };
        self.sign(&claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its claims in whichever shape it was issued.
    pub fn validate(&self, token: &str) -> Result<ValidatedClaims, TokenError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "Failed to decode token header");
            TokenError::Malformed(e.to_string())
        })?;

        // Checked before signature verification to reject algorithm substitution.
        if header.alg != ALGORITHM {
            tracing::warn!(
                algorithm = ?header.alg,
                expected = ?ALGORITHM,
                "Token signed with unexpected algorithm"
            );
            return Err(TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_secs;

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &validation).map_err(
            |e| {
                tracing::debug!(error = %e, "Token validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    ErrorKind::InvalidAlgorithm => {
                        TokenError::UnexpectedAlgorithm(format!("{:?}", header.alg))
                    }
                    _ => TokenError::Malformed(e.to_string()),
                }
            },
        )?;

        ValidatedClaims::from_map(data.claims).map_err(|e| {
            tracing::debug!(error = %e, "Token claims have an unrecognized shape");
            TokenError::Malformed(e.to_string())
        })
    }

    /// Validate and normalize into a [`TokenPrincipal`].
    pub fn extract(&self, token: &str) -> Result<TokenPrincipal, TokenError> {
        self.validate(token).map(ValidatedClaims::into_principal)
    }
}
