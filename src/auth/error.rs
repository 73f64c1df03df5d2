use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    authz::{AuthzError, Denial},
    db::DbError,
};

/// Failures of the token codec.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token was signed with an unexpected algorithm: {0}")]
    UnexpectedAlgorithm(String),

    #[error("Token has expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Tampered, forged or unparsable tokens. Expiry is reported separately.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            TokenError::InvalidSignature
                | TokenError::UnexpectedAlgorithm(_)
                | TokenError::Malformed(_)
        )
    }
}

/// Failures of refresh-token issue and rotation.
#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("Refresh token is invalid")]
    Invalid,

    #[error("Refresh token has expired")]
    Expired,

    #[error("Refresh token storage error: {0}")]
    Storage(#[from] DbError),
}

/// JSON error envelope: `{"error": {"type": ..., "code": ..., "message": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn with_type(
        error_type: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// HTTP-facing authentication and authorization failures.
#[derive(Debug)]
pub enum AuthError {
    /// No credentials where the endpoint requires them
    Unauthenticated,

    /// Bad signature, unexpected algorithm or malformed token
    TokenInvalid,

    /// Access token has expired
    TokenExpired,

    /// Refresh token unknown or already rotated away
    RefreshTokenInvalid,

    /// Refresh token has expired
    RefreshTokenExpired,

    /// Authenticated but not permitted. The denial kind is kept for logging
    /// and never exposed in the response.
    Forbidden(Denial),

    /// Internal error during authentication or authorization
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated
            | AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::RefreshTokenInvalid
            | AuthError::RefreshTokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "authentication_required",
            AuthError::TokenInvalid => "invalid_token",
            AuthError::TokenExpired => "expired_token",
            AuthError::RefreshTokenInvalid => "invalid_refresh_token",
            AuthError::RefreshTokenExpired => "expired_refresh_token",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (error_type, message) = match &self {
            AuthError::Unauthenticated => ("authentication_error", "Authentication required"),
            AuthError::TokenInvalid => ("authentication_error", "Invalid authentication token"),
            AuthError::TokenExpired => (
                "authentication_error",
                "Authentication token has expired",
            ),
            AuthError::RefreshTokenInvalid => ("authentication_error", "Invalid refresh token"),
            AuthError::RefreshTokenExpired => {
                ("authentication_error", "Refresh token has expired")
            }
            AuthError::Forbidden(denial) => {
                tracing::debug!(denial = %denial, "Request forbidden");
                ("permission_error", "You do not have permission to access this resource")
            }
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal authorization error");
                ("server_error", "Internal server error")
            }
        };

        let body = ErrorResponse::with_type(error_type, code, message);
        (status, Json(body)).into_response()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "Authentication required"),
            AuthError::TokenInvalid => write!(f, "Invalid authentication token"),
            AuthError::TokenExpired => write!(f, "Authentication token has expired"),
            AuthError::RefreshTokenInvalid => write!(f, "Invalid refresh token"),
            AuthError::RefreshTokenExpired => write!(f, "Refresh token has expired"),
            AuthError::Forbidden(denial) => write!(f, "Access forbidden: {}", denial),
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Signing(msg) => AuthError::Internal(msg),
            _ => AuthError::TokenInvalid,
        }
    }
}

impl From<RefreshTokenError> for AuthError {
    fn from(err: RefreshTokenError) -> Self {
        match err {
            RefreshTokenError::Invalid => AuthError::RefreshTokenInvalid,
            RefreshTokenError::Expired => AuthError::RefreshTokenExpired,
            RefreshTokenError::Storage(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<AuthzError> for AuthError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AuthError::Unauthenticated,
            AuthzError::Forbidden(denial) => AuthError::Forbidden(denial),
            AuthzError::Storage(e) => AuthError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_unauthenticated_is_401() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_token_errors_map_to_401() {
        for err in [
            TokenError::InvalidSignature,
            TokenError::UnexpectedAlgorithm("HS512".into()),
            TokenError::Expired,
            TokenError::Malformed("bad".into()),
        ] {
            let auth: AuthError = err.into();
            assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_signing_error_is_internal() {
        let auth: AuthError = TokenError::Signing("boom".into()).into();
        assert_eq!(auth.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_forbidden_body_is_the_same_for_every_denial() {
        let no_rule = body_json(AuthError::Forbidden(Denial::NoMatchingRule).into_response()).await;
        let not_permitted =
            body_json(AuthError::Forbidden(Denial::NotPermitted).into_response()).await;
        let forbidden = body_json(
            AuthError::Forbidden(Denial::Forbidden {
                rule_id: "DELETE|/api/blogs/*".into(),
            })
            .into_response(),
        )
        .await;

        assert_eq!(no_rule, not_permitted);
        assert_eq!(no_rule, forbidden);
        assert_eq!(no_rule["error"]["type"], "permission_error");
        assert_eq!(no_rule["error"]["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AuthError::Internal("db password wrong".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_display_includes_denial() {
        let err = AuthError::Forbidden(Denial::RoleContextUnknown);
        assert!(err.to_string().contains("Access forbidden"));
    }
}
