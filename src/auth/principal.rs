//! Locating the access token on an inbound request.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tower_cookies::Cookies;

use super::{AuthError, TokenPrincipal};

/// Cookie checked when no `Authorization` header is present.
pub const TOKEN_COOKIE: &str = "token";

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Access token from `Authorization: Bearer`, falling back to the `token` cookie.
pub fn extract_token(headers: &HeaderMap, cookies: Option<&Cookies>) -> Option<String> {
    bearer_token(headers).or_else(|| {
        cookies?
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Handlers behind the authorize middleware can take the principal directly.
impl<S> FromRequestParts<S> for TokenPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TokenPrincipal>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_extract_token_without_cookies() {
        assert_eq!(
            extract_token(&headers("Bearer from-header"), None).as_deref(),
            Some("from-header")
        );
        assert_eq!(extract_token(&HeaderMap::new(), None), None);
    }
}
