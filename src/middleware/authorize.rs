use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    auth::{AuthError, TokenCodec, TokenPrincipal, extract_token},
    authz::{AuthzError, Decision, DecisionEngine, Denial},
    config::ConfigError,
    models::HttpMethod,
};

pub const DEFAULT_CONTEXT_HEADER: &str = "x-role-context";

/// Everything the authorize middleware needs per request.
#[derive(Clone)]
pub struct AuthorizeState {
    pub engine: DecisionEngine,
    pub codec: Arc<TokenCodec>,
    /// Request header carrying the role-context name.
    pub context_header: HeaderName,
}

impl AuthorizeState {
    pub fn new(engine: DecisionEngine, codec: Arc<TokenCodec>) -> Self {
        Self {
            engine,
            codec,
            context_header: HeaderName::from_static(DEFAULT_CONTEXT_HEADER),
        }
    }

    pub fn with_context_header(mut self, header: &str) -> Result<Self, ConfigError> {
        self.context_header = HeaderName::try_from(header).map_err(|e| {
            ConfigError::Validation(format!("Invalid role context header '{}': {}", header, e))
        })?;
        Ok(self)
    }
}

/// Authorize every request against the rule cache.
///
/// The token is read from `Authorization: Bearer` or the `token` cookie
/// (requires `CookieManagerLayer` outside this layer). On success the
/// [`TokenPrincipal`] is inserted into request extensions.
///
/// An invalid or expired token is only reported when the route needs
/// authentication; public routes ignore it.
pub async fn authorize_middleware(
    State(state): State<AuthorizeState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Ok(method) = HttpMethod::try_from(req.method()) else {
        tracing::debug!(method = %req.method(), "Unsupported method, no rule can match");
        return Err(AuthError::Forbidden(Denial::NoMatchingRule));
    };

    let cookies = req.extensions().get::<Cookies>().cloned();
    let token = extract_token(req.headers(), cookies.as_ref()).map(|token| {
        state.codec.extract(&token).inspect_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
        })
    });
    let principal = token.as_ref().and_then(|t| t.as_ref().ok());

    // Non-ASCII bytes are kept so a selector that cannot be resolved still denies.
    let role_context = req
        .headers()
        .get(&state.context_header)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    let path = req.uri().path().to_string();
    let decision = state
        .engine
        .decide(method, &path, principal, role_context.as_deref())
        .await
        .map_err(AuthzError::from)?;

    if let Decision::Denied(Denial::AuthenticationRequired) = &decision
        && let Some(Err(e)) = token
    {
        return Err(e.into());
    }

    decision.into_result()?;

    if let Some(Ok(principal)) = token {
        req.extensions_mut().insert::<TokenPrincipal>(principal);
    }
    Ok(next.run(req).await)
}
