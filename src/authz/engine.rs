//! Request authorization decisions.
//!
//! Order of evaluation for one `(method, path)`:
//!
//! 1. no matching rule denies
//! 2. any `PUBLIC` rule allows without authentication
//! 3. every other rule requires a principal
//! 4. holders of the super-role are allowed unconditionally
//! 5. a role-context selector narrows the principal to one held role
//! 6. any matching `FORBID` denies
//! 7. any matching `ALLOW` allows
//! 8. anything else denies

use std::{borrow::Cow, fmt, sync::Arc};

use super::{AuthzError, DynRoleRepo, RoleDirectory, RuleCache};
use crate::{
    db::{DbResult, RoleRepo},
    models::{AccessType, HasId, HasRoles, HttpMethod, RoleId, Rule},
};

/// Role-context values longer than this are rejected without a lookup.
const MAX_ROLE_CONTEXT_LENGTH: usize = 64;

/// Why a request was allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Public { rule_id: String },
    SuperRole,
    Rule {
        rule_id: String,
        /// Set when a role context narrowed the principal's roles.
        narrowed_to: Option<RoleId>,
    },
}

/// Why a request was denied.
///
/// Every variant except `AuthenticationRequired` maps to the same external
/// response; the distinction is for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    NoMatchingRule,
    AuthenticationRequired,
    RoleContextUnknown,
    RoleContextNotHeld,
    Forbidden { rule_id: String },
    NotPermitted,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::NoMatchingRule => write!(f, "no rule matches the request"),
            Denial::AuthenticationRequired => write!(f, "authentication required"),
            Denial::RoleContextUnknown => write!(f, "role context names an unknown role"),
            Denial::RoleContextNotHeld => write!(f, "role context names a role not held"),
            Denial::Forbidden { rule_id } => write!(f, "forbidden by rule {}", rule_id),
            Denial::NotPermitted => write!(f, "no rule permits the principal's roles"),
        }
    }
}

/// States a decision passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionState {
    NoMatch,
    PublicAllowed,
    AwaitAuth,
    SuperBypass,
    RoleContextInvalid,
    RoleContextNarrowed,
    ForbiddenMatched,
    Allowed,
    Denied,
}

impl DecisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionState::NoMatch => "NO_MATCH",
            DecisionState::PublicAllowed => "PUBLIC_ALLOWED",
            DecisionState::AwaitAuth => "AWAIT_AUTH",
            DecisionState::SuperBypass => "SUPER_BYPASS",
            DecisionState::RoleContextInvalid => "ROLE_CONTEXT_INVALID",
            DecisionState::RoleContextNarrowed => "ROLE_CONTEXT_NARROWED",
            DecisionState::ForbiddenMatched => "FORBIDDEN_MATCHED",
            DecisionState::Allowed => "ALLOWED",
            DecisionState::Denied => "DENIED",
        }
    }
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(Grant),
    Denied(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// The state that settled the outcome.
    pub fn state(&self) -> DecisionState {
        match self {
            Decision::Allowed(Grant::Public { .. }) => DecisionState::PublicAllowed,
            Decision::Allowed(Grant::SuperRole) => DecisionState::SuperBypass,
            Decision::Allowed(Grant::Rule {
                narrowed_to: Some(_),
                ..
            }) => DecisionState::RoleContextNarrowed,
            Decision::Allowed(Grant::Rule { .. }) => DecisionState::Allowed,
            Decision::Denied(Denial::NoMatchingRule) => DecisionState::NoMatch,
            Decision::Denied(Denial::AuthenticationRequired) => DecisionState::AwaitAuth,
            Decision::Denied(Denial::RoleContextUnknown | Denial::RoleContextNotHeld) => {
                DecisionState::RoleContextInvalid
            }
            Decision::Denied(Denial::Forbidden { .. }) => DecisionState::ForbiddenMatched,
            Decision::Denied(Denial::NotPermitted) => DecisionState::Denied,
        }
    }

    /// Convert into the error taxonomy used by request pipelines.
    pub fn into_result(self) -> Result<Grant, AuthzError> {
        match self {
            Decision::Allowed(grant) => Ok(grant),
            Decision::Denied(Denial::AuthenticationRequired) => Err(AuthzError::Unauthenticated),
            Decision::Denied(denial) => Err(AuthzError::Forbidden(denial)),
        }
    }
}

/// Apply `FORBID` then `ALLOW` rules to an effective role set.
///
/// `PUBLIC` rules are ignored here; they are settled before authentication.
pub fn evaluate_rules(
    rules: &[&Rule],
    effective_roles: &[RoleId],
    narrowed_to: Option<RoleId>,
) -> Decision {
    let intersects = |rule: &Rule| rule.roles.iter().any(|r| effective_roles.contains(r));

    if let Some(rule) = rules
        .iter()
        .find(|r| r.access == AccessType::Forbid && (r.roles.is_empty() || intersects(**r)))
    {
        return Decision::Denied(Denial::Forbidden {
            rule_id: rule.id.clone(),
        });
    }

    if let Some(rule) = rules
        .iter()
        .find(|r| r.access == AccessType::Allow && (r.roles.is_empty() || intersects(**r)))
    {
        return Decision::Allowed(Grant::Rule {
            rule_id: rule.id.clone(),
            narrowed_to,
        });
    }

    Decision::Denied(Denial::NotPermitted)
}

pub struct DecisionEngine<R: RoleRepo + ?Sized = DynRoleRepo> {
    rules: Arc<RuleCache>,
    roles: Arc<RoleDirectory<R>>,
}

impl<R: RoleRepo + ?Sized> Clone for DecisionEngine<R> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            roles: self.roles.clone(),
        }
    }
}

impl<R: RoleRepo + ?Sized> DecisionEngine<R> {
    pub fn new(rules: Arc<RuleCache>, roles: Arc<RoleDirectory<R>>) -> Self {
        Self { rules, roles }
    }

    pub fn rules(&self) -> &Arc<RuleCache> {
        &self.rules
    }

    pub fn roles(&self) -> &Arc<RoleDirectory<R>> {
        &self.roles
    }

    /// Decide one request.
    ///
    /// Storage is only consulted on role-directory cache misses and for
    /// principals whose token carries no role ids.
    pub async fn decide<P>(
        &self,
        method: HttpMethod,
        path: &str,
        principal: Option<&P>,
        role_context: Option<&str>,
    ) -> DbResult<Decision>
    where
        P: HasId<Id = String> + HasRoles + Sync,
    {
        let decision = self
            .decide_inner(method, path, principal, role_context)
            .await?;

        match &decision {
            Decision::Allowed(grant) => tracing::debug!(
                method = %method,
                path = %path,
                state = %decision.state(),
                grant = ?grant,
                "Request allowed"
            ),
            Decision::Denied(denial) => tracing::debug!(
                method = %method,
                path = %path,
                state = %decision.state(),
                reason = %denial,
                "Request denied"
            ),
        }
        Ok(decision)
    }

    /// [`decide`](Self::decide), mapped into [`AuthzError`] on denial.
    pub async fn authorize<P>(
        &self,
        method: HttpMethod,
        path: &str,
        principal: Option<&P>,
        role_context: Option<&str>,
    ) -> Result<Grant, AuthzError>
    where
        P: HasId<Id = String> + HasRoles + Sync,
    {
        self.decide(method, path, principal, role_context)
            .await?
            .into_result()
    }

    async fn decide_inner<P>(
        &self,
        method: HttpMethod,
        path: &str,
        principal: Option<&P>,
        role_context: Option<&str>,
    ) -> DbResult<Decision>
    where
        P: HasId<Id = String> + HasRoles + Sync,
    {
        let index = self.rules.snapshot();
        let matched = index.find(method, path);
        if matched.is_empty() {
            return Ok(Decision::Denied(Denial::NoMatchingRule));
        }

        if let Some(rule) = matched.iter().find(|r| r.access == AccessType::Public) {
            return Ok(Decision::Allowed(Grant::Public {
                rule_id: rule.id.clone(),
            }));
        }

        let Some(principal) = principal else {
            return Ok(Decision::Denied(Denial::AuthenticationRequired));
        };

        let role_ids = self.principal_role_ids(principal).await?;

        if let Some(super_id) = self.roles.ensure_super_role().await
            && role_ids.contains(&super_id)
        {
            return Ok(Decision::Allowed(Grant::SuperRole));
        }

        let role_context = role_context.map(str::trim).filter(|s| !s.is_empty());
        let Some(context) = role_context else {
            return Ok(evaluate_rules(&matched, &role_ids, None));
        };

        if context.len() > MAX_ROLE_CONTEXT_LENGTH {
            return Ok(Decision::Denied(Denial::RoleContextUnknown));
        }
        let Some(context_id) = self.roles.role_id_by_name(context).await? else {
            return Ok(Decision::Denied(Denial::RoleContextUnknown));
        };
        if !role_ids.contains(&context_id) {
            return Ok(Decision::Denied(Denial::RoleContextNotHeld));
        }

        Ok(evaluate_rules(&matched, &[context_id], Some(context_id)))
    }

    /// Role ids from the token, or from storage for tokens that lack them.
    async fn principal_role_ids<'p, P>(&self, principal: &'p P) -> DbResult<Cow<'p, [RoleId]>>
    where
        P: HasId<Id = String> + HasRoles + Sync,
    {
        if let Some(ids) = principal.role_ids() {
            return Ok(Cow::Borrowed(ids));
        }
        if let Some(names) = principal.role_names() {
            tracing::debug!(user_id = %principal.id(), "Resolving role names carried by token");
            return self.roles.role_ids_by_names(names).await.map(Cow::Owned);
        }
        tracing::debug!(
            user_id = %principal.id(),
            "Token carries no roles, loading role assignments from storage"
        );
        self.roles
            .role_ids_of_user(&principal.id())
            .await
            .map(Cow::Owned)
    }
}
