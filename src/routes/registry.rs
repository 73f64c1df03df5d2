use std::collections::HashMap;

use crate::{
    authz::path::{count_segments, has_wildcard, segments_match},
    config::SeedRoute,
    models::{AccessType, HttpMethod, rule_id},
};

/// A route declared by application code.
///
/// Defaults to `ALLOW` with no roles, i.e. any authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    pub access: AccessType,
    /// Role names, resolved to ids during sync.
    pub roles: Vec<String>,
    pub fixed: bool,
    /// Overwrite the stored rule on every sync instead of only creating it.
    pub override_existing: bool,
    pub description: String,
}

impl RouteSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            access: AccessType::Allow,
            roles: Vec::new(),
            fixed: false,
            override_existing: false,
            description: String::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// No authentication required.
    pub fn public(mut self) -> Self {
        self.access = AccessType::Public;
        self.roles.clear();
        self
    }

    /// Grant to `roles`, or to any authenticated principal when empty.
    pub fn allow<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access = AccessType::Allow;
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Deny `roles`, or every principal when empty.
    pub fn forbid<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access = AccessType::Forbid;
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn override_existing(mut self) -> Self {
        self.override_existing = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn rule_id(&self) -> String {
        rule_id(self.method, &self.path)
    }

    pub fn is_pattern(&self) -> bool {
        has_wildcard(&self.path)
    }
}

impl From<SeedRoute> for RouteSpec {
    fn from(seed: SeedRoute) -> Self {
        Self {
            method: seed.method,
            path: seed.path,
            access: seed.access,
            roles: seed.roles,
            fixed: seed.fixed,
            override_existing: seed.override_existing,
            description: seed.description.unwrap_or_default(),
        }
    }
}

/// Every route the application declared, keyed by rule id.
#[derive(Debug, Default, Clone)]
pub struct RouteRegistry {
    routes: Vec<RouteSpec>,
    by_id: HashMap<String, usize>,
    /// Wildcard routes by method and segment count.
    patterns: HashMap<(HttpMethod, usize), Vec<usize>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(routes: impl IntoIterator<Item = SeedRoute>) -> Self {
        let mut registry = Self::new();
        for route in routes {
            registry.register(route.into());
        }
        registry
    }

    /// Add a route. A second declaration of the same `METHOD|PATH` replaces the first.
    pub fn register(&mut self, route: RouteSpec) -> &mut Self {
        let id = route.rule_id();
        if let Some(&idx) = self.by_id.get(&id) {
            tracing::warn!(rule_id = %id, "Route declared twice, keeping the later declaration");
            self.routes[idx] = route;
            return self;
        }

        let idx = self.routes.len();
        if route.is_pattern() {
            self.patterns
                .entry((route.method, count_segments(&route.path)))
                .or_default()
                .push(idx);
        }
        self.by_id.insert(id, idx);
        self.routes.push(route);
        self
    }

    /// The declared route serving `(method, path)`.
    ///
    /// An exact declaration wins over any wildcard pattern.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&RouteSpec> {
        if let Some(route) = self
            .by_id
            .get(&rule_id(method, path))
            .map(|&idx| &self.routes[idx])
            .filter(|r| !r.is_pattern())
        {
            return Some(route);
        }

        self.patterns
            .get(&(method, count_segments(path)))?
            .iter()
            .map(|&idx| &self.routes[idx])
            .find(|r| segments_match(&r.path, path))
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.by_id.contains_key(rule_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
