use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use routeguard::{
    auth::{
        AuthError, ErrorResponse, IssuedRefreshToken, RefreshTokenService, TOKEN_COOKIE,
        TokenCodec, TokenPrincipal, TokenRequest,
    },
    authz::{DecisionEngine, DynRoleRepo, RoleDirectory, RuleCache},
    config::{ConfigError, RouteGuardConfig, SeedUser},
    db::{
        AccountStatusRepo, RuleRepo,
        memory::{MemoryAccountRepo, MemoryRefreshTokenRepo, MemoryRoleRepo, MemoryRuleRepo},
    },
    jobs,
    middleware::{AuthorizeState, authorize_middleware},
    models::{Role, RoleId},
    observability::init_tracing,
    routes::{RouteRegistry, RouteSpec, sync_routes},
    services::{CreateRule, RuleService, RuleServiceError, UpdateRule},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};
use tower_http::trace::TraceLayer;

/// Config file used when `--config` is not given and it exists.
const DEFAULT_CONFIG_PATH: &str = "routeguard.toml";

/// CLI arguments for the routeguard demo server
#[derive(Parser, Debug)]
#[command(version, about = "Route authorization demo server", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./routeguard.toml if it exists)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the demo server (default)
    Serve,
    /// Print an access token for a seeded user
    Token {
        /// Seeded user id
        #[arg(short, long)]
        user: String,
    },
    /// Validate the configuration file and exit
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        Some(Command::Token { user }) => run_token(&config, &user),
        Some(Command::Check) => {
            println!(
                "Configuration OK: {} roles, {} users, {} routes",
                config.seed.roles.len(),
                config.seed.users.len(),
                config.seed.routes.len()
            );
        }
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(explicit: Option<&str>) -> Result<RouteGuardConfig, ConfigError> {
    match explicit {
        Some(path) => RouteGuardConfig::from_file(path),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            RouteGuardConfig::from_file(DEFAULT_CONFIG_PATH)
        }
        None => Ok(RouteGuardConfig::default()),
    }
}

/// Seeded role ids for a user, resolved from `seed.roles` without a store.
fn seeded_role_ids(config: &RouteGuardConfig, user: &SeedUser) -> Vec<RoleId> {
    config
        .seed
        .roles
        .iter()
        .filter(|r| user.roles.contains(&r.name))
        .map(|r| r.id)
        .collect()
}

fn run_token(config: &RouteGuardConfig, user_id: &str) {
    if let Err(e) = config.auth.require_secret() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    let Some(user) = config.seed.users.iter().find(|u| u.id == user_id) else {
        eprintln!("Error: no seeded user '{}'", user_id);
        std::process::exit(1);
    };

    let codec = TokenCodec::from_config(&config.auth);
    let request = token_request(user, seeded_role_ids(config, user));
    match codec.issue(&request) {
        Ok(token) => println!("{}", token),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn token_request(user: &SeedUser, role_ids: Vec<RoleId>) -> TokenRequest {
    let request = TokenRequest::new(&user.id, &user.email)
        .role_ids(role_ids)
        .role_names(user.roles.iter().cloned());
    match &user.username {
        Some(username) => request.username(username),
        None => request,
    }
}

/// Routes the demo server itself serves, always written over stored rules.
fn builtin_routes() -> Vec<RouteSpec> {
    let super_only = |route: RouteSpec| route.forbid(Vec::<String>::new()).fixed();
    vec![
        RouteSpec::get("/health").public().fixed(),
        RouteSpec::post("/auth/login").public().fixed(),
        RouteSpec::post("/auth/refresh").public().fixed(),
        RouteSpec::post("/auth/logout").public().fixed(),
        RouteSpec::get("/me").fixed(),
        super_only(RouteSpec::get("/admin/rules")),
        super_only(RouteSpec::post("/admin/rules")),
        super_only(RouteSpec::patch("/admin/rules")),
        super_only(RouteSpec::delete("/admin/rules")),
    ]
    .into_iter()
    .map(RouteSpec::override_existing)
    .collect()
}

#[derive(Clone)]
struct AppState {
    codec: Arc<TokenCodec>,
    refresh_tokens: Arc<RefreshTokenService>,
    roles: Arc<RoleDirectory>,
    accounts: Arc<MemoryAccountRepo>,
    users: Arc<HashMap<String, SeedUser>>,
    rules: RuleService,
}

async fn run_server(config: RouteGuardConfig) {
    if let Err(e) = init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    if let Err(e) = config.auth.require_secret() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Seed the in-memory stores
    let role_repo = Arc::new(MemoryRoleRepo::with_roles(config.seed.roles.iter().map(
        |r| {
            if r.system {
                Role::system(r.id, r.name.clone())
            } else {
                Role::new(r.id, r.name.clone())
            }
        },
    )));
    let accounts = Arc::new(MemoryAccountRepo::new());
    for user in &config.seed.users {
        role_repo
            .assign(&user.id, seeded_role_ids(&config, user))
            .await;
        accounts.set_active(&user.id, user.active).await;
    }
    tracing::info!(
        roles = config.seed.roles.len(),
        users = config.seed.users.len(),
        "Seeded in-memory stores"
    );

    let rule_repo: Arc<dyn RuleRepo> = Arc::new(MemoryRuleRepo::new());
    let cache = Arc::new(RuleCache::from_config(rule_repo.clone(), &config.rules));

    let mut registry = RouteRegistry::from_seed(config.seed.routes.clone());
    for route in builtin_routes() {
        registry.register(route);
    }
    if let Err(e) = sync_routes(&registry, rule_repo.as_ref(), role_repo.as_ref(), &cache).await {
        tracing::error!(error = %e, "Failed to sync routes");
        std::process::exit(1);
    }

    let dyn_roles: Arc<DynRoleRepo> = role_repo.clone();
    let directory = Arc::new(RoleDirectory::from_config(dyn_roles, &config.roles).init().await);

    let codec = Arc::new(TokenCodec::from_config(&config.auth));
    let refresh_tokens = Arc::new(
        RefreshTokenService::new(
            Arc::new(MemoryRefreshTokenRepo::new()),
            config.auth.refresh_ttl(),
        )
        .with_account_status(accounts.clone()),
    );

    tokio::spawn(jobs::start_rule_cache_refresh_worker(
        cache.clone(),
        config.rules.clone(),
    ));
    tokio::spawn(jobs::start_refresh_token_cleanup_worker(
        refresh_tokens.clone(),
        config.refresh_tokens.clone(),
    ));

    let authorize = match AuthorizeState::new(
        DecisionEngine::new(cache.clone(), directory.clone()),
        codec.clone(),
    )
    .with_context_header(&config.roles.context_header)
    {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        codec,
        refresh_tokens,
        roles: directory.clone(),
        accounts,
        users: Arc::new(
            config
                .seed
                .users
                .iter()
                .map(|u| (u.id.clone(), u.clone()))
                .collect(),
        ),
        rules: RuleService::new(rule_repo, directory, cache, config.rules.service_name()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/me", get(me))
        .route(
            "/admin/rules",
            get(list_rules)
                .post(add_rule)
                .patch(update_rule)
                .delete(remove_rule),
        )
        .with_state(state)
        .layer(from_fn_with_state(authorize, authorize_middleware))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http());

    let bind_addr = config.server.socket_addr();
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct LoginRequest {
    user_id: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Demo sign-in: trusts the user id of any active seeded user.
async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, AuthError> {
    let Some(user) = state.users.get(&body.user_id) else {
        return Err(AuthError::Unauthenticated);
    };
    let active = state
        .accounts
        .is_active(&user.id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    if !active {
        return Err(AuthError::Unauthenticated);
    }

    let refresh = state.refresh_tokens.issue(&user.id).await?;
    tracing::info!(user_id = %user.id, "User signed in");
    session_response(&state, user, refresh, &cookies).await
}

async fn refresh(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<Value>, AuthError> {
    let rotated = state.refresh_tokens.rotate(&body.refresh_token).await?;
    let Some(user) = state.users.get(&rotated.user_id) else {
        state.refresh_tokens.revoke_all(&rotated.user_id).await?;
        return Err(AuthError::RefreshTokenInvalid);
    };
    session_response(&state, user, rotated, &cookies).await
}

async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    state.refresh_tokens.revoke(&body.refresh_token).await?;
    cookies.remove(Cookie::new(TOKEN_COOKIE, ""));
    Ok(StatusCode::NO_CONTENT)
}

async fn session_response(
    state: &AppState,
    user: &SeedUser,
    refresh: IssuedRefreshToken,
    cookies: &Cookies,
) -> Result<Json<Value>, AuthError> {
    let role_ids = state
        .roles
        .role_ids_of_user(&user.id)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    let access_token = state.codec.issue(&token_request(user, role_ids))?;
    cookies.add(Cookie::new(TOKEN_COOKIE, access_token.clone()));

    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": state.codec.ttl().as_secs(),
        "refresh_token": refresh.token,
        "refresh_expires_at": refresh.expires_at,
    })))
}

async fn me(principal: TokenPrincipal) -> Json<Value> {
    Json(json!({
        "user_id": principal.user_id,
        "email": principal.email,
        "username": principal.username,
        "role_ids": principal.role_ids,
        "role_names": principal.role_names,
        "expires_at": principal.expires_at,
    }))
}

struct AdminError(RuleServiceError);

impl From<RuleServiceError> for AdminError {
    fn from(err: RuleServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            RuleServiceError::FixedRule(_) => (StatusCode::FORBIDDEN, "fixed_rule"),
            RuleServiceError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            RuleServiceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            RuleServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            RuleServiceError::Storage(e) => {
                tracing::error!(error = %e, "Rule storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse::with_type("invalid_request_error", code, message);
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
struct RuleIdQuery {
    id: String,
}

async fn list_rules(State(state): State<AppState>) -> Result<Json<Value>, AdminError> {
    let rules = state.rules.list_rules().await?;
    Ok(Json(json!({ "data": rules })))
}

async fn add_rule(
    State(state): State<AppState>,
    Json(input): Json<CreateRule>,
) -> Result<(StatusCode, Json<Value>), AdminError> {
    let rule = state.rules.add_rule(input).await?;
    Ok((StatusCode::CREATED, Json(json!(rule))))
}

async fn update_rule(
    State(state): State<AppState>,
    Query(query): Query<RuleIdQuery>,
    Json(input): Json<UpdateRule>,
) -> Result<Json<Value>, AdminError> {
    let rule = state.rules.update_rule(&query.id, input).await?;
    Ok(Json(json!(rule)))
}

async fn remove_rule(
    State(state): State<AppState>,
    Query(query): Query<RuleIdQuery>,
) -> Result<StatusCode, AdminError> {
    state.rules.remove_rule(&query.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
