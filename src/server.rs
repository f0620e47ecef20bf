//! Roleguard HTTP surface
//!
//! Endpoints:
//!   GET  /health                 - Health check
//!   POST /api/auth/register      - Create a user with the `user` role
//!   POST /api/auth/signin        - Password login, sets the session cookie
//!   POST /api/auth/signout       - Revoke the current session
//!   GET  /api/auth/me            - Current principal
//!   POST /api/permissions/check  - Check permissions for the current principal
//!   POST /api/permissions/role   - Check permissions for a bare role (signed in)
//!   GET  /api/admin/users        - List users (user: view)
//!   POST /api/admin/set-role     - Assign roles (user: update)
//!   GET  /dashboard, /analytics, /settings, /unauthorized, /auth/signin
//!
//! Page routes redirect on denial; API routes answer 401/403. Password
//! hashing and store writes run on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{err, RoleguardError};
use crate::gate::{PermissionContext, PermissionGate, Rendered, ACCESS_DENIED_NOTICE};
use crate::guard::{Denial, Guard};
use crate::principal::Principal;
use crate::resolver::Permissions;
use crate::store::Store;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "roleguard.session_token";

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub guard: Guard,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire a guard over the store as identity provider
    pub fn new(store: Store, config: Config) -> Self {
        let guard = Guard::from_config(Arc::new(store.clone()), &config);
        AppState { store, guard, config: Arc::new(config) }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct CredentialsReq {
    id: String,
    password: String,
}

#[derive(Deserialize)]
struct CheckReq {
    #[serde(default)]
    permissions: Permissions,
}

#[derive(Deserialize)]
struct RoleCheckReq {
    role: String,
    #[serde(default)]
    permissions: Permissions,
}

#[derive(Deserialize)]
struct SetRoleReq {
    user_id: String,
    role: String,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(msg: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(msg.into()) }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

#[derive(Serialize)]
struct CheckRes {
    success: bool,
}

#[derive(Serialize)]
struct HealthRes {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct SigninRes {
    user_id: String,
    token: String,
}

#[derive(Serialize)]
struct UserInfo {
    id: String,
    roles: Vec<String>,
}

impl From<&Principal> for UserInfo {
    fn from(p: &Principal) -> Self {
        UserInfo { id: p.id.clone(), roles: p.roles().map(str::to_string).collect() }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Session token from `Authorization: Bearer` or the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(t) = bearer {
        return Some(t.to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .map(|(_, v)| v.to_string())
}

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

// Denial bodies stay generic
fn api_denial<T>(denial: &Denial) -> ApiResult<T> {
    let (status, msg) = match denial {
        Denial::Unauthenticated { .. } => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        Denial::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        Denial::Misconfigured { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    };
    (status, Json(ApiResponse::err(msg)))
}

fn api_error<T>(e: RoleguardError) -> ApiResult<T> {
    let status = match &e {
        RoleguardError::UserExists(_) | RoleguardError::AlreadyBootstrapped => StatusCode::CONFLICT,
        RoleguardError::UnknownUser(_) => StatusCode::NOT_FOUND,
        RoleguardError::InvalidId(_) | RoleguardError::UnknownRole(_) | RoleguardError::Config { .. } => {
            StatusCode::BAD_REQUEST
        }
        RoleguardError::InvalidCredentials | RoleguardError::InvalidToken | RoleguardError::TokenExpired => {
            StatusCode::UNAUTHORIZED
        }
        RoleguardError::NotOwner { .. } => StatusCode::FORBIDDEN,
        RoleguardError::Storage(_) | RoleguardError::Corrupted(_) => {
            tracing::warn!(error = %e, "request failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::err("internal error")));
        }
    };
    (status, Json(ApiResponse::err(e.to_string())))
}

// Run store work off the async workers
async fn blocking<T, F>(f: F) -> crate::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(err)?
}

fn redirect(denial: &Denial) -> Response {
    match denial.location() {
        Some(location) => (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, Html(page("Error", "Something went wrong."))).into_response(),
    }
}

async fn authorize(state: &AppState, headers: &HeaderMap, permissions: &Permissions) -> Result<Principal, Denial> {
    let token = session_token(headers);
    state.guard.require_permission(token.as_deref(), permissions, None).await
}

fn escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

fn page(title: &str, body: &str) -> String {
    format!("<!doctype html><html><head><title>{title}</title></head><body><h1>{title}</h1>{body}</body></html>")
}

// Links the principal may follow
fn nav(ctx: &PermissionContext) -> String {
    let mut links: Vec<String> = [("dashboard", "Dashboard"), ("analytics", "Analytics"), ("settings", "Settings")]
        .into_iter()
        .filter_map(|(resource, label)| {
            let link = format!("<a href=\"/{resource}\">{label}</a>");
            match PermissionGate::new(resource, "view").render(ctx, link, None, None) {
                Rendered::Content(l) => Some(l),
                _ => None,
            }
        })
        .collect();
    if let Rendered::Content(l) =
        PermissionGate::admin_only().render(ctx, "<a href=\"/api/admin/users\">Users</a>".to_string(), None, None)
    {
        links.push(l);
    }
    format!("<nav>{}</nav>", links.join(" | "))
}

async fn guarded_page(state: &AppState, headers: &HeaderMap, resource: &str, title: &str) -> Response {
    let token = session_token(headers);
    let permissions = crate::permissions! { resource => ["view"] };
    let resolver = *state.guard.resolver();
    let rendered = state
        .guard
        .with_permission(token.as_deref(), &permissions, None, |p| {
            let ctx = PermissionContext::resolve(&resolver, Some(&p));
            page(title, &format!("{}<p>Signed in as {}</p>", nav(&ctx), escape(&p.id)))
        })
        .await;
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(d) => redirect(&d),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthRes> {
    Json(HealthRes { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

async fn post_register(State(state): State<AppState>, Json(req): Json<CredentialsReq>) -> ApiResult<String> {
    if req.password.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::err("password required")));
    }
    let store = state.store.clone();
    let CredentialsReq { id, password } = req;
    let user = id.clone();
    match blocking(move || store.register(&user, &password)).await {
        Ok(()) => ok(id),
        Err(e) => api_error(e),
    }
}

async fn post_signin(State(state): State<AppState>, Json(req): Json<CredentialsReq>) -> Response {
    let store = state.store.clone();
    let ttl = state.config.session_ttl();
    let (user, password) = (req.id.clone(), req.password);
    match blocking(move || store.login(&user, &password, ttl)).await {
        Ok(token) => {
            let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
            if let Some(ttl) = state.config.session_ttl() {
                cookie.push_str(&format!("; Max-Age={ttl}"));
            }
            let body = ok(SigninRes { user_id: req.id, token });
            ([(header::SET_COOKIE, cookie)], body).into_response()
        }
        Err(RoleguardError::InvalidCredentials) => {
            tracing::debug!(user = %req.id, "sign-in rejected");
            api_error::<()>(RoleguardError::InvalidCredentials).into_response()
        }
        Err(e) => api_error::<()>(e).into_response(),
    }
}

async fn post_signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let revoked = match session_token(&headers) {
        Some(token) => match blocking({
            let store = state.store.clone();
            move || store.revoke_session(&token)
        })
        .await
        {
            Ok(r) => r,
            Err(e) => return api_error::<()>(e).into_response(),
        },
        None => false,
    };
    let clear = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    ([(header::SET_COOKIE, clear)], ok(revoked)).into_response()
}

async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UserInfo> {
    let token = session_token(&headers);
    match state.guard.require_auth(token.as_deref()).await {
        Ok(p) => ok(UserInfo::from(&p)),
        Err(d) => api_denial(&d),
    }
}

async fn post_check(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CheckReq>) -> Response {
    let token = session_token(&headers);
    let Some(principal) = state.guard.principal(token.as_deref()).await else {
        return (StatusCode::UNAUTHORIZED, Json(CheckRes { success: false })).into_response();
    };
    match state.guard.resolver().check_permission(&principal, &req.permissions) {
        Ok(success) => Json(CheckRes { success }).into_response(),
        Err(e) => api_error::<()>(e).into_response(),
    }
}

async fn post_role_check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RoleCheckReq>,
) -> Response {
    let token = session_token(&headers);
    if let Err(d) = state.guard.require_auth(token.as_deref()).await {
        return api_denial::<()>(&d).into_response();
    }
    match state.guard.resolver().check_role_permission(&req.role, &req.permissions) {
        Ok(success) => Json(CheckRes { success }).into_response(),
        Err(e) => api_error::<()>(e).into_response(),
    }
}

async fn get_users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<UserInfo>> {
    if let Err(d) = authorize(&state, &headers, &crate::permissions! { "user" => ["view"] }).await {
        return api_denial(&d);
    }
    let store = state.store.clone();
    match blocking(move || store.list_users()).await {
        Ok(users) => ok(users
            .iter()
            .map(|(id, roles)| UserInfo::from(&Principal::from_role_string(id.as_str(), roles)))
            .collect()),
        Err(e) => api_error(e),
    }
}

async fn post_set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetRoleReq>,
) -> ApiResult<UserInfo> {
    let admin = match authorize(&state, &headers, &crate::permissions! { "user" => ["update"] }).await {
        Ok(p) => p,
        Err(d) => return api_denial(&d),
    };
    let store = state.store.clone();
    let (user, role) = (req.user_id.clone(), req.role);
    if let Err(e) = blocking(move || store.set_role(&user, &role)).await {
        return api_error(e);
    }
    tracing::info!(by = %admin.id, user = %req.user_id, "role assignment");
    match state.store.principal(&req.user_id) {
        Ok(Some(p)) => ok(UserInfo::from(&p)),
        Ok(None) => api_error(RoleguardError::UnknownUser(req.user_id)),
        Err(e) => api_error(e),
    }
}

async fn dashboard_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    guarded_page(&state, &headers, "dashboard", "Dashboard").await
}

async fn analytics_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    guarded_page(&state, &headers, "analytics", "Analytics").await
}

async fn settings_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    guarded_page(&state, &headers, "settings", "Settings").await
}

async fn unauthorized_page() -> Html<String> {
    Html(page(
        ACCESS_DENIED_NOTICE,
        "<p>You do not have permission to view this page.</p><a href=\"/dashboard\">Back</a>",
    ))
}

async fn signin_page() -> Html<String> {
    Html(page("Sign in", "<p>POST your id and password to /api/auth/signin.</p>"))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/auth/register", post(post_register))
        .route("/api/auth/signin", post(post_signin))
        .route("/api/auth/signout", post(post_signout))
        .route("/api/auth/me", get(get_me))
        // Permission checks
        .route("/api/permissions/check", post(post_check))
        .route("/api/permissions/role", post(post_role_check))
        // Admin
        .route("/api/admin/users", get(get_users))
        .route("/api/admin/set-role", post(post_set_role))
        // Pages
        .route("/dashboard", get(dashboard_page))
        .route("/analytics", get(analytics_page))
        .route("/settings", get(settings_page))
        .route("/unauthorized", get(unauthorized_page))
        .route("/auth/signin", get(signin_page))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind on `config.port` and serve until the listener fails
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "roleguard-server listening");
    axum::serve(listener, router(state)).await
}
