//! HTTP surface tests, driven through the router without a listener

#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use roleguard::server::{router, AppState, SESSION_COOKIE};
use roleguard::{Config, Store};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    app: Router,
    store: Store,
    admin_token: String,
}

fn setup() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("db")).unwrap();
    store.bootstrap_admin("root", "rootpw").unwrap();
    let admin_token = store.login("root", "rootpw", None).unwrap();
    let app = router(AppState::new(store.clone(), Config::default()));
    Harness { _dir: dir, app, store, admin_token }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, headers, body)
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut b = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut b = Request::get(uri);
    if let Some(t) = token {
        b = b.header(header::COOKIE, format!("{SESSION_COOKIE}={t}"));
    }
    b.body(Body::empty()).unwrap()
}

fn json_of(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

async fn register_and_signin(h: &Harness, id: &str) -> String {
    let (status, _, _) = send(&h.app, post_json("/api/auth/register", None, json!({"id": id, "password": "pw"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, headers, body) =
        send(&h.app, post_json("/api/auth/signin", None, json!({"id": id, "password": "pw"}))).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with(SESSION_COOKIE));
    json_of(&body)["data"]["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_health() {
    let h = setup();
    let (status, _, body) = send(&h.app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["status"], "ok");
}

#[tokio::test]
async fn test_register_signin_me() {
    let h = setup();
    let token = register_and_signin(&h, "alice").await;
    let (status, _, body) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let me = json_of(&body);
    assert_eq!(me["data"]["id"], "alice");
    assert_eq!(me["data"]["roles"], json!(["user"]));
}

#[tokio::test]
async fn test_duplicate_register_conflicts() {
    let h = setup();
    register_and_signin(&h, "alice").await;
    let (status, _, _) =
        send(&h.app, post_json("/api/auth/register", None, json!({"id": "alice", "password": "x"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_underscored_id() {
    let h = setup();
    let (status, _, _) =
        send(&h.app, post_json("/api/auth/register", None, json!({"id": "john_doe", "password": "pw"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.get_user_role("john_doe").unwrap(), None);
}

#[tokio::test]
async fn test_register_failure_leaves_no_user() {
    let h = setup();
    let (status, _, _) =
        send(&h.app, post_json("/api/auth/register", None, json!({"id": "root", "password": "takeover"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(h.store.verify_password("root", "rootpw").unwrap());
    assert!(!h.store.verify_password("root", "takeover").unwrap());
}

#[tokio::test]
async fn test_bad_password_rejected() {
    let h = setup();
    let (status, _, _) =
        send(&h.app, post_json("/api/auth/signin", None, json!({"id": "root", "password": "nope"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_session() {
    let h = setup();
    let (status, _, _) = send(&h.app, get("/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&h.app, get("/api/auth/me", Some("bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signout_revokes_session() {
    let h = setup();
    let token = register_and_signin(&h, "bob").await;
    let (status, _, body) = send(&h.app, post_json("/api/auth/signout", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["data"], true);
    let (status, _, _) = send(&h.app, get("/api/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Permission checks
// ============================================================================

#[tokio::test]
async fn test_permission_check_endpoint() {
    let h = setup();
    let token = register_and_signin(&h, "carol").await;
    let check = |perms: Value| post_json("/api/permissions/check", Some(&token), json!({ "permissions": perms }));

    let (_, _, body) = send(&h.app, check(json!({"projects": ["view"]}))).await;
    assert_eq!(json_of(&body), json!({"success": true}));
    let (_, _, body) = send(&h.app, check(json!({"projects": ["delete"]}))).await;
    assert_eq!(json_of(&body), json!({"success": false}));

    let (status, _, _) =
        send(&h.app, post_json("/api/permissions/check", None, json!({"permissions": {"projects": ["view"]}}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_check_endpoint() {
    let h = setup();
    let token = register_and_signin(&h, "hank").await;
    let req = |token: Option<&str>, role: &str| {
        post_json(
            "/api/permissions/role",
            token,
            json!({"role": role, "permissions": {"orders": ["delete"]}}),
        )
    };
    let (_, _, body) = send(&h.app, req(Some(token.as_str()), "manager")).await;
    assert_eq!(json_of(&body)["success"], false);
    let (_, _, body) = send(&h.app, req(Some(token.as_str()), "admin")).await;
    assert_eq!(json_of(&body)["success"], true);

    let (status, _, body) = send(&h.app, req(None, "admin")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(&body)["success"], false);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_routes_require_permission() {
    let h = setup();
    let token = register_and_signin(&h, "dave").await;

    let (status, _, body) = send(&h.app, get("/api/admin/users", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let text = String::from_utf8(body).unwrap();
    assert!(!text.contains("user"), "denial must not name the permission: {text}");

    let (status, _, _) = send(&h.app, get("/api/admin/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(&h.app, get("/api/admin/users", Some(&h.admin_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_set_role_promotes_user() {
    let h = setup();
    let token = register_and_signin(&h, "erin").await;
    let promote = json!({"user_id": "erin", "role": "user,manager"});

    let (status, _, _) = send(&h.app, post_json("/api/admin/set-role", Some(&token), promote.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = send(&h.app, post_json("/api/admin/set-role", Some(&h.admin_token), promote)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["data"]["roles"], json!(["manager", "user"]));
    assert_eq!(h.store.get_user_role("erin").unwrap().as_deref(), Some("manager,user"));

    let (status, _, _) = send(&h.app, get("/analytics", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_set_role_rejects_unknown() {
    let h = setup();
    let (status, _, _) = send(
        &h.app,
        post_json("/api/admin/set-role", Some(&h.admin_token), json!({"user_id": "ghost", "role": "user"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(
        &h.app,
        post_json("/api/admin/set-role", Some(&h.admin_token), json!({"user_id": "root", "role": "owner"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Pages
// ============================================================================

#[tokio::test]
async fn test_page_redirects_to_signin() {
    let h = setup();
    let (status, headers, _) = send(&h.app, get("/dashboard", None)).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/auth/signin");
}

#[tokio::test]
async fn test_page_redirects_to_unauthorized() {
    let h = setup();
    let token = register_and_signin(&h, "frank").await;
    let (status, headers, _) = send(&h.app, get("/settings", Some(&token))).await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/unauthorized");

    let (status, _, body) = send(&h.app, get("/unauthorized", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Access Denied"));
}

#[tokio::test]
async fn test_dashboard_nav_follows_permissions() {
    let h = setup();
    let token = register_and_signin(&h, "gina").await;
    let (status, _, body) = send(&h.app, get("/dashboard", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("href=\"/dashboard\""));
    assert!(!html.contains("href=\"/analytics\""));
    assert!(!html.contains("/api/admin/users"));

    let (_, _, body) = send(&h.app, get("/dashboard", Some(&h.admin_token))).await;
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("href=\"/settings\""));
    assert!(html.contains("/api/admin/users"));
}
