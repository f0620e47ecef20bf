//! Identity store tests: users, roles, credentials, sessions

use roleguard::store::generate_token;
use roleguard::{IdentityProvider, RoleguardError, Store};
use tempfile::TempDir;

fn setup() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("roleguard.mdb")).unwrap();
    (dir, store)
}

// ============================================================================
// Token Generation
// ============================================================================

#[test]
fn test_generate_token_is_random() {
    let t1 = generate_token().unwrap();
    let t2 = generate_token().unwrap();
    assert_ne!(t1, t2);
    assert_eq!(t1.len(), 43);
}

#[test]
fn test_token_is_url_safe() {
    let token = generate_token().unwrap();
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

// ============================================================================
// Users and roles
// ============================================================================

#[test]
fn test_create_user_and_read_role() {
    let (_d, store) = setup();
    store.create_user("u1", "User").unwrap();
    assert_eq!(store.get_user_role("u1").unwrap().as_deref(), Some("user"));
    assert_eq!(store.get_user_role("nobody").unwrap(), None);
}

#[test]
fn test_duplicate_user_rejected() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    assert!(matches!(store.create_user("u1", "admin"), Err(RoleguardError::UserExists(_))));
    assert_eq!(store.get_user_role("u1").unwrap().as_deref(), Some("user"));
}

#[test]
fn test_invalid_ids_rejected() {
    let (_d, store) = setup();
    for id in ["", "a/b", "a,b", "a|b", "john_doe"] {
        assert!(matches!(store.create_user(id, "user"), Err(RoleguardError::InvalidId(_))), "{id:?}");
        assert!(matches!(store.register(id, "pw"), Err(RoleguardError::InvalidId(_))), "{id:?}");
    }
    assert!(store.list_users().unwrap().is_empty());
}

#[test]
fn test_unknown_role_names_rejected() {
    let (_d, store) = setup();
    assert!(matches!(store.create_user("u1", "user,root"), Err(RoleguardError::UnknownRole(_))));
    assert_eq!(store.get_user_role("u1").unwrap(), None);
}

#[test]
fn test_set_role_replaces_roles() {
    let (_d, store) = setup();
    store.create_user("u4", "user").unwrap();
    store.set_role("u4", "manager, user").unwrap();
    let p = store.principal("u4").unwrap().unwrap();
    assert!(p.has_role("manager"));
    assert!(p.has_role("user"));
    assert!(matches!(store.set_role("ghost", "admin"), Err(RoleguardError::UnknownUser(_))));
}

#[test]
fn test_list_and_remove_users() {
    let (_d, store) = setup();
    store.create_user("a", "admin").unwrap();
    store.create_user("b", "user").unwrap();
    let users = store.list_users().unwrap();
    assert_eq!(users, vec![("a".to_string(), "admin".to_string()), ("b".to_string(), "user".to_string())]);

    let token = store.create_session("b", None).unwrap();
    assert!(store.remove_user("b").unwrap());
    assert!(!store.remove_user("b").unwrap());
    assert!(store.validate_session(&token).is_err());
    assert_eq!(store.list_users().unwrap().len(), 1);
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
fn test_password_roundtrip() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    store.set_password("u1", "hunter2").unwrap();
    assert!(store.verify_password("u1", "hunter2").unwrap());
    assert!(!store.verify_password("u1", "hunter3").unwrap());
    assert!(!store.verify_password("ghost", "hunter2").unwrap());
}

#[test]
fn test_change_password() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    store.set_password("u1", "old").unwrap();
    store.set_password("u1", "new").unwrap();
    assert!(!store.verify_password("u1", "old").unwrap());
    assert!(store.verify_password("u1", "new").unwrap());
}

#[test]
fn test_login_without_password_fails() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    assert!(matches!(store.login("u1", "", None), Err(RoleguardError::InvalidCredentials)));
    assert!(matches!(store.login("ghost", "pw", None), Err(RoleguardError::InvalidCredentials)));
}

#[test]
fn test_unicode_password() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    store.set_password("u1", "пароль🔑").unwrap();
    assert!(store.verify_password("u1", "пароль🔑").unwrap());
    assert!(!store.verify_password("u1", "пароль").unwrap());
}

#[test]
fn test_set_password_unknown_user() {
    let (_d, store) = setup();
    assert!(matches!(store.set_password("ghost", "pw"), Err(RoleguardError::UnknownUser(_))));
}

#[test]
fn test_login_issues_session() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    store.set_password("u1", "pw").unwrap();
    let token = store.login("u1", "pw", Some(3600)).unwrap();
    assert_eq!(store.validate_session(&token).unwrap(), "u1");
    assert!(matches!(store.login("u1", "wrong", None), Err(RoleguardError::InvalidCredentials)));
}

#[test]
fn test_register_creates_user_with_password() {
    let (_d, store) = setup();
    store.register("u1", "pw").unwrap();
    assert_eq!(store.get_user_role("u1").unwrap().as_deref(), Some("user"));
    assert!(store.verify_password("u1", "pw").unwrap());
}

#[test]
fn test_register_existing_user_keeps_credentials() {
    let (_d, store) = setup();
    store.register("u1", "first").unwrap();
    assert!(matches!(store.register("u1", "second"), Err(RoleguardError::UserExists(_))));
    assert!(store.verify_password("u1", "first").unwrap());
    assert!(!store.verify_password("u1", "second").unwrap());
}

#[test]
fn test_bootstrap_admin_once() {
    let (_d, store) = setup();
    assert!(!store.is_bootstrapped().unwrap());
    store.bootstrap_admin("root", "pw").unwrap();
    assert!(store.is_bootstrapped().unwrap());
    assert!(store.list_sessions("root").unwrap().is_empty());
    assert!(store.principal("root").unwrap().unwrap().is_admin());
    assert!(store.verify_password("root", "pw").unwrap());
    assert!(matches!(store.bootstrap_admin("other", "pw"), Err(RoleguardError::AlreadyBootstrapped)));
    assert_eq!(store.get_user_role("other").unwrap(), None);
}

#[test]
fn test_bootstrap_refuses_existing_user() {
    let (_d, store) = setup();
    store.register("alice", "alicepw").unwrap();
    assert!(matches!(store.bootstrap_admin("alice", "pw"), Err(RoleguardError::UserExists(_))));
    assert_eq!(store.get_user_role("alice").unwrap().as_deref(), Some("user"));
    assert!(store.verify_password("alice", "alicepw").unwrap());
    assert!(!store.is_bootstrapped().unwrap());
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_create_and_validate_session() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    let token = store.create_session("u1", None).unwrap();
    assert_eq!(store.validate_session(&token).unwrap(), "u1");
}

#[test]
fn test_session_for_unknown_user_rejected() {
    let (_d, store) = setup();
    assert!(matches!(store.create_session("ghost", None), Err(RoleguardError::UnknownUser(_))));
}

#[test]
fn test_invalid_token_fails() {
    let (_d, store) = setup();
    assert!(matches!(store.validate_session("invalid-token-here"), Err(RoleguardError::InvalidToken)));
}

#[test]
fn test_expired_session_rejected() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    let token = store.create_session("u1", Some(0)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert!(matches!(store.validate_session(&token), Err(RoleguardError::TokenExpired)));
    assert!(store.list_sessions("u1").unwrap().is_empty());
}

#[test]
fn test_huge_ttl_saturates() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    for ttl in [u64::MAX / 100, u64::MAX] {
        let token = store.create_session("u1", Some(ttl)).unwrap();
        assert_eq!(store.validate_session(&token).unwrap(), "u1");
    }
    assert!(store.list_sessions("u1").unwrap().iter().all(|s| s.expires_at == u64::MAX));
}

#[test]
fn test_revoke_session() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    let token = store.create_session("u1", None).unwrap();
    assert!(store.revoke_session(&token).unwrap());
    assert!(!store.revoke_session(&token).unwrap());
    assert!(store.validate_session(&token).is_err());
}

#[test]
fn test_list_and_revoke_all_sessions() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    store.create_user("u10", "user").unwrap();
    let t1 = store.create_session("u1", None).unwrap();
    let t2 = store.create_session("u1", Some(3600)).unwrap();
    let other = store.create_session("u10", None).unwrap();

    let sessions = store.list_sessions("u1").unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.user_id == "u1"));
    assert_eq!(sessions.iter().filter(|s| s.expires_at == 0).count(), 1);

    assert_eq!(store.revoke_all_sessions("u1").unwrap(), 2);
    assert!(store.validate_session(&t1).is_err());
    assert!(store.validate_session(&t2).is_err());
    assert_eq!(store.validate_session(&other).unwrap(), "u10");
}

#[test]
fn test_store_reopens_with_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    let token = {
        let store = Store::open(&path).unwrap();
        store.create_user("u1", "manager").unwrap();
        store.create_session("u1", None).unwrap()
    };
    let store = Store::open(&path).unwrap();
    assert_eq!(store.validate_session(&token).unwrap(), "u1");
}

// ============================================================================
// Identity provider
// ============================================================================

#[tokio::test]
async fn test_store_resolves_principal_from_token() {
    let (_d, store) = setup();
    store.create_user("u4", "user,manager").unwrap();
    let token = store.create_session("u4", None).unwrap();

    let p = store.current_principal(Some(token.as_str())).await.unwrap().unwrap();
    assert_eq!(p.id, "u4");
    assert!(p.has_role("manager"));

    assert!(store.current_principal(None).await.unwrap().is_none());
    assert!(store.current_principal(Some("bogus")).await.unwrap().is_none());
    assert!(store.principal_by_id("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_role_change_visible_to_next_lookup() {
    let (_d, store) = setup();
    store.create_user("u1", "user").unwrap();
    let token = store.create_session("u1", None).unwrap();
    assert!(!store.current_principal(Some(token.as_str())).await.unwrap().unwrap().is_admin());
    store.set_role("u1", "admin").unwrap();
    assert!(store.current_principal(Some(token.as_str())).await.unwrap().unwrap().is_admin());
}
