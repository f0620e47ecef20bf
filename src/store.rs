//! LMDB-backed identity store: users, role assignments, credentials, sessions
//!
//! Storage patterns:
//! - `users`: user id → comma-separated role names
//! - `credentials`: user id → argon2 PHC string
//! - `sessions`: sha256(token) → `user|created_at|expires_at`
//! - `sessions_by_user`: `user/sha256(token)` → expires_at
//! - `meta`: `boot` → bootstrap admin id

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use byteorder::BigEndian;
use heed::types::{Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use password_hash::{PasswordHash, SaltString};
use sha2::{Digest, Sha256};

use crate::error::{err, RoleguardError, Result};
use crate::identity::IdentityProvider;
use crate::principal::{join_roles, Principal};
use crate::role::RoleName;

type DbStr = Database<Str, Str>;
type DbExpiry = Database<Str, U64<BigEndian>>;

#[derive(Clone, Copy)]
struct Dbs {
    users: DbStr,
    credentials: DbStr,
    sessions: DbStr,
    sessions_by_user: DbExpiry,
    meta: DbStr,
}

/// Session info returned by list_sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    pub created_at: u64,
    pub expires_at: u64, // 0 = never
}

/// Handle to an opened store; cheap to clone
#[derive(Clone)]
pub struct Store {
    env: Env,
    dbs: Dbs,
}

impl Store {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 30)
                .max_dbs(5)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            users: env.create_database(&mut tx, Some("users")).map_err(err)?,
            credentials: env.create_database(&mut tx, Some("credentials")).map_err(err)?,
            sessions: env.create_database(&mut tx, Some("sessions")).map_err(err)?,
            sessions_by_user: env.create_database(&mut tx, Some("sessions_by_user")).map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(Store { env, dbs })
    }

    fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let tx = self.env.read_txn().map_err(err)?;
        f(&self.dbs, &tx)
    }

    fn write<T, F: FnOnce(&Dbs, &mut RwTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = self.env.write_txn().map_err(err)?;
        let r = f(&self.dbs, &mut tx)?;
        tx.commit().map_err(err)?;
        Ok(r)
    }

    /// Clear all databases (for testing)
    pub fn clear_all(&self) -> Result<()> {
        self.write(|d, tx| {
            d.users.clear(tx).map_err(err)?;
            d.credentials.clear(tx).map_err(err)?;
            d.sessions.clear(tx).map_err(err)?;
            d.sessions_by_user.clear(tx).map_err(err)?;
            d.meta.clear(tx).map_err(err)
        })
    }

    // ========================================================================
    // Users and roles
    // ========================================================================

    /// Create a user holding `roles` (comma-separated built-in role names)
    pub fn create_user(&self, id: &str, roles: &str) -> Result<()> {
        check_id(id)?;
        let roles = normalize_roles(roles)?;
        self.write(|d, tx| {
            if d.users.get(tx, id).map_err(err)?.is_some() {
                return Err(RoleguardError::UserExists(id.to_string()));
            }
            d.users.put(tx, id, &roles).map_err(err)
        })
    }

    /// The stored role string, `None` for an unknown user
    pub fn get_user_role(&self, id: &str) -> Result<Option<String>> {
        self.read(|d, tx| Ok(d.users.get(tx, id).map_err(err)?.map(str::to_string)))
    }

    /// Replace a user's roles
    pub fn set_role(&self, id: &str, roles: &str) -> Result<()> {
        let roles = normalize_roles(roles)?;
        self.write(|d, tx| {
            if d.users.get(tx, id).map_err(err)?.is_none() {
                return Err(RoleguardError::UnknownUser(id.to_string()));
            }
            d.users.put(tx, id, &roles).map_err(err)
        })?;
        tracing::info!(user = id, roles = %roles, "roles updated");
        Ok(())
    }

    /// Remove a user together with its credentials and sessions
    pub fn remove_user(&self, id: &str) -> Result<bool> {
        self.write(|d, tx| {
            let existed = d.users.delete(tx, id).map_err(err)?;
            d.credentials.delete(tx, id).map_err(err)?;
            drop_sessions(d, tx, id)?;
            Ok(existed)
        })
    }

    /// All users with their role strings
    pub fn list_users(&self) -> Result<Vec<(String, String)>> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.users.iter(tx).map_err(err)? {
                let (id, roles) = item.map_err(err)?;
                r.push((id.to_string(), roles.to_string()));
            }
            Ok(r)
        })
    }

    pub fn principal(&self, id: &str) -> Result<Option<Principal>> {
        Ok(self.get_user_role(id)?.map(|roles| Principal::from_role_string(id, &roles)))
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Set password for a user
    pub fn set_password(&self, id: &str, password: &str) -> Result<()> {
        let phc = hash_password(password)?;
        self.write(|d, tx| {
            if d.users.get(tx, id).map_err(err)?.is_none() {
                return Err(RoleguardError::UnknownUser(id.to_string()));
            }
            d.credentials.put(tx, id, &phc).map_err(err)
        })
    }

    /// Create a `user` account with a password in one transaction
    pub fn register(&self, id: &str, password: &str) -> Result<()> {
        check_id(id)?;
        let phc = hash_password(password)?;
        self.write(|d, tx| {
            if d.users.get(tx, id).map_err(err)?.is_some() {
                return Err(RoleguardError::UserExists(id.to_string()));
            }
            d.users.put(tx, id, RoleName::User.as_str()).map_err(err)?;
            d.credentials.put(tx, id, &phc).map_err(err)
        })?;
        tracing::info!(user = id, "registered");
        Ok(())
    }

    /// Verify password for a user; unknown users simply fail
    pub fn verify_password(&self, id: &str, password: &str) -> Result<bool> {
        let stored = self.read(|d, tx| Ok(d.credentials.get(tx, id).map_err(err)?.map(str::to_string)))?;
        match stored {
            Some(phc) => verify_password(&phc, password),
            None => Ok(false),
        }
    }

    /// Login with password, returns token
    pub fn login(&self, id: &str, password: &str, ttl_secs: Option<u64>) -> Result<String> {
        if !self.verify_password(id, password)? {
            return Err(RoleguardError::InvalidCredentials);
        }
        self.create_session(id, ttl_secs)
    }

    /// Seed the first admin. Fails once any admin has been bootstrapped
    /// and never takes over an existing account. Sign in to get a session.
    pub fn bootstrap_admin(&self, id: &str, password: &str) -> Result<()> {
        check_id(id)?;
        let phc = hash_password(password)?;
        self.write(|d, tx| {
            if d.meta.get(tx, "boot").map_err(err)?.is_some() {
                return Err(RoleguardError::AlreadyBootstrapped);
            }
            if d.users.get(tx, id).map_err(err)?.is_some() {
                return Err(RoleguardError::UserExists(id.to_string()));
            }
            d.users.put(tx, id, RoleName::Admin.as_str()).map_err(err)?;
            d.credentials.put(tx, id, &phc).map_err(err)?;
            d.meta.put(tx, "boot", id).map_err(err)
        })?;
        tracing::info!(admin = id, "bootstrapped");
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> Result<bool> {
        self.read(|d, tx| Ok(d.meta.get(tx, "boot").map_err(err)?.is_some()))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Create a session, returns token
    pub fn create_session(&self, user_id: &str, ttl_secs: Option<u64>) -> Result<String> {
        let token = generate_token()?;
        let hash = hash_token(&token);
        let now = current_epoch();
        let expires = ttl_secs.map(|t| now.saturating_add(t.saturating_mul(1000))).unwrap_or(0);
        self.write(|d, tx| {
            if d.users.get(tx, user_id).map_err(err)?.is_none() {
                return Err(RoleguardError::UnknownUser(user_id.to_string()));
            }
            put_session(d, tx, &hash, user_id, now, expires)
        })?;
        Ok(token)
    }

    /// Validate token, returns user id if valid
    pub fn validate_session(&self, token: &str) -> Result<String> {
        let hash = hash_token(token);
        self.read(|d, tx| {
            let value = d.sessions.get(tx, &hash).map_err(err)?.ok_or(RoleguardError::InvalidToken)?;
            let (user, _, expires) = parse_session(value)?;
            // 0 = never expires
            if expires > 0 && expires < current_epoch() {
                return Err(RoleguardError::TokenExpired);
            }
            Ok(user.to_string())
        })
    }

    /// Revoke a session by token
    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        let hash = hash_token(token);
        self.write(|d, tx| {
            let user = match d.sessions.get(tx, &hash).map_err(err)? {
                Some(v) => parse_session(v)?.0.to_string(),
                None => return Ok(false),
            };
            d.sessions.delete(tx, &hash).map_err(err)?;
            d.sessions_by_user.delete(tx, &index_key(&user, &hash)).map_err(err)?;
            Ok(true)
        })
    }

    /// List live sessions for a user
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionInfo>> {
        let prefix = format!("{}/", user_id);
        let now = current_epoch();
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.sessions_by_user.prefix_iter(tx, prefix.as_str()).map_err(err)? {
                let (key, _) = item.map_err(err)?;
                let hash = &key[prefix.len()..];
                if let Some(value) = d.sessions.get(tx, hash).map_err(err)? {
                    let (user, created_at, expires_at) = parse_session(value)?;
                    if expires_at == 0 || expires_at >= now {
                        r.push(SessionInfo { user_id: user.to_string(), created_at, expires_at });
                    }
                }
            }
            Ok(r)
        })
    }

    /// Revoke all sessions for a user
    pub fn revoke_all_sessions(&self, user_id: &str) -> Result<u64> {
        self.write(|d, tx| drop_sessions(d, tx, user_id))
    }
}

#[async_trait]
impl IdentityProvider for Store {
    async fn current_principal(&self, token: Option<&str>) -> Result<Option<Principal>> {
        let Some(token) = token else { return Ok(None) };
        match self.validate_session(token) {
            Ok(user) => self.principal(&user),
            Err(RoleguardError::InvalidToken | RoleguardError::TokenExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn principal_by_id(&self, id: &str) -> Result<Option<Principal>> {
        self.principal(id)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn check_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(|c| matches!(c, '/' | ',' | '|' | '_')) {
        return Err(RoleguardError::InvalidId(id.to_string()));
    }
    Ok(())
}

// Only built-in role names may be assigned
fn normalize_roles(roles: &str) -> Result<String> {
    let set = Principal::parse_roles(roles);
    if let Some(bad) = set.iter().find(|r| RoleName::parse(r).is_none()) {
        return Err(RoleguardError::UnknownRole(bad.clone()));
    }
    Ok(join_roles(&set))
}

fn index_key(user: &str, hash: &str) -> String {
    format!("{}/{}", user, hash)
}

fn put_session(d: &Dbs, tx: &mut RwTxn, hash: &str, user: &str, now: u64, expires: u64) -> Result<()> {
    let value = format!("{}|{}|{}", user, now, expires);
    d.sessions.put(tx, hash, &value).map_err(err)?;
    d.sessions_by_user.put(tx, &index_key(user, hash), &expires).map_err(err)
}

fn drop_sessions(d: &Dbs, tx: &mut RwTxn, user: &str) -> Result<u64> {
    let prefix = format!("{}/", user);
    let mut hashes = Vec::new();
    for item in d.sessions_by_user.prefix_iter(tx, prefix.as_str()).map_err(err)? {
        let (key, _) = item.map_err(err)?;
        hashes.push(key[prefix.len()..].to_string());
    }
    for hash in &hashes {
        d.sessions.delete(tx, hash).map_err(err)?;
        d.sessions_by_user.delete(tx, &index_key(user, hash)).map_err(err)?;
    }
    Ok(hashes.len() as u64)
}

fn parse_session(value: &str) -> Result<(&str, u64, u64)> {
    let mut parts = value.split('|');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(created), Some(expires), None) => Ok((
            user,
            created.parse().map_err(|_| RoleguardError::Corrupted("session"))?,
            expires.parse().map_err(|_| RoleguardError::Corrupted("session"))?,
        )),
        _ => Err(RoleguardError::Corrupted("session")),
    }
}

fn current_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a cryptographically secure token (32 bytes, base64url encoded)
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).map_err(|e| RoleguardError::Storage(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash token with SHA-256 for storage
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| RoleguardError::Storage(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| RoleguardError::Storage(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| RoleguardError::Storage(e.to_string()))
}

fn verify_password(phc: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc).map_err(|_| RoleguardError::Corrupted("credentials"))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}
