//! Runtime configuration

use serde::{Deserialize, Serialize};

use crate::resolver::UnknownRolePolicy;

pub const DEFAULT_DB_PATH: &str = "./data/roleguard.mdb";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SIGNIN_PATH: &str = "/auth/signin";
pub const DEFAULT_UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    /// Undeclared resource/action pairs fail loudly instead of denying
    pub strict: bool,
    pub unknown_roles: UnknownRolePolicy,
    pub signin_path: String,
    pub unauthorized_path: String,
    /// 0 = sessions never expire
    pub session_ttl_secs: u64,
    pub admin_id: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: DEFAULT_DB_PATH.into(),
            port: DEFAULT_PORT,
            strict: false,
            unknown_roles: UnknownRolePolicy::Deny,
            signin_path: DEFAULT_SIGNIN_PATH.into(),
            unauthorized_path: DEFAULT_UNAUTHORIZED_PATH.into(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            admin_id: None,
            admin_password: None,
        }
    }
}

impl Config {
    /// Read configuration from `ROLEGUARD_*` variables (and `PORT`)
    pub fn from_env() -> Self {
        Config::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values keep the default
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
        let d = Config::default();
        let flag = |v: String| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        Config {
            db_path: get("ROLEGUARD_DB").unwrap_or(d.db_path),
            port: get("PORT").and_then(|v| v.trim().parse().ok()).unwrap_or(d.port),
            strict: get("ROLEGUARD_STRICT").map(flag).unwrap_or(d.strict),
            unknown_roles: get("ROLEGUARD_UNKNOWN_ROLE")
                .and_then(|v| UnknownRolePolicy::parse(&v))
                .unwrap_or(d.unknown_roles),
            signin_path: get("ROLEGUARD_SIGNIN_PATH").unwrap_or(d.signin_path),
            unauthorized_path: get("ROLEGUARD_UNAUTHORIZED_PATH").unwrap_or(d.unauthorized_path),
            session_ttl_secs: get("ROLEGUARD_SESSION_TTL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(d.session_ttl_secs),
            admin_id: get("ROLEGUARD_ADMIN_ID").filter(|v| !v.is_empty()),
            admin_password: get("ROLEGUARD_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        }
    }

    /// Session lifetime as passed to the store (`None` = never expires)
    pub fn session_ttl(&self) -> Option<u64> {
        (self.session_ttl_secs > 0).then_some(self.session_ttl_secs)
    }
}
