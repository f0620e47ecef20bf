//! Identity/session provider contract

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::principal::Principal;

/// Supplies the authenticated principal for a request.
///
/// `Ok(None)` means unauthenticated. `Err` means the provider itself failed;
/// enforcement points treat that as unauthenticated too.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the principal behind a session token
    async fn current_principal(&self, token: Option<&str>) -> Result<Option<Principal>>;

    /// Look up a principal by id, without a session
    async fn principal_by_id(&self, id: &str) -> Result<Option<Principal>>;
}

/// Fixed token → principal table, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    sessions: HashMap<String, Principal>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        StaticIdentity::default()
    }

    pub fn with_session(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.sessions.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_principal(&self, token: Option<&str>) -> Result<Option<Principal>> {
        Ok(token.and_then(|t| self.sessions.get(t)).cloned())
    }

    async fn principal_by_id(&self, id: &str) -> Result<Option<Principal>> {
        Ok(self.sessions.values().find(|p| p.id == id).cloned())
    }
}
