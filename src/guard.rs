//! Server-side enforcement
//!
//! Guards run before a protected operation or render. They resolve the
//! current principal, ask the resolver, and either hand the principal back
//! or produce a [`Denial`] naming where the request should be redirected.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{Config, DEFAULT_SIGNIN_PATH, DEFAULT_UNAUTHORIZED_PATH};
use crate::error::{RoleguardError, Result};
use crate::identity::IdentityProvider;
use crate::principal::Principal;
use crate::resolver::{Permissions, Resolver};
use crate::role::Record;

/// Why a guarded request was stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No principal (or the identity provider failed)
    Unauthenticated { location: String },
    /// Principal resolved but lacks the permissions
    Forbidden { location: String },
    /// The guard itself references undeclared permissions (strict mode only)
    Misconfigured { error: RoleguardError },
}

impl Denial {
    /// Redirect target, `None` for a misconfigured guard
    pub fn location(&self) -> Option<&str> {
        match self {
            Denial::Unauthenticated { location } | Denial::Forbidden { location } => Some(location),
            Denial::Misconfigured { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPaths {
    pub signin: String,
    pub unauthorized: String,
}

impl Default for RedirectPaths {
    fn default() -> Self {
        RedirectPaths { signin: DEFAULT_SIGNIN_PATH.into(), unauthorized: DEFAULT_UNAUTHORIZED_PATH.into() }
    }
}

#[derive(Clone)]
pub struct Guard {
    identity: Arc<dyn IdentityProvider>,
    resolver: Resolver,
    paths: RedirectPaths,
}

impl Guard {
    pub fn new(identity: Arc<dyn IdentityProvider>, resolver: Resolver) -> Self {
        Guard { identity, resolver, paths: RedirectPaths::default() }
    }

    pub fn from_config(identity: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Guard {
            identity,
            resolver: Resolver::from_config(config),
            paths: RedirectPaths {
                signin: config.signin_path.clone(),
                unauthorized: config.unauthorized_path.clone(),
            },
        }
    }

    pub fn with_paths(mut self, paths: RedirectPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn paths(&self) -> &RedirectPaths {
        &self.paths
    }

    /// Resolve the current principal; provider failures count as unauthenticated
    pub async fn principal(&self, token: Option<&str>) -> Option<Principal> {
        match self.identity.current_principal(token).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "identity provider failed, treating as unauthenticated");
                None
            }
        }
    }

    /// Require only an authenticated principal
    pub async fn require_auth(&self, token: Option<&str>) -> std::result::Result<Principal, Denial> {
        self.principal(token).await.ok_or_else(|| self.signin())
    }

    /// Require every permission in `permissions`.
    ///
    /// Unauthenticated requests go to sign-in; denied requests go to
    /// `redirect_to` or the unauthorized page.
    pub async fn require_permission(
        &self,
        token: Option<&str>,
        permissions: &Permissions,
        redirect_to: Option<&str>,
    ) -> std::result::Result<Principal, Denial> {
        let principal = self.require_auth(token).await?;
        match self.resolver.check_permission(&principal, permissions) {
            Ok(true) => Ok(principal),
            Ok(false) => Err(self.forbidden(redirect_to)),
            Err(error) => {
                tracing::error!(error = %error, "guard references undeclared permission");
                Err(Denial::Misconfigured { error })
            }
        }
    }

    /// Require membership of a role
    pub async fn require_role(
        &self,
        token: Option<&str>,
        role: &str,
        redirect_to: Option<&str>,
    ) -> std::result::Result<Principal, Denial> {
        let principal = self.require_auth(token).await?;
        if principal.has_role(role) {
            Ok(principal)
        } else {
            tracing::debug!(principal = %principal.id, role, "role required");
            Err(self.forbidden(redirect_to))
        }
    }

    /// Run `render` only when the permissions are held
    pub async fn with_permission<T, F>(
        &self,
        token: Option<&str>,
        permissions: &Permissions,
        redirect_to: Option<&str>,
        render: F,
    ) -> std::result::Result<T, Denial>
    where
        F: FnOnce(Principal) -> T,
    {
        self.require_permission(token, permissions, redirect_to).await.map(render)
    }

    /// Boolean check for a principal id, without redirecting.
    ///
    /// Unknown ids and provider failures yield `false`.
    pub async fn check_permission(&self, principal_id: &str, permissions: &Permissions) -> Result<bool> {
        let principal = match self.identity.principal_by_id(principal_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!(error = %e, principal = principal_id, "principal lookup failed");
                return Ok(false);
            }
        };
        self.resolver.check_permission(&principal, permissions)
    }

    /// Boolean check of one pair for the session's principal
    pub async fn check_permission_with_session(
        &self,
        token: Option<&str>,
        resource: &str,
        action: &str,
        data: Option<&Record>,
    ) -> Result<bool> {
        match self.principal(token).await {
            Some(p) => self.resolver.can(&p, resource, action, data),
            None => Ok(false),
        }
    }

    fn signin(&self) -> Denial {
        Denial::Unauthenticated { location: self.paths.signin.clone() }
    }

    fn forbidden(&self, redirect_to: Option<&str>) -> Denial {
        Denial::Forbidden {
            location: redirect_to.unwrap_or(&self.paths.unauthorized).to_string(),
        }
    }
}
