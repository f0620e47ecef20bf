//! Permission resolver
//!
//! A check passes when every requested `(resource, action)` pair is granted
//! by at least one role the principal holds. Each call builds the role
//! tables for the principal it is given; nothing is cached across calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{RoleguardError, Result};
use crate::principal::Principal;
use crate::role::{build_role, Record, RoleGrant, RoleName};
use crate::statement::{parse_pair, Resource};

/// Required permissions keyed by resource name,
/// e.g. `{ "projects": ["create", "view"] }`
pub type Permissions = BTreeMap<String, Vec<String>>;

/// Build a [`Permissions`] map inline.
///
/// ```
/// let p = roleguard::permissions! { "projects" => ["create", "view"], "orders" => ["view"] };
/// assert_eq!(p["projects"].len(), 2);
/// ```
#[macro_export]
macro_rules! permissions {
    ($($resource:expr => [$($action:expr),* $(,)?]),* $(,)?) => {{
        let mut map = $crate::Permissions::new();
        $(
            map.entry(::std::string::String::from($resource))
                .or_insert_with(::std::vec::Vec::new)
                .extend([$(::std::string::String::from($action)),*]);
        )*
        map
    }};
}

/// What a role name outside the built-in set is worth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownRolePolicy {
    /// Contributes no grants
    #[default]
    Deny,
    /// Treated as the most restrictive built-in role
    User,
}

impl UnknownRolePolicy {
    pub fn parse(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "deny" | "none" => Some(UnknownRolePolicy::Deny),
            "user" => Some(UnknownRolePolicy::User),
            _ => None,
        }
    }
}

/// One typed `(resource, action)` requirement with optional record context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub resource: Resource,
    pub action: u64,
    pub data: Option<Record>,
}

impl Requirement {
    /// Parse a string pair; undeclared pairs are a configuration error
    pub fn parse(resource: &str, action: &str) -> Result<Self> {
        let (resource, action) = parse_pair(resource, action)?;
        Ok(Requirement { resource, action, data: None })
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(data);
        self
    }

    /// Flatten a permissions map into requirements
    pub fn from_permissions(permissions: &Permissions) -> Result<Vec<Requirement>> {
        permissions
            .iter()
            .flat_map(|(r, actions)| actions.iter().map(move |a| Requirement::parse(r, a)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolver {
    unknown_roles: UnknownRolePolicy,
    strict: bool,
}

impl Resolver {
    pub fn new(unknown_roles: UnknownRolePolicy, strict: bool) -> Self {
        Resolver { unknown_roles, strict }
    }

    pub fn from_config(config: &Config) -> Self {
        Resolver::new(config.unknown_roles, config.strict)
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Build one grant table per role the principal holds
    pub fn grants_for(&self, principal: &Principal) -> Vec<RoleGrant> {
        principal.roles().filter_map(|name| self.grant_for(name)).collect()
    }

    fn grant_for(&self, name: &str) -> Option<RoleGrant> {
        build_role(name).or_else(|| match self.unknown_roles {
            UnknownRolePolicy::Deny => None,
            UnknownRolePolicy::User => Some(RoleName::User.grant()),
        })
    }

    /// Check a permissions map for a principal.
    ///
    /// An undeclared pair is `Err` in strict mode and a logged denial
    /// otherwise. An empty map is vacuously allowed.
    pub fn check_permission(&self, principal: &Principal, permissions: &Permissions) -> Result<bool> {
        let Some(reqs) = self.requirements(permissions)? else { return Ok(false) };
        Ok(self.check_requirements(principal, &reqs))
    }

    /// Check a bare role without a user context
    pub fn check_role_permission(&self, role: &str, permissions: &Permissions) -> Result<bool> {
        let Some(reqs) = self.requirements(permissions)? else { return Ok(false) };
        let grants: Vec<_> = Principal::parse_roles(role)
            .iter()
            .filter_map(|name| self.grant_for(name))
            .collect();
        Ok(all_granted(&grants, &reqs))
    }

    /// AND across requirements, OR across the principal's roles
    pub fn check_requirements(&self, principal: &Principal, reqs: &[Requirement]) -> bool {
        if reqs.is_empty() {
            return true;
        }
        let allowed = all_granted(&self.grants_for(principal), reqs);
        if !allowed {
            tracing::debug!(principal = %principal.id, "permission denied");
        }
        allowed
    }

    /// Single-pair check by name
    pub fn can(&self, principal: &Principal, resource: &str, action: &str, data: Option<&Record>) -> Result<bool> {
        let Some(mut req) = self.requirements_for(resource, action)? else { return Ok(false) };
        req.data = data.cloned();
        Ok(self.check_requirements(principal, std::slice::from_ref(&req)))
    }

    fn requirements(&self, permissions: &Permissions) -> Result<Option<Vec<Requirement>>> {
        self.tolerate(Requirement::from_permissions(permissions))
    }

    fn requirements_for(&self, resource: &str, action: &str) -> Result<Option<Requirement>> {
        self.tolerate(Requirement::parse(resource, action))
    }

    // Strict: propagate config errors. Lenient: log and deny.
    fn tolerate<T>(&self, parsed: Result<T>) -> Result<Option<T>> {
        match parsed {
            Ok(v) => Ok(Some(v)),
            Err(e @ RoleguardError::Config { .. }) if !self.strict => {
                tracing::error!(error = %e, "permission check against undeclared pair");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn all_granted(grants: &[RoleGrant], reqs: &[Requirement]) -> bool {
    reqs.iter().all(|req| any_granted(grants, req.resource, req.action, req.data.as_ref()))
}

pub(crate) fn any_granted(grants: &[RoleGrant], resource: Resource, action: u64, data: Option<&Record>) -> bool {
    grants.iter().any(|g| g.grants(resource, action, data))
}
