//! Role definitions
//!
//! A role is a flat table of action masks, one per resource, plus optional
//! conditional grants that only apply when a contextual [`Record`] is
//! supplied and the predicate accepts it. Roles are plain values; composing
//! two roles is a mask union, never inheritance.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RoleguardError, Result};
use crate::ownership;
use crate::statement::{Resource, CREATE, CRUD, EXPORT, UPDATE, VIEW};

/// Contextual data for per-record checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Record { id: id.into(), ..Default::default() }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    /// Build a record whose owner is embedded in its id (`prefix_unique_userId`)
    pub fn from_resource_id(id: &str) -> Self {
        Record {
            id: id.to_string(),
            user_id: ownership::owner_of(id).map(str::to_string),
            author_id: None,
        }
    }

    /// True when the record names `principal_id` as its user or author
    pub fn owned_by(&self, principal_id: &str) -> bool {
        self.user_id.as_deref() == Some(principal_id) || self.author_id.as_deref() == Some(principal_id)
    }
}

/// Predicate evaluated against a contextual record
pub type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[derive(Clone)]
struct Conditional {
    resource: Resource,
    mask: u64,
    predicate: Predicate,
}

/// The built-in roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Admin,
    Manager,
    User,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [RoleName::Admin, RoleName::Manager, RoleName::User];

    pub const fn as_str(self) -> &'static str {
        match self {
            RoleName::Admin => "admin",
            RoleName::Manager => "manager",
            RoleName::User => "user",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the built-in set
    pub fn parse(name: &str) -> Option<RoleName> {
        let name = name.trim();
        RoleName::ALL.into_iter().find(|r| r.as_str().eq_ignore_ascii_case(name))
    }

    /// Build this role's grant table
    pub fn grant(self) -> RoleGrant {
        match self {
            RoleName::Admin => admin(),
            RoleName::Manager => manager(),
            RoleName::User => user(),
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = RoleguardError;

    fn from_str(s: &str) -> Result<Self> {
        RoleName::parse(s).ok_or_else(|| RoleguardError::UnknownRole(s.trim().to_string()))
    }
}

/// Grants held by one role, for one principal
#[derive(Clone)]
pub struct RoleGrant {
    name: String,
    masks: [u64; Resource::COUNT],
    conditions: Vec<Conditional>,
}

impl RoleGrant {
    /// A role that grants nothing
    pub fn none(name: impl Into<String>) -> Self {
        RoleGrant { name: name.into(), masks: [0; Resource::COUNT], conditions: Vec::new() }
    }

    pub fn builder(name: impl Into<String>) -> RoleBuilder {
        RoleBuilder { grant: RoleGrant::none(name), undeclared: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unconditional action mask for a resource
    #[inline]
    pub fn mask(&self, resource: Resource) -> u64 {
        self.masks[resource.index()]
    }

    /// Whether this role permits every bit of `action` on `resource`.
    ///
    /// Bits not covered by the static table fall through to conditional
    /// grants, which only match when `data` is present.
    pub fn grants(&self, resource: Resource, action: u64, data: Option<&Record>) -> bool {
        if action == 0 || !resource.declares(action) {
            return false;
        }
        let missing = action & !self.mask(resource);
        if missing == 0 {
            return true;
        }
        let Some(record) = data else { return false };
        let conditional = self
            .conditions
            .iter()
            .filter(|c| c.resource == resource && (c.predicate)(record))
            .fold(0, |acc, c| acc | c.mask);
        (conditional & missing) == missing
    }

    /// Union of two roles' grants
    pub fn union(mut self, other: &RoleGrant) -> RoleGrant {
        for (mine, theirs) in self.masks.iter_mut().zip(other.masks.iter()) {
            *mine |= *theirs;
        }
        self.conditions.extend(other.conditions.iter().cloned());
        self
    }
}

impl fmt::Debug for RoleGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for r in Resource::ALL {
            if self.mask(r) != 0 {
                m.entry(&r.as_str(), &crate::statement::actions_to_names(self.mask(r)));
            }
        }
        m.finish()?;
        write!(f, " ({} conditional, role {})", self.conditions.len(), self.name)
    }
}

/// Builder that refuses undeclared resource/action pairs
pub struct RoleBuilder {
    grant: RoleGrant,
    undeclared: Option<(Resource, u64)>,
}

impl RoleBuilder {
    pub fn allow(mut self, resource: Resource, mask: u64) -> Self {
        if !resource.declares(mask) {
            self.undeclared.get_or_insert((resource, mask));
            return self;
        }
        self.grant.masks[resource.index()] |= mask;
        self
    }

    /// Grant `mask` on `resource` only when the predicate accepts the record
    pub fn allow_if<F>(mut self, resource: Resource, mask: u64, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        if !resource.declares(mask) {
            self.undeclared.get_or_insert((resource, mask));
            return self;
        }
        self.grant.conditions.push(Conditional { resource, mask, predicate: Arc::new(predicate) });
        self
    }

    pub fn build(self) -> Result<RoleGrant> {
        match self.undeclared {
            Some((r, mask)) => Err(RoleguardError::config(
                r.as_str(),
                crate::statement::actions_to_names(mask & !r.actions()).join("|"),
            )),
            None => Ok(self.grant),
        }
    }

    // Built-in tables are checked by tests; an undeclared pair there is a bug.
    fn built_in(self) -> RoleGrant {
        debug_assert!(self.undeclared.is_none(), "built-in role references undeclared pair");
        self.grant
    }
}

/// Build the grant table for a role name.
///
/// Returns `None` for names outside the built-in set; the resolver decides
/// what an unknown role is worth. Built-in tables are static; per-record
/// rules are composed with [`RoleBuilder::allow_if`] and [`RoleGrant::union`].
pub fn build_role(name: &str) -> Option<RoleGrant> {
    RoleName::parse(name).map(RoleName::grant)
}

fn admin() -> RoleGrant {
    Resource::ALL
        .into_iter()
        .fold(RoleGrant::builder("admin"), |b, r| b.allow(r, r.actions()))
        .built_in()
}

fn manager() -> RoleGrant {
    RoleGrant::builder("manager")
        .allow(Resource::Dashboard, VIEW)
        .allow(Resource::Analytics, VIEW | EXPORT)
        .allow(Resource::Projects, CRUD)
        .allow(Resource::Products, CRUD)
        .allow(Resource::Orders, CREATE | VIEW | UPDATE)
        .allow(Resource::Invoices, CREATE | VIEW | UPDATE)
        .allow(Resource::Settings, VIEW)
        .built_in()
}

fn user() -> RoleGrant {
    RoleGrant::builder("user")
        .allow(Resource::Dashboard, VIEW)
        .allow(Resource::Projects, VIEW)
        .allow(Resource::Products, VIEW)
        .allow(Resource::Orders, VIEW)
        .allow(Resource::Invoices, VIEW)
        .built_in()
}
