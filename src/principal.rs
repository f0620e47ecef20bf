//! Authenticated principals and their role sets

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::role::RoleName;

/// An authenticated actor: an id and the set of role names it holds.
///
/// Role names are always trimmed and lowercased, including on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPrincipal")]
pub struct Principal {
    pub id: String,
    roles: BTreeSet<String>,
}

#[derive(Deserialize)]
struct RawPrincipal {
    id: String,
    #[serde(default)]
    roles: Vec<String>,
}

impl From<RawPrincipal> for Principal {
    fn from(raw: RawPrincipal) -> Self {
        Principal::new(raw.id, raw.roles)
    }
}

impl Principal {
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Principal {
            id: id.into(),
            roles: roles.into_iter().filter_map(|r| normalize(r.as_ref())).collect(),
        }
    }

    /// Build from the stored comma-separated form, e.g. `"user, manager"`
    pub fn from_role_string(id: impl Into<String>, roles: &str) -> Self {
        Principal::new(id, roles.split(','))
    }

    /// Parse a comma-separated role string into a normalized set
    pub fn parse_roles(roles: &str) -> BTreeSet<String> {
        roles.split(',').filter_map(normalize).collect()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    pub fn has_role(&self, role: &str) -> bool {
        normalize(role).map(|r| self.roles.contains(&r)).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(RoleName::Admin.as_str())
    }

    /// Comma-separated form for storage
    pub fn role_string(&self) -> String {
        join_roles(&self.roles)
    }
}

pub(crate) fn join_roles(roles: &BTreeSet<String>) -> String {
    roles.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn normalize(role: &str) -> Option<String> {
    let r = role.trim();
    (!r.is_empty()).then(|| r.to_ascii_lowercase())
}
