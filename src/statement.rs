//! Permission statement: the closed resource → action universe
//!
//! Actions are bits in a `u64` mask. Each resource declares the subset of
//! action bits it accepts; nothing outside that subset can be granted or
//! checked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RoleguardError, Result};

// Action bits
pub const CREATE: u64 = 1;
pub const VIEW: u64 = 1 << 1;
pub const UPDATE: u64 = 1 << 2;
pub const DELETE: u64 = 1 << 3;
pub const EXPORT: u64 = 1 << 4;

pub const CRUD: u64 = CREATE | VIEW | UPDATE | DELETE;

const ACTIONS: &[(&str, u64)] = &[
    ("create", CREATE),
    ("view", VIEW),
    ("update", UPDATE),
    ("delete", DELETE),
    ("export", EXPORT),
];

/// A domain area subject to access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Dashboard,
    Analytics,
    Projects,
    Products,
    Orders,
    Invoices,
    Settings,
    User,
    Session,
}

impl Resource {
    pub const COUNT: usize = 9;

    pub const ALL: [Resource; Resource::COUNT] = [
        Resource::Dashboard,
        Resource::Analytics,
        Resource::Projects,
        Resource::Products,
        Resource::Orders,
        Resource::Invoices,
        Resource::Settings,
        Resource::User,
        Resource::Session,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Resource::Dashboard => "dashboard",
            Resource::Analytics => "analytics",
            Resource::Projects => "projects",
            Resource::Products => "products",
            Resource::Orders => "orders",
            Resource::Invoices => "invoices",
            Resource::Settings => "settings",
            Resource::User => "user",
            Resource::Session => "session",
        }
    }

    /// Mask of every action this resource declares
    pub const fn actions(self) -> u64 {
        match self {
            Resource::Dashboard => VIEW,
            Resource::Analytics => VIEW | EXPORT,
            Resource::Projects
            | Resource::Products
            | Resource::Orders
            | Resource::Invoices
            | Resource::User => CRUD,
            Resource::Settings => VIEW | UPDATE,
            Resource::Session => VIEW | DELETE,
        }
    }

    /// True when every bit of `mask` is declared for this resource
    #[inline]
    pub const fn declares(self, mask: u64) -> bool {
        mask != 0 && (self.actions() & mask) == mask
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = RoleguardError;

    fn from_str(s: &str) -> Result<Self> {
        Resource::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| RoleguardError::config(s, "*"))
    }
}

/// Look up the bit for a single action name
pub fn action_bit(name: &str) -> Option<u64> {
    ACTIONS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
}

/// Name of a single action bit
pub fn action_name(bit: u64) -> Option<&'static str> {
    ACTIONS.iter().find(|(_, b)| *b == bit).map(|(n, _)| *n)
}

/// Convert an action mask to a list of action names
pub fn actions_to_names(mask: u64) -> Vec<&'static str> {
    ACTIONS
        .iter()
        .filter(|(_, b)| mask & b == *b)
        .map(|(n, _)| *n)
        .collect()
}

/// Convert a list of action names to a mask, `None` if any name is unknown
pub fn names_to_actions(names: &[&str]) -> Option<u64> {
    names.iter().try_fold(0, |acc, n| action_bit(n).map(|b| acc | b))
}

/// Returns false for any resource or action that is not declared.
pub fn is_valid_pair(resource: &str, action: &str) -> bool {
    parse_pair(resource, action).is_ok()
}

/// Resolve a string pair into a typed resource and single action bit
pub fn parse_pair(resource: &str, action: &str) -> Result<(Resource, u64)> {
    let undeclared = || RoleguardError::config(resource, action);
    let r = Resource::from_str(resource).map_err(|_| undeclared())?;
    let bit = action_bit(action).ok_or_else(undeclared)?;
    if !r.declares(bit) {
        return Err(undeclared());
    }
    Ok((r, bit))
}

/// Every declared `(resource, action)` pair
pub fn pairs() -> impl Iterator<Item = (Resource, u64)> {
    Resource::ALL.into_iter().flat_map(|r| {
        ACTIONS
            .iter()
            .map(|(_, b)| *b)
            .filter(move |b| r.declares(*b))
            .map(move |b| (r, b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_pairs_are_valid() {
        assert!(is_valid_pair("projects", "delete"));
        assert!(is_valid_pair("analytics", "export"));
        assert!(is_valid_pair("session", "view"));
    }

    #[test]
    fn undeclared_pairs_are_rejected() {
        assert!(!is_valid_pair("projects", "export"));
        assert!(!is_valid_pair("dashboard", "delete"));
        assert!(!is_valid_pair("accounts", "view"));
        assert!(!is_valid_pair("settings", "launch"));
        assert!(!is_valid_pair("", ""));
    }

    #[test]
    fn action_sets_are_not_shared() {
        assert!(Resource::Analytics.declares(EXPORT));
        assert!(!Resource::Orders.declares(EXPORT));
        assert!(!Resource::Settings.declares(CREATE));
    }

    #[test]
    fn name_mask_conversions() {
        assert_eq!(names_to_actions(&["view", "export"]), Some(VIEW | EXPORT));
        assert_eq!(names_to_actions(&["view", "fly"]), None);
        assert_eq!(actions_to_names(CREATE | DELETE), vec!["create", "delete"]);
        assert_eq!(action_name(UPDATE), Some("update"));
    }

    #[test]
    fn pair_count_matches_statement() {
        assert_eq!(pairs().count(), 27);
    }

    #[test]
    fn resource_round_trips_through_str() {
        for r in Resource::ALL {
            assert_eq!(r.as_str().parse::<Resource>().unwrap(), r);
            assert_eq!(Resource::ALL[r.index()], r);
        }
    }
}
