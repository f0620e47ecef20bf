//! Record ownership
//!
//! Record ids embed the owning user id as their last `_`-separated part:
//! `prefix_unique_userId`. User ids never contain `_`, so the last part
//! names exactly one user.

use crate::error::{RoleguardError, Result};

/// Owner id embedded in a record id, `None` if the id has fewer than three parts
pub fn owner_of(record_id: &str) -> Option<&str> {
    if record_id.split('_').count() < 3 {
        return None;
    }
    record_id.rsplit('_').next().filter(|p| !p.is_empty())
}

/// Reject a record that does not belong to the principal
pub fn validate(principal_id: &str, record_id: &str) -> Result<()> {
    match owner_of(record_id) {
        Some(owner) if owner == principal_id && !principal_id.contains('_') => Ok(()),
        _ => Err(RoleguardError::NotOwner {
            principal: principal_id.to_string(),
            record: record_id.to_string(),
        }),
    }
}

/// Build a record id owned by `user_id`
pub fn record_id(prefix: &str, unique: &str, user_id: &str) -> Result<String> {
    if user_id.is_empty() || user_id.contains('_') {
        return Err(RoleguardError::InvalidId(user_id.to_string()));
    }
    Ok(format!("{}_{}_{}", prefix, unique, user_id))
}
