//! Error types for Roleguard

use thiserror::Error;

/// The main error type for Roleguard operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleguardError {
    /// LMDB or filesystem failure
    #[error("storage: {0}")]
    Storage(String),

    /// A check referenced a resource/action pair the statement does not declare
    #[error("undeclared permission {resource}.{action}")]
    Config { resource: String, action: String },

    #[error("unknown role {0}")]
    UnknownRole(String),

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("invalid id {0:?}")]
    InvalidId(String),

    #[error("user {0} already exists")]
    UserExists(String),

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("already bootstrapped")]
    AlreadyBootstrapped,

    /// Record does not belong to the requesting principal
    #[error("record {record} is not owned by {principal}")]
    NotOwner { principal: String, record: String },

    #[error("corrupted {0}")]
    Corrupted(&'static str),
}

impl RoleguardError {
    pub fn config(resource: impl Into<String>, action: impl Into<String>) -> Self {
        RoleguardError::Config { resource: resource.into(), action: action.into() }
    }
}

/// Result type alias for Roleguard operations
pub type Result<T> = std::result::Result<T, RoleguardError>;

/// Convert any storage-level error to RoleguardError
pub fn err<E: std::error::Error>(e: E) -> RoleguardError {
    RoleguardError::Storage(e.to_string())
}
