//! Error types shared by the profile, rule, migration and storage layers

use thiserror::Error;

use crate::profile::ProfileId;

/// Failures reported by a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Rule already exists: {0}")]
    DuplicateRule(String),

    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    #[error("Stored data is inconsistent: {0}")]
    InconsistentStorage(String),

    #[error("Storage migration failed: {0}")]
    MigrationFailure(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// True for the `NotFound` family (missing profile or rule)
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::ProfileNotFound(_) | CoreError::RuleNotFound(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
