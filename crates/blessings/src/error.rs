//! Error types for the permission manager.

use blessings_core::{BlessingId, CoreError, Principal, RequestId};
use blessings_perms::PermsError;
use blessings_store::StoreError;
use thiserror::Error;

/// Errors that can occur during manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Malformed input.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Delegation error.
    #[error("permission error: {0}")]
    Perms(#[from] PermsError),

    /// Blessing not tracked by this manager.
    #[error("blessing not found: {0}")]
    BlessingNotFound(BlessingId),

    /// Request not known to this manager.
    #[error("request not found: {0}")]
    RequestNotFound(RequestId),

    /// A blessing's source has no blessing of its own.
    #[error("blessing {blessing} has no parent: {issuer} holds nothing")]
    MissingParent {
        blessing: BlessingId,
        issuer: Principal,
    },

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
