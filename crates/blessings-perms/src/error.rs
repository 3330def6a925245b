//! Error types for the permissions module.

use blessings_core::{BlessingId, Principal};
use thiserror::Error;

/// Errors that can occur during delegation operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Blessing `source -> target` would close a delegation cycle.
    #[error("blessing {target} from {issuer} would create a cycle")]
    Cycle {
        /// The delegating principal.
        issuer: Principal,
        /// The principal already upstream of the source.
        target: Principal,
    },

    /// The blessing has not observed its first snapshot yet.
    #[error("blessing {0} is not synced")]
    Unsynced(BlessingId),

    /// The blessing has been revoked.
    #[error("blessing {0} has been revoked")]
    Revoked(BlessingId),

    /// A snapshot arrived older than the state already applied.
    #[error("stale snapshot: applied version {current}, incoming {incoming}")]
    StaleWrite {
        /// Version already applied.
        current: u64,
        /// Version of the rejected snapshot.
        incoming: u64,
    },

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] blessings_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
