//! # Blessings Core
//!
//! Pure primitives for the Blessings capability engine: principals,
//! permission masks, resource paths, and permission trees.
//!
//! This crate contains no I/O, no storage, no notification plumbing. It is
//! pure computation over path-keyed permission data.
//!
//! ## Key Types
//!
//! - [`Principal`] - An opaque identity that holds and grants permissions
//! - [`PermissionMask`] - A bitmask of permission flags
//! - [`PermissionTree`] - Path-keyed rules with inheritance and validated merge
//! - [`BlessingRecord`] / [`PermissionRequest`] - Stored record shapes
//!
//! ## Paths
//!
//! Paths are `/`-delimited and never start with `/`. Permissions resolve by
//! nearest ancestor. See [`path`] module.

pub mod error;
pub mod mask;
pub mod path;
pub mod record;
pub mod tree;
pub mod types;

pub use error::{CoreError, Result};
pub use mask::PermissionMask;
pub use record::{BlessingRecord, PermissionRequest, RequestResolution, DESCRIPTION_TITLE};
pub use tree::{PermissionNode, PermissionTree, KEY_PERMISSIONS};
pub use types::{BlessingId, Principal, RequestId};
