//! # Blessings Permissions
//!
//! Delegation objects and the request protocol's local shapes.
//!
//! ## Overview
//!
//! A blessing is a delegation: `source` hands `target` a permission
//! tree. Blessings chain, and a blessing never grants more than its source
//! holds. The clipping is applied whenever trees are merged, so a source
//! that loses permissions automatically narrows everything it delegated.
//!
//! ## Key Concepts
//!
//! - **Blessing**: one `source -> target` delegation with its own rules
//! - **Root blessing**: the self-issued blessing a principal delegates from
//! - **Authority**: the merged, clipped permissions a principal holds
//! - **Request**: a broadcast desire for permissions, claimed and granted by peers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blessings_core::{BlessingRecord, PermissionMask};
//! use blessings_perms::{Blessing, BlessingTable};
//!
//! let mut table = BlessingTable::new();
//! let mut record = BlessingRecord::root("alice".into());
//! record.version = 1;
//! table.insert(Blessing::from_record(&record).unwrap());
//!
//! let authority = table.authority(&"alice".into());
//! assert_eq!(authority.get("docs"), PermissionMask::NONE);
//! ```

pub mod blessing;
pub mod error;
pub mod listener;
pub mod registry;
pub mod request;

pub use blessing::{Blessing, BlessingState};
pub use error::{PermsError, Result};
pub use listener::{
    ListenerId, OnBlessingUpdatedListener, OnPermissionChangeListener, OnRequestListener,
    RequestResponse,
};
pub use registry::BlessingTable;
pub use request::{can_grant, PermissionRequestBuilder, RequestState};
