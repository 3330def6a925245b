//! # Blessings
//!
//! The unified API for the Blessings capability engine: hierarchical
//! permission delegation with live, path-scoped change notification.
//!
//! ## Overview
//!
//! Blessings provides:
//!
//! - **Permission trees**: path-keyed bitmask rules with nearest-ancestor inheritance
//! - **Blessings**: delegations that can never grant more than their source holds
//! - **Aggregation**: one effective tree per principal, recomputed on every change
//! - **Requests**: broadcast a desire for permissions and let a peer grant it
//!
//! ## Key Concepts
//!
//! - **Root blessing**: every principal's self-issued authority
//! - **Group**: a target principal a manager listens on (itself, `public`, ...)
//! - **Reactor**: store notifications are queued and applied one at a time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blessings::{ManagerConfig, PermissionManager};
//! use blessings::core::PermissionMask;
//! use blessings::store::MemoryStore;
//!
//! async fn example() {
//!     let store = Arc::new(MemoryStore::new());
//!     let mut root = PermissionManager::new(store.clone(), "root", ManagerConfig::default())
//!         .await
//!         .unwrap();
//!     let mut alice = PermissionManager::new(store, "alice", ManagerConfig::default())
//!         .await
//!         .unwrap();
//!
//!     // Root holds everything under its own namespace.
//!     let root_id = *root.root_blessing_id();
//!     root.set_permissions(&root_id, "", PermissionMask::ALL).await.unwrap();
//!
//!     // Delegate to alice.
//!     let blessing = root.bless("alice").await.unwrap();
//!     root.set_permissions(&blessing, "docs/1", PermissionMask::READ).await.unwrap();
//!
//!     alice.add_permission_listener("docs/1/title", |mask: PermissionMask| {
//!         println!("docs/1/title is now {}", mask);
//!     }).unwrap();
//!     alice.process_events().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `blessings::core` - Masks, paths, permission trees, record shapes
//! - `blessings::store` - Store boundary and the in-memory store
//! - `blessings::perms` - Blessings, the blessing arena, requests, listeners

pub mod error;
pub mod manager;
pub mod reactor;
pub mod reader;
pub mod requests;

// Re-export component crates
pub use blessings_core as core;
pub use blessings_perms as perms;
pub use blessings_store as store;

// Re-export main types for convenience
pub use error::{ManagerError, Result};
pub use manager::{ManagerConfig, PermissionManager};
pub use reader::PermissionReader;

// Re-export commonly used types
pub use blessings_core::{BlessingId, PermissionMask, PermissionTree, Principal, RequestId};
pub use blessings_perms::{
    Blessing, BlessingState, ListenerId, OnBlessingUpdatedListener, OnPermissionChangeListener,
    OnRequestListener, PermissionRequestBuilder, RequestResponse, RequestState,
};
