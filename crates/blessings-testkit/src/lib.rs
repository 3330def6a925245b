//! # Blessings Testkit
//!
//! Testing utilities for Blessings.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`Constellation`] of managers sharing one in-memory store
//! - **Recorders**: listeners that remember every call, for assertions
//! - **Generators**: Proptest strategies for paths, masks, and trees
//!
//! ## Test Fixtures
//!
//! Quickly set up a multi-principal scenario:
//!
//! ```rust,no_run
//! use blessings_core::PermissionMask;
//! use blessings_testkit::fixtures::{Constellation, PermissionRecorder};
//!
//! async fn example() {
//!     let mut world = Constellation::new();
//!     world.add_principal("root").await;
//!     world.add_principal("alice").await;
//!
//!     let blessing = world.grant("root", "alice", &[("docs", PermissionMask::READ)]).await;
//!
//!     let recorder = PermissionRecorder::new();
//!     world.manager("alice").add_permission_listener("docs/1", recorder.clone()).unwrap();
//!     world.settle().await;
//!     assert_eq!(recorder.last(), Some(PermissionMask::READ));
//!     # let _ = blessing;
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use blessings_testkit::generators::tree;
//!
//! proptest! {
//!     #[test]
//!     fn merge_is_idempotent(t in tree()) {
//!         let mut once = t.clone();
//!         once.merge(&t, None);
//!         prop_assert_eq!(once.rules(), t.rules());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{BlessingRecorder, Constellation, PermissionRecorder, RequestRecorder};
pub use generators::{mask, path, rules, segment, tree};
