//! # Blessings Store
//!
//! Boundary to the replicated record store. Provides a trait-based interface
//! for blessing and request records plus change subscriptions, with an
//! in-memory implementation for tests.
//!
//! ## Overview
//!
//! The permission engine never talks to storage directly. It reads and
//! writes records through the [`Store`] trait and learns about remote
//! changes through [`StoreEvent`]s pushed onto a queue it owns.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`Subscription`] - What a subscriber watches: one record, a query, or requests
//! - [`Change`] - One delivered change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blessings_core::{BlessingRecord, PermissionMask};
//! use blessings_store::{MemoryStore, Store, Subscription};
//! use tokio::sync::mpsc;
//!
//! async fn example() {
//!     let store = MemoryStore::new();
//!     let (tx, _rx) = mpsc::unbounded_channel();
//!
//!     let record = BlessingRecord::new(Some("root".into()), "alice".into());
//!     store.subscribe(Subscription::Blessing(record.id), tx).await.unwrap();
//!     store.create_blessing(&record).await.unwrap();
//!     store.set_rule(&record.id, "docs", PermissionMask::READ).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent creates**: creating an existing blessing returns the stored one
//! - **Initial state**: a new subscription first receives the current matches
//! - **Ordered delivery**: one queue per subscriber, in write order

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{
    Change, EventReceiver, EventSender, Store, StoreEvent, StoreExt, Subscription, SubscriptionId,
};
