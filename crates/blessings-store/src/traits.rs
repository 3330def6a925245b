//! Store trait: the abstract interface to the replicated record store.
//!
//! The store persists blessing and request records and notifies
//! subscribers of changes. It never calls back into application state:
//! every notification is a [`StoreEvent`] pushed onto the subscriber's
//! queue, to be processed by a single consumer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use blessings_core::{BlessingId, BlessingRecord, PermissionMask, PermissionRequest, Principal, RequestId, RequestResolution};

use crate::error::Result;

/// Identifies one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscription {
    /// Every write to one blessing record. Fires immediately with the
    /// current value, or [`Change::BlessingMissing`] if there is none.
    Blessing(BlessingId),

    /// Blessing records whose `target` equals the principal. Fires
    /// immediately for every existing match.
    BlessingsByTarget(Principal),

    /// Blessing records whose `source` equals the principal. Fires
    /// immediately for every existing match.
    BlessingsBySource(Principal),

    /// The shared requests collection. Fires immediately for every
    /// existing request.
    Requests,
}

/// A change delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A blessing record was created or written; carries the full value.
    BlessingUpserted(BlessingRecord),

    /// A blessing record was removed; carries its last value.
    BlessingRemoved(BlessingRecord),

    /// A watched blessing record does not exist.
    BlessingMissing(BlessingId),

    /// A request was added or changed.
    RequestUpserted(PermissionRequest),

    /// A request was removed; carries its last value.
    RequestRemoved(PermissionRequest),

    /// The store cancelled the subscription. No further events follow.
    Cancelled(String),
}

/// A notification addressed to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    /// The subscription this event belongs to.
    pub subscription: SubscriptionId,
    /// What happened.
    pub change: Change,
}

/// Sending half of a subscriber's event queue.
pub type EventSender = mpsc::UnboundedSender<StoreEvent>;

/// Receiving half of a subscriber's event queue.
pub type EventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

/// The Store trait: async interface to the replicated record store.
///
/// # Design Notes
///
/// - **Point writes**: rules are written one path at a time so concurrent
///   writers to different paths never clobber each other.
/// - **Versions**: every write to a blessing record bumps its `version`.
/// - **Server timestamps**: request timestamps are assigned on first insert.
/// - **Idempotent removal**: removing a missing record is not an error.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Blessing Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a blessing record if none exists with the same id.
    ///
    /// Returns the stored record (the existing one if already present).
    async fn create_blessing(&self, record: &BlessingRecord) -> Result<BlessingRecord>;

    /// Get a blessing record by id.
    async fn get_blessing(&self, id: &BlessingId) -> Result<Option<BlessingRecord>>;

    /// Set the own mask at `path` of a blessing's rules.
    ///
    /// Returns the new record version.
    async fn set_rule(&self, id: &BlessingId, path: &str, mask: PermissionMask) -> Result<u64>;

    /// Remove the rules at and below `path`, or all rules if `None`.
    ///
    /// Returns the new record version.
    async fn remove_rules(&self, id: &BlessingId, path: Option<&str>) -> Result<u64>;

    /// Remove a blessing record. Returns false if it did not exist.
    async fn remove_blessing(&self, id: &BlessingId) -> Result<bool>;

    /// All blessing records targeting `target`.
    async fn blessings_by_target(&self, target: &Principal) -> Result<Vec<BlessingRecord>>;

    /// All blessing records issued by `source`.
    async fn blessings_by_source(&self, source: &Principal) -> Result<Vec<BlessingRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a request record.
    ///
    /// Returns the stored request with its server-assigned timestamp.
    async fn put_request(&self, request: &PermissionRequest) -> Result<PermissionRequest>;

    /// Get a request by id.
    async fn get_request(&self, id: &RequestId) -> Result<Option<PermissionRequest>>;

    /// Remove a request. Returns false if it did not exist.
    async fn remove_request(&self, id: &RequestId) -> Result<bool>;

    /// All live requests.
    async fn list_requests(&self) -> Result<Vec<PermissionRequest>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    /// Start delivering changes matching `subscription` to `sender`.
    async fn subscribe(&self, subscription: Subscription, sender: EventSender) -> Result<SubscriptionId>;

    /// Stop a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Mark a request resolved, then remove it.
    ///
    /// Observers see the resolution as a change immediately before the
    /// removal. A request that is already gone is left alone.
    fn resolve_request(
        &self,
        id: &RequestId,
        resolution: RequestResolution,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn resolve_request(&self, id: &RequestId, resolution: RequestResolution) -> Result<bool> {
        let Some(mut request) = self.get_request(id).await? else {
            return Ok(false);
        };

        request.resolution = Some(resolution);
        self.put_request(&request).await?;
        self.remove_request(id).await
    }
}
