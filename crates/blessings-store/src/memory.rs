//! In-memory implementation of the Store trait.
//!
//! Stands in for the replicated store in tests and single-process setups.
//! Records are held CBOR-encoded, exactly as they would travel, and every
//! write fans out to matching subscribers before the call returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use blessings_core::{
    path, BlessingId, BlessingRecord, PermissionMask, PermissionRequest, Principal, RequestId,
    KEY_PERMISSIONS,
};

use crate::error::{Result, StoreError};
use crate::traits::{Change, EventSender, Store, StoreEvent, Subscription, SubscriptionId};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Blessing records (CBOR) indexed by id.
    blessings: HashMap<BlessingId, Vec<u8>>,

    /// Request records (CBOR) indexed by id.
    requests: BTreeMap<RequestId, Vec<u8>>,

    /// Live subscriptions.
    subscribers: BTreeMap<SubscriptionId, Subscriber>,

    next_subscription: u64,
    next_version: u64,
}

struct Subscriber {
    subscription: Subscription,
    sender: EventSender,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                blessings: HashMap::new(),
                requests: BTreeMap::new(),
                subscribers: BTreeMap::new(),
                next_subscription: 1,
                next_version: 1,
            }),
        }
    }

    /// Cancel every live subscription, as a store does when access is
    /// revoked or the connection is torn down.
    pub fn cancel_subscriptions(&self, reason: &str) {
        let mut inner = self.write();
        let subscribers = std::mem::take(&mut inner.subscribers);
        for (id, subscriber) in subscribers {
            let _ = subscriber.sender.send(StoreEvent {
                subscription: id,
                change: Change::Cancelled(reason.to_string()),
            });
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.read().subscribers.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn blessing(&self, id: &BlessingId) -> Result<Option<BlessingRecord>> {
        self.blessings
            .get(id)
            .map(|bytes| BlessingRecord::from_bytes(bytes).map_err(StoreError::from))
            .transpose()
    }

    fn request(&self, id: &RequestId) -> Result<Option<PermissionRequest>> {
        self.requests
            .get(id)
            .map(|bytes| PermissionRequest::from_bytes(bytes).map_err(StoreError::from))
            .transpose()
    }

    fn all_blessings(&self) -> Result<Vec<BlessingRecord>> {
        let mut records = self
            .blessings
            .values()
            .map(|bytes| BlessingRecord::from_bytes(bytes).map_err(StoreError::from))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn all_requests(&self) -> Result<Vec<PermissionRequest>> {
        self.requests
            .values()
            .map(|bytes| PermissionRequest::from_bytes(bytes).map_err(StoreError::from))
            .collect()
    }

    /// Apply `edit` to a stored blessing, bump its version, and notify.
    fn update_blessing(&mut self, id: &BlessingId, edit: impl FnOnce(&mut Value)) -> Result<u64> {
        let mut record = self
            .blessing(id)?
            .ok_or_else(|| StoreError::NotFound(format!("blessing {}", id)))?;

        edit(&mut record.rules);
        record.version = self.bump_version();
        self.blessings.insert(*id, record.to_bytes()?);
        self.notify_blessing(Change::BlessingUpserted(record.clone()), &record);
        Ok(record.version)
    }

    fn bump_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    fn notify_blessing(&mut self, change: Change, record: &BlessingRecord) {
        self.notify(change, |subscription| match subscription {
            Subscription::Blessing(id) => *id == record.id,
            Subscription::BlessingsByTarget(target) => *target == record.target,
            Subscription::BlessingsBySource(source) => record.source.as_ref() == Some(source),
            Subscription::Requests => false,
        });
    }

    fn notify_request(&mut self, change: Change) {
        self.notify(change, |subscription| matches!(subscription, Subscription::Requests));
    }

    fn notify(&mut self, change: Change, wants: impl Fn(&Subscription) -> bool) {
        let mut closed = Vec::new();
        for (id, subscriber) in &self.subscribers {
            if !wants(&subscriber.subscription) {
                continue;
            }
            let event = StoreEvent {
                subscription: *id,
                change: change.clone(),
            };
            if subscriber.sender.send(event).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            tracing::debug!(subscription = id.0, "dropping subscription with closed queue");
            self.subscribers.remove(&id);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_blessing(&self, record: &BlessingRecord) -> Result<BlessingRecord> {
        let mut inner = self.write();

        if let Some(existing) = inner.blessing(&record.id)? {
            return Ok(existing);
        }
        if record.id != BlessingId::derive(record.source.as_ref(), &record.target) {
            return Err(StoreError::InvalidData(format!(
                "blessing id {} does not match its source and target",
                record.id
            )));
        }

        let mut stored = record.clone();
        stored.version = inner.bump_version();
        inner.blessings.insert(stored.id, stored.to_bytes()?);
        inner.notify_blessing(Change::BlessingUpserted(stored.clone()), &stored);
        Ok(stored)
    }

    async fn get_blessing(&self, id: &BlessingId) -> Result<Option<BlessingRecord>> {
        self.read().blessing(id)
    }

    async fn set_rule(&self, id: &BlessingId, rule_path: &str, mask: PermissionMask) -> Result<u64> {
        path::validate(rule_path)?;
        self.write().update_blessing(id, |rules| {
            let node = path::segments(rule_path).fold(rules, child_object);
            object_of(node).insert(KEY_PERMISSIONS.to_string(), Value::from(mask.bits()));
        })
    }

    async fn remove_rules(&self, id: &BlessingId, rule_path: Option<&str>) -> Result<u64> {
        if let Some(rule_path) = rule_path {
            path::validate(rule_path)?;
        }
        self.write().update_blessing(id, |rules| {
            let Some((parent, full)) = rule_path.and_then(|p| path::parent(p).map(|parent| (parent, p)))
            else {
                *rules = Value::Null;
                return;
            };
            let segment = full[parent.len()..].trim_start_matches(path::DELIMITER);
            let node = path::segments(parent).try_fold(rules, |node, part| node.get_mut(part));
            if let Some(Value::Object(object)) = node {
                object.remove(segment);
            }
        })
    }

    async fn remove_blessing(&self, id: &BlessingId) -> Result<bool> {
        let mut inner = self.write();
        let Some(record) = inner.blessing(id)? else {
            return Ok(false);
        };

        inner.blessings.remove(id);
        inner.notify_blessing(Change::BlessingRemoved(record.clone()), &record);
        Ok(true)
    }

    async fn blessings_by_target(&self, target: &Principal) -> Result<Vec<BlessingRecord>> {
        let records = self.read().all_blessings()?;
        Ok(records.into_iter().filter(|r| r.target == *target).collect())
    }

    async fn blessings_by_source(&self, source: &Principal) -> Result<Vec<BlessingRecord>> {
        let records = self.read().all_blessings()?;
        Ok(records
            .into_iter()
            .filter(|r| r.source.as_ref() == Some(source))
            .collect())
    }

    async fn put_request(&self, request: &PermissionRequest) -> Result<PermissionRequest> {
        let mut inner = self.write();

        let mut stored = request.clone();
        stored.timestamp = match inner.request(&request.id)? {
            Some(existing) => existing.timestamp,
            None => now_millis(),
        };
        inner.requests.insert(stored.id, stored.to_bytes()?);
        inner.notify_request(Change::RequestUpserted(stored.clone()));
        Ok(stored)
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<PermissionRequest>> {
        self.read().request(id)
    }

    async fn remove_request(&self, id: &RequestId) -> Result<bool> {
        let mut inner = self.write();
        let Some(request) = inner.request(id)? else {
            return Ok(false);
        };

        inner.requests.remove(id);
        inner.notify_request(Change::RequestRemoved(request));
        Ok(true)
    }

    async fn list_requests(&self) -> Result<Vec<PermissionRequest>> {
        self.read().all_requests()
    }

    async fn subscribe(&self, subscription: Subscription, sender: EventSender) -> Result<SubscriptionId> {
        let mut inner = self.write();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;

        // Initial state, delivered before any later change.
        let initial: Vec<Change> = match &subscription {
            Subscription::Blessing(blessing_id) => vec![match inner.blessing(blessing_id)? {
                Some(record) => Change::BlessingUpserted(record),
                None => Change::BlessingMissing(*blessing_id),
            }],
            Subscription::BlessingsByTarget(target) => inner
                .all_blessings()?
                .into_iter()
                .filter(|r| r.target == *target)
                .map(Change::BlessingUpserted)
                .collect(),
            Subscription::BlessingsBySource(source) => inner
                .all_blessings()?
                .into_iter()
                .filter(|r| r.source.as_ref() == Some(source))
                .map(Change::BlessingUpserted)
                .collect(),
            Subscription::Requests => inner
                .all_requests()?
                .into_iter()
                .map(Change::RequestUpserted)
                .collect(),
        };

        for change in initial {
            // A closed queue is dropped on the next notify.
            let _ = sender.send(StoreEvent {
                subscription: id,
                change,
            });
        }

        inner.subscribers.insert(id, Subscriber { subscription, sender });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.write().subscribers.remove(&id);
        Ok(())
    }
}

/// Coerce `value` into an object, replacing any non-object value.
fn object_of(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(object) => object,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn child_object<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    let child = object_of(value)
        .entry(segment.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    child
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StoreEvent>) -> Vec<Change> {
        let mut changes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            changes.push(event.change);
        }
        changes
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = MemoryStore::new();
        let record = BlessingRecord::new(Some("root".into()), "alice".into());

        let first = store.create_blessing(&record).await.unwrap();
        store.set_rule(&record.id, "docs", PermissionMask::READ).await.unwrap();
        let second = store.create_blessing(&record).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.version > first.version);
        assert_eq!(second.tree().unwrap().get("docs"), PermissionMask::READ);
    }

    #[tokio::test]
    async fn test_point_writes_and_subtree_removal() {
        let store = MemoryStore::new();
        let record = store
            .create_blessing(&BlessingRecord::new(Some("root".into()), "alice".into()))
            .await
            .unwrap();

        store.set_rule(&record.id, "a", PermissionMask::READ).await.unwrap();
        store.set_rule(&record.id, "a/b", PermissionMask::WRITE).await.unwrap();
        store.set_rule(&record.id, "c", PermissionMask::ADMIN).await.unwrap();

        let tree = store.get_blessing(&record.id).await.unwrap().unwrap().tree().unwrap();
        assert_eq!(tree.get("a/b"), PermissionMask::READ | PermissionMask::WRITE);

        store.remove_rules(&record.id, Some("a/b")).await.unwrap();
        let tree = store.get_blessing(&record.id).await.unwrap().unwrap().tree().unwrap();
        assert!(!tree.contains("a/b"));
        assert_eq!(tree.get("c"), PermissionMask::ADMIN);

        store.remove_rules(&record.id, None).await.unwrap();
        let tree = store.get_blessing(&record.id).await.unwrap().unwrap().tree().unwrap();
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn test_set_rule_on_missing_blessing() {
        let store = MemoryStore::new();
        let id = BlessingId::root(&"ghost".into());
        assert!(matches!(
            store.set_rule(&id, "a", PermissionMask::READ).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_value_watch_reports_missing_then_changes() {
        let store = MemoryStore::new();
        let record = BlessingRecord::root("alice".into());
        let (tx, mut rx) = mpsc::unbounded_channel();

        store.subscribe(Subscription::Blessing(record.id), tx).await.unwrap();
        store.create_blessing(&record).await.unwrap();
        store.remove_blessing(&record.id).await.unwrap();

        let changes = drain(&mut rx);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], Change::BlessingMissing(record.id));
        assert!(matches!(changes[1], Change::BlessingUpserted(_)));
        assert!(matches!(changes[2], Change::BlessingRemoved(_)));
    }

    #[tokio::test]
    async fn test_target_query_replays_existing() {
        let store = MemoryStore::new();
        store
            .create_blessing(&BlessingRecord::new(Some("root".into()), "alice".into()))
            .await
            .unwrap();
        store
            .create_blessing(&BlessingRecord::new(Some("root".into()), "bob".into()))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        store
            .subscribe(Subscription::BlessingsByTarget("alice".into()), tx)
            .await
            .unwrap();

        let changes = drain(&mut rx);
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::BlessingUpserted(record) => assert_eq!(record.target.as_str(), "alice"),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_timestamp_is_server_assigned_once() {
        let store = MemoryStore::new();
        let mut request = PermissionRequest::new(
            RequestId::random(),
            "carol".into(),
            "docs/1",
            PermissionMask::READ,
        );

        let stored = store.put_request(&request).await.unwrap();
        assert!(stored.timestamp > 0);

        request.mask = PermissionMask::READ | PermissionMask::WRITE;
        let updated = store.put_request(&request).await.unwrap();
        assert_eq!(updated.timestamp, stored.timestamp);

        assert!(store.remove_request(&request.id).await.unwrap());
        assert!(!store.remove_request(&request.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_requests_holds_only_live_records() {
        let store = MemoryStore::new();
        assert!(store.list_requests().await.unwrap().is_empty());

        let first = PermissionRequest::new(RequestId::random(), "carol".into(), "a", PermissionMask::READ);
        let second = PermissionRequest::new(RequestId::random(), "dave".into(), "b/c", PermissionMask::WRITE);
        store.put_request(&first).await.unwrap();
        store.put_request(&second).await.unwrap();

        let mut listed: Vec<RequestId> = store.list_requests().await.unwrap().iter().map(|r| r.id).collect();
        let mut expected = vec![first.id, second.id];
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);

        store.remove_request(&first.id).await.unwrap();
        let listed = store.list_requests().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "b/c");
        assert!(listed[0].timestamp > 0);
    }

    #[tokio::test]
    async fn test_cancel_subscriptions() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.subscribe(Subscription::Requests, tx).await.unwrap();

        store.cancel_subscriptions("permission denied");
        assert_eq!(store.subscription_count(), 0);
        assert_eq!(drain(&mut rx), vec![Change::Cancelled("permission denied".into())]);
    }

    #[tokio::test]
    async fn test_closed_queues_are_dropped() {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::unbounded_channel();
        store.subscribe(Subscription::Requests, tx).await.unwrap();
        drop(rx);

        store
            .put_request(&PermissionRequest::new(
                RequestId::random(),
                "carol".into(),
                "a",
                PermissionMask::READ,
            ))
            .await
            .unwrap();
        assert_eq!(store.subscription_count(), 0);
    }
}
