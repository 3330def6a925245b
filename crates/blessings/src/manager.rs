//! The PermissionManager: one principal's view of the permission system.
//!
//! The manager tracks the blessings relevant to its principal, merges the
//! ones addressed to it (or to groups it joined) into an effective tree,
//! and tells path listeners when their resolved permission changes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use blessings_core::{path, BlessingId, BlessingRecord, PermissionMask, PermissionTree, Principal, RequestId};
use blessings_perms::{
    Blessing, BlessingTable, ListenerId, OnBlessingUpdatedListener, OnPermissionChangeListener,
    OnRequestListener, PermsError,
};
use blessings_store::{EventReceiver, EventSender, Store, Subscription, SubscriptionId};

use crate::error::{ManagerError, Result};
use crate::reader::PermissionReader;
use crate::requests::{InboundRequest, OutboundRequest};

/// Configuration for the PermissionManager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Groups joined at construction, in addition to the local principal.
    pub groups: Vec<Principal>,
    /// Maximum number of store events handled per `process_events` call.
    pub event_batch_limit: usize,
    /// Ignore inbound requests older than this. Requests never expire when
    /// unset.
    pub request_expiry: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            event_batch_limit: 1024,
            request_expiry: None,
        }
    }
}

impl ManagerConfig {
    /// Join `group` at construction.
    pub fn with_group(mut self, group: impl Into<Principal>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn with_event_batch_limit(mut self, limit: usize) -> Self {
        self.event_batch_limit = limit.max(1);
        self
    }

    pub fn with_request_expiry(mut self, expiry: Duration) -> Self {
        self.request_expiry = Some(expiry);
        self
    }
}

pub(crate) struct PermissionListener {
    pub(crate) path: String,
    pub(crate) last: PermissionMask,
    pub(crate) listener: Box<dyn OnPermissionChangeListener>,
}

pub(crate) struct BlessingListener {
    pub(crate) blessing: BlessingId,
    pub(crate) listener: Box<dyn OnBlessingUpdatedListener>,
}

pub(crate) struct RequestListener {
    pub(crate) pattern: String,
    pub(crate) listener: Box<dyn OnRequestListener>,
}

/// The main PermissionManager struct.
///
/// All mutation happens through `&mut self`, driven either by the
/// application or by [`process_events`](Self::process_events) draining the
/// store's notifications. Concurrent readers use a [`PermissionReader`].
pub struct PermissionManager<S: Store> {
    pub(crate) local: Principal,
    pub(crate) root: BlessingId,
    pub(crate) store: Arc<S>,
    pub(crate) config: ManagerConfig,

    /// Store notifications land here; the manager is the only consumer.
    pub(crate) sender: EventSender,
    pub(crate) events: EventReceiver,
    pub(crate) subscriptions: HashMap<SubscriptionId, Subscription>,

    /// Groups whose blessings count towards the effective tree.
    pub(crate) groups: BTreeSet<Principal>,
    /// Principals whose received blessings are watched.
    pub(crate) watched: BTreeMap<Principal, SubscriptionId>,

    pub(crate) blessings: BlessingTable,
    /// Blessings deleted locally whose removal the store has not echoed yet.
    pub(crate) pending_removals: HashSet<BlessingId>,

    pub(crate) effective: PermissionTree,
    pub(crate) reader: PermissionReader,

    pub(crate) permission_listeners: BTreeMap<ListenerId, PermissionListener>,
    pub(crate) listeners_by_path: BTreeMap<String, BTreeSet<ListenerId>>,
    /// Index: rule path -> listener paths resolving to it.
    pub(crate) nearest_ancestors: BTreeMap<String, BTreeSet<String>>,
    pub(crate) blessing_listeners: BTreeMap<ListenerId, BlessingListener>,
    pub(crate) request_listeners: BTreeMap<ListenerId, RequestListener>,

    pub(crate) inbound: BTreeMap<RequestId, InboundRequest>,
    pub(crate) outbound: BTreeMap<RequestId, OutboundRequest>,
    /// Index: (group, path) -> the live request for it.
    pub(crate) active_requests: BTreeMap<(Principal, String), RequestId>,

    next_listener: u64,
    pub(crate) shut_down: bool,
}

impl<S: Store> PermissionManager<S> {
    /// Create a manager for `local`.
    ///
    /// Ensures the local root blessing exists, joins the local principal and
    /// the configured groups, and subscribes to issued blessings and the
    /// shared requests collection.
    pub async fn new(store: Arc<S>, local: impl Into<Principal>, config: ManagerConfig) -> Result<Self> {
        let local = local.into();
        let (sender, events) = mpsc::unbounded_channel();
        let groups = config.groups.clone();

        let mut manager = Self {
            root: BlessingId::root(&local),
            local: local.clone(),
            store,
            config,
            sender,
            events,
            subscriptions: HashMap::new(),
            groups: BTreeSet::new(),
            watched: BTreeMap::new(),
            blessings: BlessingTable::new(),
            pending_removals: HashSet::new(),
            effective: PermissionTree::new(),
            reader: PermissionReader::new(),
            permission_listeners: BTreeMap::new(),
            listeners_by_path: BTreeMap::new(),
            nearest_ancestors: BTreeMap::new(),
            blessing_listeners: BTreeMap::new(),
            request_listeners: BTreeMap::new(),
            inbound: BTreeMap::new(),
            outbound: BTreeMap::new(),
            active_requests: BTreeMap::new(),
            next_listener: 1,
            shut_down: false,
        };

        let record = manager
            .store
            .create_blessing(&BlessingRecord::root(local.clone()))
            .await?;
        manager.apply_record(&record);

        manager.join(local.clone()).await?;
        for group in groups {
            manager.join(group).await?;
        }
        manager.subscribe(Subscription::BlessingsBySource(local.clone())).await?;
        manager.subscribe(Subscription::Requests).await?;

        tracing::info!(principal = %local, "permission manager started");
        Ok(manager)
    }

    /// The local principal.
    pub fn local_id(&self) -> &Principal {
        &self.local
    }

    /// The local root blessing, the authority every delegation starts from.
    pub fn root_blessing_id(&self) -> &BlessingId {
        &self.root
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// A tracked blessing.
    pub fn blessing(&self, id: &BlessingId) -> Option<&Blessing> {
        self.blessings.get(id)
    }

    /// Blessings addressed to the local principal or a joined group.
    pub fn received_blessings(&self) -> Vec<&Blessing> {
        self.groups
            .iter()
            .flat_map(|group| self.blessings.targeting(group))
            .collect()
    }

    /// Blessings issued by the local principal.
    pub fn granted_blessings(&self) -> Vec<&Blessing> {
        self.blessings.issued_by(&self.local).collect()
    }

    /// Groups currently joined, the local principal included.
    pub fn groups(&self) -> impl Iterator<Item = &Principal> {
        self.groups.iter()
    }

    /// Effective permission at `path`.
    pub fn get_permissions(&self, path: &str) -> PermissionMask {
        self.effective.get(path)
    }

    /// The effective tree.
    pub fn effective_tree(&self) -> &PermissionTree {
        &self.effective
    }

    /// A handle for reading permissions from other threads.
    pub fn reader(&self) -> PermissionReader {
        self.reader.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    /// Start counting blessings addressed to `group`.
    pub async fn join(&mut self, group: impl Into<Principal>) -> Result<()> {
        self.ensure_running()?;
        let group = group.into();
        if !self.groups.insert(group.clone()) {
            return Ok(());
        }
        self.watch_principal(&group).await?;
        self.refresh_permissions();
        Ok(())
    }

    /// Stop counting blessings addressed to `group`.
    pub async fn leave(&mut self, group: impl Into<Principal>) -> Result<()> {
        self.ensure_running()?;
        let group = group.into();
        if group == self.local {
            return Err(ManagerError::InvalidOperation(format!(
                "{} cannot leave its own group",
                group
            )));
        }
        if !self.groups.remove(&group) {
            return Ok(());
        }

        let needed = self.blessings.iter().any(|b| b.source() == Some(&group));
        if !needed {
            if let Some(subscription) = self.watched.remove(&group) {
                self.unsubscribe(subscription).await;
            }
            let dropped: Vec<BlessingId> = self
                .blessings
                .targeting(&group)
                .filter(|b| b.source() != Some(&self.local))
                .map(|b| *b.id())
                .collect();
            for id in dropped {
                if let Some(blessing) = self.blessings.remove(&id) {
                    self.release_blessing_listeners(&blessing);
                    tracing::debug!(blessing = %id, group = %group, "stopped tracking blessing");
                }
            }
        }
        self.refresh_permissions();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation
    // ─────────────────────────────────────────────────────────────────────────

    /// Bless `target` from the local root blessing.
    pub async fn bless(&mut self, target: impl Into<Principal>) -> Result<BlessingId> {
        let root = self.root;
        self.bless_from(&root, target).await
    }

    /// Return the blessing `from.target -> target`, creating it if needed.
    ///
    /// `from` must be held by the local principal or a joined group, and
    /// `target` must not already be upstream of it.
    pub async fn bless_from(&mut self, from: &BlessingId, target: impl Into<Principal>) -> Result<BlessingId> {
        self.ensure_running()?;
        let target = target.into();
        let issuer = self
            .blessings
            .get(from)
            .ok_or(ManagerError::BlessingNotFound(*from))?
            .target()
            .clone();
        if !self.groups.contains(&issuer) {
            return Err(ManagerError::InvalidOperation(format!(
                "{} cannot delegate as {}",
                self.local, issuer
            )));
        }
        self.blessings.check_bless(from, &target)?;

        let id = BlessingId::derive(Some(&issuer), &target);
        if self.blessings.get(&id).is_some_and(Blessing::is_synced) {
            return Ok(id);
        }

        self.pending_removals.remove(&id);
        let record = self
            .store
            .create_blessing(&BlessingRecord::new(Some(issuer), target.clone()))
            .await?;
        if self.apply_record(&record) {
            self.notify_blessing_updated(&id);
        }
        self.refresh_permissions();

        tracing::info!(blessing = %id, target = %target, "blessed");
        Ok(id)
    }

    /// Set the own mask at `path` of a blessing issued locally.
    pub async fn set_permissions(&mut self, id: &BlessingId, path: &str, mask: PermissionMask) -> Result<()> {
        self.ensure_running()?;
        self.writable(id)?.set_permissions(path, mask)?;
        let version = self.store.set_rule(id, path, mask).await?;
        self.acknowledge(id, version);
        Ok(())
    }

    /// Set the own masks at every path of `rules`.
    pub async fn set_permissions_map(
        &mut self,
        id: &BlessingId,
        rules: &BTreeMap<String, PermissionMask>,
    ) -> Result<()> {
        self.ensure_running()?;
        self.writable(id)?.set_permissions_map(rules)?;
        let mut version = 0;
        for (path, mask) in rules {
            version = self.store.set_rule(id, path, *mask).await?;
        }
        self.acknowledge(id, version);
        Ok(())
    }

    /// Remove specific flags from the own mask at `path`.
    pub async fn clear_permissions(&mut self, id: &BlessingId, path: &str, mask: PermissionMask) -> Result<()> {
        self.ensure_running()?;
        let blessing = self.writable(id)?;
        blessing.clear_permissions(path, mask)?;
        let Some(own) = blessing.tree().node(path).map(|node| node.own()) else {
            return Ok(());
        };
        let version = self.store.set_rule(id, path, own).await?;
        self.acknowledge(id, version);
        Ok(())
    }

    /// Remove every rule at and below `path`, or all rules if `None`.
    pub async fn revoke_permissions(&mut self, id: &BlessingId, path: Option<&str>) -> Result<()> {
        self.ensure_running()?;
        self.writable(id)?.revoke_permissions(path)?;
        let version = self.store.remove_rules(id, path).await?;
        self.acknowledge(id, version);
        Ok(())
    }

    /// Revoke a blessing and every blessing depending on it.
    ///
    /// Local state and listeners update before the store deletions are
    /// issued.
    pub async fn revoke(&mut self, id: &BlessingId) -> Result<()> {
        self.ensure_running()?;
        if !self.blessings.contains(id) {
            return Err(ManagerError::BlessingNotFound(*id));
        }
        self.revoke_cascade(vec![*id], true).await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    /// Watch the effective permission at `path`.
    ///
    /// The listener is called immediately with the current value, then on
    /// every change.
    pub fn add_permission_listener(
        &mut self,
        path: impl Into<String>,
        mut listener: impl OnPermissionChangeListener + 'static,
    ) -> Result<ListenerId> {
        let path = path.into();
        path::validate(&path)?;

        let id = self.next_listener_id();
        let value = self.effective.get(&path);
        listener.on_permission_change(value);

        let nearest = self.effective.nearest_ancestor(&path).to_string();
        self.nearest_ancestors
            .entry(nearest)
            .or_default()
            .insert(path.clone());
        self.listeners_by_path
            .entry(path.clone())
            .or_default()
            .insert(id);
        self.permission_listeners.insert(
            id,
            PermissionListener {
                path,
                last: value,
                listener: Box::new(listener),
            },
        );
        Ok(id)
    }

    /// Remove a permission listener. Returns false if it was not registered.
    pub fn remove_permission_listener(&mut self, id: ListenerId) -> bool {
        let Some(entry) = self.permission_listeners.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.listeners_by_path.get_mut(&entry.path) {
            ids.remove(&id);
            if ids.is_empty() {
                self.listeners_by_path.remove(&entry.path);
                for paths in self.nearest_ancestors.values_mut() {
                    paths.remove(&entry.path);
                }
                self.nearest_ancestors.retain(|_, paths| !paths.is_empty());
            }
        }
        true
    }

    /// Observe a tracked blessing. A synced blessing is reported at once.
    pub fn add_blessing_listener(
        &mut self,
        id: &BlessingId,
        mut listener: impl OnBlessingUpdatedListener + 'static,
    ) -> Result<ListenerId> {
        let blessing = self
            .blessings
            .get(id)
            .ok_or(ManagerError::BlessingNotFound(*id))?;
        if blessing.is_synced() {
            listener.on_blessing_updated(blessing);
        }

        let listener_id = self.next_listener_id();
        self.blessing_listeners.insert(
            listener_id,
            BlessingListener {
                blessing: *id,
                listener: Box::new(listener),
            },
        );
        Ok(listener_id)
    }

    /// Remove a blessing listener. Returns false if it was not registered.
    pub fn remove_blessing_listener(&mut self, id: ListenerId) -> bool {
        self.blessing_listeners.remove(&id).is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Tear the manager down: withdraw active requests, revoke every blessing
    /// the local principal owns, and detach from the store.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }

        let groups: BTreeSet<Principal> = self.active_requests.keys().map(|(group, _)| group.clone()).collect();
        for group in groups {
            if let Err(err) = self.cancel_requests(group).await {
                tracing::warn!(error = %err, "failed to cancel requests during shutdown");
            }
        }

        let owned: Vec<BlessingId> = self
            .blessings
            .iter()
            .filter(|b| self.owns(b))
            .map(|b| *b.id())
            .collect();
        self.revoke_cascade(owned, true).await;

        let subscriptions: Vec<SubscriptionId> = self.subscriptions.keys().copied().collect();
        for subscription in subscriptions {
            self.unsubscribe(subscription).await;
        }
        self.watched.clear();
        self.shut_down = true;

        tracing::info!(principal = %self.local, "permission manager shut down");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            return Err(ManagerError::InvalidOperation("manager is shut down".to_string()));
        }
        Ok(())
    }

    pub(crate) fn next_listener_id(&mut self) -> ListenerId {
        let id = ListenerId::from_raw(self.next_listener);
        self.next_listener += 1;
        id
    }

    pub(crate) async fn subscribe(&mut self, subscription: Subscription) -> Result<SubscriptionId> {
        let id = self
            .store
            .subscribe(subscription.clone(), self.sender.clone())
            .await?;
        self.subscriptions.insert(id, subscription);
        Ok(id)
    }

    pub(crate) async fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
        if let Err(err) = self.store.unsubscribe(id).await {
            tracing::warn!(subscription = id.0, error = %err, "failed to unsubscribe");
        }
    }

    /// Watch the blessings `principal` receives, so its authority can be
    /// computed locally.
    pub(crate) async fn watch_principal(&mut self, principal: &Principal) -> Result<()> {
        if self.watched.contains_key(principal) {
            return Ok(());
        }
        let subscription = self
            .subscribe(Subscription::BlessingsByTarget(principal.clone()))
            .await?;
        self.watched.insert(principal.clone(), subscription);
        Ok(())
    }

    /// True if the local principal may write `blessing`.
    pub(crate) fn owns(&self, blessing: &Blessing) -> bool {
        match blessing.source() {
            None => *blessing.target() == self.local,
            Some(source) => self.groups.contains(source),
        }
    }

    fn writable(&mut self, id: &BlessingId) -> Result<&mut Blessing> {
        let blessing = self
            .blessings
            .get(id)
            .ok_or(ManagerError::BlessingNotFound(*id))?;
        if !self.owns(blessing) {
            return Err(ManagerError::InvalidOperation(format!(
                "blessing {} is not issued by {}",
                id, self.local
            )));
        }
        self.blessings
            .get_mut(id)
            .ok_or(ManagerError::BlessingNotFound(*id))
    }

    fn acknowledge(&mut self, id: &BlessingId, version: u64) {
        if let Some(blessing) = self.blessings.get_mut(id) {
            blessing.acknowledge(version);
        }
        self.notify_blessing_updated(id);
        self.refresh_permissions();
    }

    /// Apply a stored record, tracking its blessing if it is new.
    ///
    /// Returns true if the blessing's rules changed.
    pub(crate) fn apply_record(&mut self, record: &BlessingRecord) -> bool {
        let (blessing, inserted) = self
            .blessings
            .get_or_insert(record.source.clone(), record.target.clone());
        match blessing.apply_record(record) {
            Ok(changed) => changed,
            Err(PermsError::StaleWrite { current, incoming }) => {
                tracing::debug!(blessing = %record.id, current, incoming, "ignoring stale snapshot");
                false
            }
            Err(err) => {
                tracing::warn!(blessing = %record.id, error = %err, "ignoring blessing snapshot");
                if inserted {
                    self.blessings.remove(&record.id);
                }
                false
            }
        }
    }

    pub(crate) fn notify_blessing_updated(&mut self, id: &BlessingId) {
        let Some(blessing) = self.blessings.get(id) else {
            return;
        };
        for entry in self.blessing_listeners.values_mut() {
            if entry.blessing == *id {
                entry.listener.on_blessing_updated(blessing);
            }
        }
    }

    /// Stop tracking a blessing and tell its listeners it is gone.
    ///
    /// With `expect_removal`, snapshots of it are ignored until the store
    /// confirms the deletion.
    pub(crate) fn untrack(&mut self, id: &BlessingId, expect_removal: bool) -> Option<Blessing> {
        let mut blessing = self.blessings.remove(id)?;
        blessing.revoke();
        if expect_removal {
            self.pending_removals.insert(*id);
        }

        self.release_blessing_listeners(&blessing);

        tracing::info!(blessing = %id, target = %blessing.target(), "blessing revoked");
        Some(blessing)
    }

    /// Detach every listener of `blessing`, telling each it is gone.
    fn release_blessing_listeners(&mut self, blessing: &Blessing) {
        let listeners: Vec<ListenerId> = self
            .blessing_listeners
            .iter()
            .filter(|(_, entry)| entry.blessing == *blessing.id())
            .map(|(listener_id, _)| *listener_id)
            .collect();
        for listener_id in listeners {
            if let Some(mut entry) = self.blessing_listeners.remove(&listener_id) {
                entry.listener.on_blessing_removed(blessing);
            }
        }
    }

    /// Revoke `start` and, transitively, every blessing issued by a target
    /// of a revoked blessing. With `query_store`, issued blessings the
    /// manager does not track are found through the store as well.
    pub(crate) async fn revoke_cascade(&mut self, start: Vec<BlessingId>, query_store: bool) {
        let mut doomed: Vec<(BlessingId, Principal)> = start
            .iter()
            .filter_map(|id| self.blessings.get(id).map(|b| (*id, b.target().clone())))
            .collect();
        let mut seen: HashSet<BlessingId> = doomed.iter().map(|(id, _)| *id).collect();
        let mut expanded = BTreeSet::new();

        let mut index = 0;
        while index < doomed.len() {
            let target = doomed[index].1.clone();
            index += 1;
            if !expanded.insert(target.clone()) {
                continue;
            }

            let mut children: Vec<(BlessingId, Principal)> = self
                .blessings
                .issued_by(&target)
                .map(|b| (*b.id(), b.target().clone()))
                .collect();
            if query_store {
                match self.store.blessings_by_source(&target).await {
                    Ok(records) => children.extend(records.into_iter().map(|r| (r.id, r.target))),
                    Err(err) => {
                        tracing::warn!(source = %target, error = %err, "failed to look up issued blessings")
                    }
                }
            }
            for child in children {
                if seen.insert(child.0) {
                    doomed.push(child);
                }
            }
        }

        for (id, _) in &doomed {
            self.untrack(id, true);
        }
        self.refresh_permissions();

        for (id, _) in doomed {
            if let Err(err) = self.store.remove_blessing(&id).await {
                tracing::warn!(blessing = %id, error = %err, "failed to delete blessing record");
            }
        }
    }

    /// Recompute the effective tree and notify listeners whose resolved
    /// permission changed.
    pub(crate) fn refresh_permissions(&mut self) {
        let tree = self.blessings.effective_tree(self.groups.iter());
        let changed = changed_paths(&self.effective, &tree);
        if changed.is_empty() {
            return;
        }

        let mut candidates: BTreeSet<String> = changed
            .iter()
            .filter_map(|rule| self.nearest_ancestors.get(rule))
            .flatten()
            .cloned()
            .collect();

        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for listener_path in self.listeners_by_path.keys() {
            let nearest = tree.nearest_ancestor(listener_path);
            if changed.contains(nearest) {
                candidates.insert(listener_path.clone());
            }
            index
                .entry(nearest.to_string())
                .or_default()
                .insert(listener_path.clone());
        }
        self.nearest_ancestors = index;

        self.reader.replace(tree.clone());
        self.effective = tree;
        tracing::debug!(
            principal = %self.local,
            changed = changed.len(),
            candidates = candidates.len(),
            "refreshed permissions"
        );

        for listener_path in candidates {
            let value = self.effective.get(&listener_path);
            let Some(ids) = self.listeners_by_path.get(&listener_path) else {
                continue;
            };
            for id in ids {
                if let Some(entry) = self.permission_listeners.get_mut(id) {
                    if entry.last != value {
                        entry.last = value;
                        entry.listener.on_permission_change(value);
                    }
                }
            }
        }
    }
}

/// Paths added, removed, or whose effective mask differs between trees.
fn changed_paths(old: &PermissionTree, new: &PermissionTree) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = old
        .rules()
        .iter()
        .filter(|(path, mask)| new.rules().get(*path) != Some(*mask))
        .map(|(path, _)| path.clone())
        .collect();
    changed.extend(
        new.rules()
            .keys()
            .filter(|path| !old.rules().contains_key(*path))
            .cloned(),
    );
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(rules: &[(&str, PermissionMask)]) -> PermissionTree {
        let mut tree = PermissionTree::new();
        for (path, mask) in rules {
            tree.set_own(path, *mask).unwrap();
        }
        tree
    }

    #[test]
    fn test_changed_paths_covers_added_removed_and_changed() {
        let old = tree(&[("a", PermissionMask::READ), ("b", PermissionMask::READ)]);
        let new = tree(&[("a", PermissionMask::WRITE), ("c", PermissionMask::READ)]);

        let changed = changed_paths(&old, &new);
        assert!(changed.contains("a"));
        assert!(changed.contains("b"));
        assert!(changed.contains("c"));
        assert!(!changed.contains(""));
    }

    #[test]
    fn test_changed_paths_of_identical_trees() {
        let old = tree(&[("a/b", PermissionMask::READ)]);
        assert!(changed_paths(&old, &old.clone()).is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = ManagerConfig::default()
            .with_group("public")
            .with_event_batch_limit(0)
            .with_request_expiry(Duration::from_secs(30));
        assert_eq!(config.groups, vec![Principal::from("public")]);
        assert_eq!(config.event_batch_limit, 1);
        assert_eq!(config.request_expiry, Some(Duration::from_secs(30)));
    }
}
