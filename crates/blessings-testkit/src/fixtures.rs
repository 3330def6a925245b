//! Test fixtures and helpers.
//!
//! Common setup code for multi-principal integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use blessings::{ManagerConfig, PermissionManager};
use blessings_core::{BlessingId, PermissionMask, PermissionRequest, Principal, RequestId};
use blessings_perms::{
    Blessing, OnBlessingUpdatedListener, OnPermissionChangeListener, OnRequestListener, RequestResponse,
};
use blessings_store::MemoryStore;

/// Upper bound on `settle` rounds before a scenario is considered stuck.
const MAX_SETTLE_ROUNDS: usize = 1000;

/// Several managers sharing one in-memory store.
pub struct Constellation {
    store: Arc<MemoryStore>,
    managers: HashMap<Principal, PermissionManager<MemoryStore>>,
}

impl Constellation {
    /// Create an empty constellation with a fresh store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            managers: HashMap::new(),
        }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Start a manager for `name` with the default config.
    pub async fn add_principal(&mut self, name: &str) -> &mut PermissionManager<MemoryStore> {
        self.add_principal_with(name, ManagerConfig::default()).await
    }

    /// Start a manager for `name`.
    pub async fn add_principal_with(
        &mut self,
        name: &str,
        config: ManagerConfig,
    ) -> &mut PermissionManager<MemoryStore> {
        let manager = PermissionManager::new(self.store.clone(), name, config)
            .await
            .expect("failed to start manager");
        self.managers.insert(Principal::from(name), manager);
        self.manager(name)
    }

    /// The manager for `name`. Panics if it was never added.
    pub fn manager(&mut self, name: &str) -> &mut PermissionManager<MemoryStore> {
        self.managers
            .get_mut(&Principal::from(name))
            .unwrap_or_else(|| panic!("unknown principal {}", name))
    }

    /// Remove a manager without shutting it down, as if its process died.
    pub fn drop_principal(&mut self, name: &str) -> Option<PermissionManager<MemoryStore>> {
        self.managers.remove(&Principal::from(name))
    }

    /// Let every manager handle its queued events until all queues are
    /// empty. Returns the number of events handled.
    pub async fn settle(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut handled = 0;
            for manager in self.managers.values_mut() {
                handled += manager
                    .process_events()
                    .await
                    .expect("failed to process events");
            }
            if handled == 0 {
                return total;
            }
            total += handled;
        }
        panic!("events still flowing after {} rounds", MAX_SETTLE_ROUNDS);
    }

    /// Set rules on `name`'s root blessing and settle.
    pub async fn give_root(&mut self, name: &str, rules: &[(&str, PermissionMask)]) -> BlessingId {
        let manager = self.manager(name);
        let root = *manager.root_blessing_id();
        manager
            .set_permissions_map(&root, &rule_map(rules))
            .await
            .expect("failed to write root rules");
        self.settle().await;
        root
    }

    /// Bless `to` from `from`'s root blessing with `rules`, then settle.
    pub async fn grant(&mut self, from: &str, to: &str, rules: &[(&str, PermissionMask)]) -> BlessingId {
        let manager = self.manager(from);
        let id = manager.bless(to).await.expect("failed to bless");
        manager
            .set_permissions_map(&id, &rule_map(rules))
            .await
            .expect("failed to write rules");
        self.settle().await;
        id
    }
}

impl Default for Constellation {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_map(rules: &[(&str, PermissionMask)]) -> BTreeMap<String, PermissionMask> {
    rules
        .iter()
        .map(|(path, mask)| (path.to_string(), *mask))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Recorders
// ─────────────────────────────────────────────────────────────────────────────

/// A permission listener that keeps every value it was called with.
///
/// Clones share the same log, so keep one and register the other.
#[derive(Debug, Clone, Default)]
pub struct PermissionRecorder {
    values: Arc<Mutex<Vec<PermissionMask>>>,
}

impl PermissionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value received, in order.
    pub fn values(&self) -> Vec<PermissionMask> {
        lock(&self.values).clone()
    }

    pub fn last(&self) -> Option<PermissionMask> {
        lock(&self.values).last().copied()
    }

    pub fn count(&self) -> usize {
        lock(&self.values).len()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        lock(&self.values).clear();
    }
}

impl OnPermissionChangeListener for PermissionRecorder {
    fn on_permission_change(&mut self, mask: PermissionMask) {
        lock(&self.values).push(mask);
    }
}

#[derive(Debug)]
struct RequestLog {
    response: RequestResponse,
    offered: Vec<PermissionRequest>,
    removed: Vec<PermissionRequest>,
}

/// A request listener that answers every offer with a fixed response.
#[derive(Debug, Clone)]
pub struct RequestRecorder {
    log: Arc<Mutex<RequestLog>>,
}

impl RequestRecorder {
    pub fn new(response: RequestResponse) -> Self {
        Self {
            log: Arc::new(Mutex::new(RequestLog {
                response,
                offered: Vec::new(),
                removed: Vec::new(),
            })),
        }
    }

    /// Change the answer given to later offers.
    pub fn set_response(&self, response: RequestResponse) {
        lock(&self.log).response = response;
    }

    /// Every request offered, in order, repeats included.
    pub fn offered(&self) -> Vec<PermissionRequest> {
        lock(&self.log).offered.clone()
    }

    pub fn offered_ids(&self) -> Vec<RequestId> {
        lock(&self.log).offered.iter().map(|r| r.id).collect()
    }

    /// Ids of claimed requests that were later removed.
    pub fn removed_ids(&self) -> Vec<RequestId> {
        lock(&self.log).removed.iter().map(|r| r.id).collect()
    }
}

impl OnRequestListener for RequestRecorder {
    fn on_request(&mut self, request: &PermissionRequest, _blessing: Option<&Blessing>) -> RequestResponse {
        let mut log = lock(&self.log);
        log.offered.push(request.clone());
        log.response
    }

    fn on_request_removed(&mut self, request: &PermissionRequest, _blessing: Option<&Blessing>) {
        lock(&self.log).removed.push(request.clone());
    }
}

#[derive(Debug, Default)]
struct BlessingLog {
    updates: Vec<(BlessingId, u64)>,
    removed: Vec<BlessingId>,
}

/// A blessing listener that keeps every update and removal.
#[derive(Debug, Clone, Default)]
pub struct BlessingRecorder {
    log: Arc<Mutex<BlessingLog>>,
}

impl BlessingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(blessing, version)` for every update received.
    pub fn updates(&self) -> Vec<(BlessingId, u64)> {
        lock(&self.log).updates.clone()
    }

    pub fn removed(&self) -> Vec<BlessingId> {
        lock(&self.log).removed.clone()
    }
}

impl OnBlessingUpdatedListener for BlessingRecorder {
    fn on_blessing_updated(&mut self, blessing: &Blessing) {
        lock(&self.log)
            .updates
            .push((*blessing.id(), blessing.version()));
    }

    fn on_blessing_removed(&mut self, blessing: &Blessing) {
        lock(&self.log).removed.push(*blessing.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blessings_store::Store;

    #[tokio::test]
    async fn test_constellation_shares_one_store() {
        let mut world = Constellation::new();
        world.add_principal("root").await;
        world.add_principal("alice").await;
        world.settle().await;

        let roots = world
            .store()
            .blessings_by_target(&Principal::from("alice"))
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_root());
    }

    #[tokio::test]
    async fn test_settle_drains_to_quiescence() {
        let mut world = Constellation::new();
        world.add_principal("root").await;
        world.add_principal("alice").await;
        world.give_root("root", &[("", PermissionMask::ALL)]).await;
        world.grant("root", "alice", &[("docs", PermissionMask::READ)]).await;

        assert_eq!(world.settle().await, 0);
        assert_eq!(world.manager("alice").get_permissions("docs/1"), PermissionMask::READ);
    }

    #[test]
    fn test_permission_recorder_clones_share_log() {
        let recorder = PermissionRecorder::new();
        let mut registered = recorder.clone();
        registered.on_permission_change(PermissionMask::READ);
        registered.on_permission_change(PermissionMask::NONE);

        assert_eq!(recorder.values(), vec![PermissionMask::READ, PermissionMask::NONE]);
        assert_eq!(recorder.last(), Some(PermissionMask::NONE));

        recorder.clear();
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn test_request_recorder_answers_with_current_response() {
        let recorder = RequestRecorder::new(RequestResponse::Decline);
        let mut registered = recorder.clone();
        let request = PermissionRequest::new(
            RequestId::from_bytes([7; 16]),
            Principal::from("bob"),
            "docs",
            PermissionMask::READ,
        );

        assert_eq!(registered.on_request(&request, None), RequestResponse::Decline);
        recorder.set_response(RequestResponse::Claim);
        assert_eq!(registered.on_request(&request, None), RequestResponse::Claim);
        assert_eq!(recorder.offered_ids(), vec![request.id, request.id]);
    }
}
