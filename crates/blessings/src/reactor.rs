//! The event loop: store notifications applied one at a time.
//!
//! Every notification is processed to completion (tracking, refresh, and
//! listener fan-out) before the next one is taken off the queue.

use std::future::Future;

use blessings_core::{BlessingId, BlessingRecord, Principal};
use blessings_store::{Change, Store, StoreEvent, SubscriptionId};

use crate::error::{ManagerError, Result};
use crate::manager::PermissionManager;

impl<S: Store> PermissionManager<S> {
    /// Handle queued store events, up to the configured batch limit.
    ///
    /// Returns the number of events handled.
    pub async fn process_events(&mut self) -> Result<usize> {
        let mut handled = 0;
        while handled < self.config.event_batch_limit {
            let Ok(event) = self.events.try_recv() else {
                break;
            };
            self.handle_event(event).await;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle events as they arrive until `shutdown` resolves, then shut the
    /// manager down.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        self.shutdown().await
    }

    pub(crate) async fn handle_event(&mut self, event: StoreEvent) {
        if self.shut_down {
            return;
        }
        if !self.subscriptions.contains_key(&event.subscription) {
            tracing::debug!(subscription = event.subscription.0, "dropping event for closed subscription");
            return;
        }

        let result = match event.change {
            Change::BlessingUpserted(record) => self.on_blessing_upserted(record).await,
            Change::BlessingRemoved(record) => {
                self.on_blessing_removed(record).await;
                Ok(())
            }
            Change::BlessingMissing(id) => {
                tracing::debug!(blessing = %id, "watched blessing does not exist");
                Ok(())
            }
            Change::RequestUpserted(request) => self.on_request_upserted(request).await,
            Change::RequestRemoved(request) => {
                self.on_request_removed(request);
                Ok(())
            }
            Change::Cancelled(reason) => {
                self.on_cancelled(event.subscription, &reason);
                Ok(())
            }
        };

        if let Err(err) = result {
            tracing::warn!(principal = %self.local, error = %err, "failed to handle store event");
        }
    }

    async fn on_blessing_upserted(&mut self, record: BlessingRecord) -> Result<()> {
        if record.id != BlessingId::derive(record.source.as_ref(), &record.target) {
            tracing::warn!(blessing = %record.id, "ignoring blessing with mismatched id");
            return Ok(());
        }
        if self.pending_removals.contains(&record.id) {
            tracing::debug!(blessing = %record.id, "ignoring snapshot of revoked blessing");
            return Ok(());
        }

        if !self.apply_record(&record) {
            return Ok(());
        }
        if let Some(source) = &record.source {
            if !self.ensure_parent(&record.id, source).await? {
                return Ok(());
            }
        }
        self.notify_blessing_updated(&record.id);
        self.refresh_permissions();
        Ok(())
    }

    async fn on_blessing_removed(&mut self, record: BlessingRecord) {
        if self.pending_removals.remove(&record.id) {
            return;
        }
        let Some(tracked) = self.blessings.get(&record.id) else {
            return;
        };
        if tracked.version() > record.version {
            tracing::debug!(blessing = %record.id, "ignoring removal of an older incarnation");
            return;
        }

        self.untrack(&record.id, false);
        let dependents: Vec<BlessingId> = self
            .blessings
            .issued_by(&record.target)
            .map(|b| *b.id())
            .collect();
        if dependents.is_empty() {
            self.refresh_permissions();
        } else {
            self.revoke_cascade(dependents, false).await;
        }
    }

    /// Make sure the authority behind `source` is known locally.
    ///
    /// Returns false if `source` turned out to hold nothing at all, in
    /// which case everything it issued has been revoked.
    async fn ensure_parent(&mut self, id: &BlessingId, source: &Principal) -> Result<bool> {
        self.watch_principal(source).await?;
        if self.blessings.targeting(source).next().is_some() {
            return Ok(true);
        }
        if !self.store.blessings_by_target(source).await?.is_empty() {
            return Ok(true);
        }

        let err = ManagerError::MissingParent {
            blessing: *id,
            issuer: source.clone(),
        };
        tracing::info!(error = %err, "revoking orphaned blessings");
        let orphans: Vec<BlessingId> = self.blessings.issued_by(source).map(|b| *b.id()).collect();
        self.revoke_cascade(orphans, false).await;
        Ok(false)
    }

    fn on_cancelled(&mut self, subscription: SubscriptionId, reason: &str) {
        let cancelled = self.subscriptions.remove(&subscription);
        self.watched.retain(|_, id| *id != subscription);
        tracing::warn!(
            principal = %self.local,
            subscription = subscription.0,
            watched = ?cancelled,
            reason,
            "store cancelled subscription"
        );
    }
}
