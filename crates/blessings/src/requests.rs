//! The request/grant protocol.
//!
//! Requesters broadcast [`PermissionRequest`]s into the shared requests
//! collection. Every other manager that can satisfy a request in full
//! offers it to its request listeners; the first listener to claim it takes
//! over, and later updates go only to claimants. Granting blesses the
//! requester, writes the rules, and finalizes the record with a
//! resolution.

use std::collections::{BTreeMap, BTreeSet};

use blessings_core::{
    path, BlessingId, PermissionMask, PermissionRequest, Principal, RequestId, RequestResolution,
};
use blessings_perms::{
    can_grant, request, ListenerId, OnRequestListener, PermissionRequestBuilder, RequestResponse,
    RequestState,
};
use blessings_store::{Store, StoreExt};

use crate::error::{ManagerError, Result};
use crate::manager::{PermissionManager, RequestListener};

/// A request from another principal this manager could satisfy.
pub(crate) struct InboundRequest {
    pub(crate) request: PermissionRequest,
    /// Listeners that claimed it.
    pub(crate) claimed: BTreeSet<ListenerId>,
}

/// A request issued by the local principal.
pub(crate) struct OutboundRequest {
    pub(crate) group: Principal,
    pub(crate) request: PermissionRequest,
    pub(crate) state: RequestState,
}

impl<S: Store> PermissionManager<S> {
    // ─────────────────────────────────────────────────────────────────────────
    // Requester Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Broadcast a request on behalf of `group`.
    ///
    /// A live request for the same group and path is updated in place and
    /// keeps its id.
    pub async fn request(&mut self, group: impl Into<Principal>, builder: &PermissionRequestBuilder) -> Result<RequestId> {
        self.ensure_running()?;
        let group = group.into();
        let key = (group.clone(), builder.path().to_string());
        let id = self
            .active_requests
            .get(&key)
            .copied()
            .unwrap_or_else(RequestId::random);

        let request = builder.build(id, self.local.clone())?;
        // Nothing is tracked until the store accepts the record.
        let stored = self.store.put_request(&request).await?;
        self.outbound.insert(
            id,
            OutboundRequest {
                group,
                request: stored,
                state: RequestState::Broadcast,
            },
        );
        self.active_requests.insert(key, id);

        tracing::info!(request = %id, path = %builder.path(), mask = %builder.mask(), "broadcast permission request");
        Ok(id)
    }

    /// Withdraw the live request for `group` at `path`.
    pub async fn cancel_request(&mut self, group: impl Into<Principal>, path: &str) -> Result<bool> {
        let key = (group.into(), path.to_string());
        let Some(id) = self.active_requests.remove(&key) else {
            return Ok(false);
        };
        if let Some(entry) = self.outbound.get_mut(&id) {
            if !entry.state.is_terminal() {
                entry.state = RequestState::Cancelled;
            }
        }
        self.store.remove_request(&id).await?;
        tracing::info!(request = %id, path, "cancelled permission request");
        Ok(true)
    }

    /// Withdraw every live request of `group`. Returns how many were live.
    pub async fn cancel_requests(&mut self, group: impl Into<Principal>) -> Result<usize> {
        let group = group.into();
        let paths: Vec<String> = self
            .active_requests
            .keys()
            .filter(|(g, _)| *g == group)
            .map(|(_, path)| path.clone())
            .collect();

        let mut cancelled = 0;
        for path in paths {
            if self.cancel_request(group.clone(), &path).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// State of a request issued by the local principal.
    pub fn request_state(&self, id: &RequestId) -> Option<RequestState> {
        self.outbound.get(id).map(|entry| entry.state)
    }

    /// A local request as last written, with its store timestamp.
    pub fn outbound_request(&self, id: &RequestId) -> Option<&PermissionRequest> {
        self.outbound.get(id).map(|entry| &entry.request)
    }

    /// The group a local request was issued for.
    pub fn request_group(&self, id: &RequestId) -> Option<&Principal> {
        self.outbound.get(id).map(|entry| &entry.group)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Granter Side
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a request listener for `pattern` (`a/b`, `a/b/*`, or `*`).
    ///
    /// Known matching requests nobody has claimed yet are offered to the new
    /// listener right away.
    pub async fn add_request_listener(
        &mut self,
        pattern: impl Into<String>,
        listener: impl OnRequestListener + 'static,
    ) -> Result<ListenerId> {
        let pattern = pattern.into();
        path::validate_pattern(&pattern)?;

        let id = self.next_listener_id();
        let known: Vec<RequestId> = self
            .inbound
            .iter()
            .filter(|(_, entry)| {
                entry.claimed.is_empty()
                    && request::matches(&pattern, &entry.request)
                    && can_grant(&entry.request, &self.effective)
            })
            .map(|(request_id, _)| *request_id)
            .collect();
        self.request_listeners.insert(
            id,
            RequestListener {
                pattern,
                listener: Box::new(listener),
            },
        );

        let to_grant: Vec<RequestId> = known
            .into_iter()
            .filter(|request_id| self.offer(request_id, Some(id)))
            .collect();
        for request_id in to_grant {
            self.grant_request(&request_id).await?;
        }
        Ok(id)
    }

    /// Remove a request listener and release its claims.
    pub fn remove_request_listener(&mut self, id: ListenerId) -> bool {
        for entry in self.inbound.values_mut() {
            entry.claimed.remove(&id);
        }
        self.request_listeners.remove(&id).is_some()
    }

    /// Known inbound requests visible from `path`: those at `path` itself
    /// and, for a pattern such as `a/*`, those at or below `a`.
    pub fn requests_at(&self, path: &str) -> Vec<&PermissionRequest> {
        self.inbound
            .values()
            .filter(|entry| request::matches(path, &entry.request))
            .map(|entry| &entry.request)
            .collect()
    }

    /// Grant the primary path of a request to its requester.
    pub async fn grant_request(&mut self, id: &RequestId) -> Result<BlessingId> {
        self.grant(id, false).await
    }

    /// Grant the primary path and every suggested path of a request.
    pub async fn grant_all(&mut self, id: &RequestId) -> Result<BlessingId> {
        self.grant(id, true).await
    }

    /// Decline a request for every peer: mark it rejected, then remove it.
    pub async fn reject_request(&mut self, id: &RequestId) -> Result<()> {
        self.ensure_running()?;
        if !self.inbound.contains_key(id) {
            return Err(ManagerError::RequestNotFound(*id));
        }
        self.resolve(id, RequestResolution::Rejected).await
    }

    /// Remove a request without recording a resolution.
    pub async fn finish_request(&mut self, id: &RequestId) -> Result<()> {
        self.ensure_running()?;
        self.forget_request(id);
        self.store.remove_request(id).await?;
        Ok(())
    }

    async fn grant(&mut self, id: &RequestId, include_suggestions: bool) -> Result<BlessingId> {
        self.ensure_running()?;
        let request = self
            .inbound
            .get(id)
            .map(|entry| entry.request.clone())
            .ok_or(ManagerError::RequestNotFound(*id))?;
        if !can_grant(&request, &self.effective) {
            return Err(ManagerError::InvalidOperation(format!(
                "{} cannot satisfy request {}",
                self.local, id
            )));
        }

        let blessing_id = self.bless(request.source.clone()).await?;

        let mut wanted = BTreeMap::new();
        wanted.insert(request.path.clone(), request.mask);
        if include_suggestions {
            wanted.extend(request.suggestions.clone());
        }

        // Add to, never narrow, what the requester already holds.
        let rules: BTreeMap<String, PermissionMask> = match self.blessings.get(&blessing_id) {
            Some(blessing) => wanted
                .into_iter()
                .map(|(p, mask)| {
                    let own = blessing.tree().node(&p).map(|node| node.own()).unwrap_or_default();
                    (p, mask | own)
                })
                .collect(),
            None => wanted,
        };
        self.set_permissions_map(&blessing_id, &rules).await?;
        self.resolve(id, RequestResolution::Granted).await?;

        tracing::info!(request = %id, requester = %request.source, "granted permission request");
        Ok(blessing_id)
    }

    async fn resolve(&mut self, id: &RequestId, resolution: RequestResolution) -> Result<()> {
        self.forget_request(id);
        self.store.resolve_request(id, resolution).await?;
        Ok(())
    }

    /// Offer an inbound request to listeners.
    ///
    /// With `only`, just that listener is asked. Otherwise claimants are
    /// asked if there are any, every matching listener if not. Returns true
    /// if a listener asked for the request to be granted.
    pub(crate) fn offer(&mut self, id: &RequestId, only: Option<ListenerId>) -> bool {
        let Some(entry) = self.inbound.get_mut(id) else {
            return false;
        };
        let blessing = self.blessings.find(Some(&self.local), &entry.request.source);

        let asked: Vec<ListenerId> = match only {
            Some(listener_id) => vec![listener_id],
            None if !entry.claimed.is_empty() => entry.claimed.iter().copied().collect(),
            None => self
                .request_listeners
                .iter()
                .filter(|(_, l)| request::matches(&l.pattern, &entry.request))
                .map(|(listener_id, _)| *listener_id)
                .collect(),
        };

        let mut grant = false;
        for listener_id in asked {
            let Some(registered) = self.request_listeners.get_mut(&listener_id) else {
                entry.claimed.remove(&listener_id);
                continue;
            };
            let response = registered.listener.on_request(&entry.request, blessing);
            if response.is_handled() {
                entry.claimed.insert(listener_id);
            } else {
                entry.claimed.remove(&listener_id);
            }
            grant |= response == RequestResponse::Grant;
        }
        grant
    }

    /// Drop an inbound request, telling its claimants.
    pub(crate) fn forget_request(&mut self, id: &RequestId) {
        let Some(entry) = self.inbound.remove(id) else {
            return;
        };
        let blessing = self.blessings.find(Some(&self.local), &entry.request.source);
        for listener_id in &entry.claimed {
            if let Some(registered) = self.request_listeners.get_mut(listener_id) {
                registered.listener.on_request_removed(&entry.request, blessing);
            }
        }
    }

    pub(crate) async fn on_request_upserted(&mut self, incoming: PermissionRequest) -> Result<()> {
        if incoming.source == self.local {
            if let Some(resolution) = incoming.resolution {
                self.finish_outbound(&incoming.id, resolution.into());
            }
            return Ok(());
        }
        if incoming.resolution.is_some() {
            return Ok(());
        }
        if let Err(err) = incoming.validate() {
            tracing::warn!(request = %incoming.id, error = %err, "ignoring malformed request");
            return Ok(());
        }
        if self.is_expired(&incoming) {
            tracing::debug!(request = %incoming.id, "ignoring expired request");
            return Ok(());
        }
        if !can_grant(&incoming, &self.effective) {
            tracing::debug!(
                principal = %self.local,
                request = %incoming.id,
                path = %incoming.path,
                "cannot satisfy request"
            );
            self.forget_request(&incoming.id);
            return Ok(());
        }

        let id = incoming.id;
        match self.inbound.get_mut(&id) {
            Some(entry) => entry.request = incoming,
            None => {
                self.inbound.insert(
                    id,
                    InboundRequest {
                        request: incoming,
                        claimed: BTreeSet::new(),
                    },
                );
            }
        }

        if self.offer(&id, None) {
            self.grant_request(&id).await?;
        }
        Ok(())
    }

    pub(crate) fn on_request_removed(&mut self, removed: PermissionRequest) {
        if removed.source == self.local {
            let state = removed
                .resolution
                .map(RequestState::from)
                .unwrap_or(RequestState::Cancelled);
            self.finish_outbound(&removed.id, state);
            return;
        }
        self.forget_request(&removed.id);
    }

    fn finish_outbound(&mut self, id: &RequestId, state: RequestState) {
        if let Some(entry) = self.outbound.get_mut(id) {
            if !entry.state.is_terminal() {
                entry.state = state;
                tracing::info!(request = %id, ?state, "permission request finished");
            }
        }
        self.active_requests.retain(|_, active| *active != *id);
    }

    fn is_expired(&self, request: &PermissionRequest) -> bool {
        let Some(expiry) = self.config.request_expiry else {
            return false;
        };
        let age = now_millis().saturating_sub(request.timestamp);
        age > i64::try_from(expiry.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
