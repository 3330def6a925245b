//! Notification shapes emitted by the permission engine.
//!
//! Listeners are owned trait objects handed to the manager and identified
//! afterwards by a [`ListenerId`]. Closures implement the single-method
//! traits directly.

use std::fmt;

use blessings_core::{PermissionMask, PermissionRequest};

use crate::blessing::Blessing;

/// Handle for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Receives the effective mask at a watched path whenever it changes.
pub trait OnPermissionChangeListener: Send {
    fn on_permission_change(&mut self, mask: PermissionMask);
}

impl<F> OnPermissionChangeListener for F
where
    F: FnMut(PermissionMask) + Send,
{
    fn on_permission_change(&mut self, mask: PermissionMask) {
        self(mask)
    }
}

/// A request listener's decision about an offered request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestResponse {
    /// Not interested. A listener that had claimed the request is released.
    Decline,
    /// Handle it: receive later updates and the removal of this request.
    Claim,
    /// Grant it as soon as the current fan-out completes.
    Grant,
}

impl RequestResponse {
    /// True if the listener keeps (or takes) the request.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Decline)
    }
}

/// Decides about inbound requests this principal could satisfy.
///
/// `blessing` is the existing blessing from the local principal to the
/// requester, if there is one.
pub trait OnRequestListener: Send {
    fn on_request(&mut self, request: &PermissionRequest, blessing: Option<&Blessing>) -> RequestResponse;

    /// A claimed request was removed (granted, rejected, or withdrawn).
    fn on_request_removed(&mut self, request: &PermissionRequest, blessing: Option<&Blessing>) {
        let _ = (request, blessing);
    }
}

impl<F> OnRequestListener for F
where
    F: FnMut(&PermissionRequest, Option<&Blessing>) -> RequestResponse + Send,
{
    fn on_request(&mut self, request: &PermissionRequest, blessing: Option<&Blessing>) -> RequestResponse {
        self(request, blessing)
    }
}

/// Observes one blessing.
pub trait OnBlessingUpdatedListener: Send {
    fn on_blessing_updated(&mut self, blessing: &Blessing);

    fn on_blessing_removed(&mut self, blessing: &Blessing);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_decline_releases_a_request() {
        assert!(!RequestResponse::Decline.is_handled());
        assert!(RequestResponse::Claim.is_handled());
        assert!(RequestResponse::Grant.is_handled());
    }
}
