//! Permission requests: building, gating, and lifecycle states.
//!
//! A requester builds a request with a [`PermissionRequestBuilder`] and
//! broadcasts it through the store. Peers that can satisfy it in full may
//! claim, grant, or reject it; the requester tracks its own copy through
//! [`RequestState`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use blessings_core::{
    path, PermissionMask, PermissionRequest, PermissionTree, Principal, RequestId, RequestResolution,
    DESCRIPTION_TITLE,
};

use crate::error::Result;

/// Lifecycle of a request, as seen by its requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Built locally, not yet written.
    Created,
    /// Written to the shared requests collection.
    Broadcast,
    /// A peer granted it.
    Granted,
    /// The requester withdrew it, or it vanished without a resolution.
    Cancelled,
    /// A peer rejected it.
    Rejected,
}

impl RequestState {
    /// True once no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Granted | Self::Cancelled | Self::Rejected)
    }
}

impl From<RequestResolution> for RequestState {
    fn from(resolution: RequestResolution) -> Self {
        match resolution {
            RequestResolution::Granted => Self::Granted,
            RequestResolution::Rejected => Self::Rejected,
        }
    }
}

/// Builder for a [`PermissionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequestBuilder {
    path: String,
    mask: PermissionMask,
    suggestions: BTreeMap<String, PermissionMask>,
    description: BTreeMap<String, String>,
}

impl PermissionRequestBuilder {
    /// Request `mask` at `path`.
    pub fn new(path: impl Into<String>, mask: PermissionMask) -> Self {
        Self {
            path: path.into(),
            mask,
            suggestions: BTreeMap::new(),
            description: BTreeMap::new(),
        }
    }

    /// Suggest an additional mask at another path.
    pub fn suggest(mut self, path: impl Into<String>, mask: PermissionMask) -> Self {
        self.suggestions.insert(path.into(), mask);
        self
    }

    /// Attach a description entry.
    pub fn describe(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.description.insert(key.into(), value.into());
        self
    }

    /// Attach a human-readable title.
    pub fn title(self, title: impl Into<String>) -> Self {
        self.describe(DESCRIPTION_TITLE, title)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mask(&self) -> PermissionMask {
        self.mask
    }

    /// Build the request record, validating every path.
    pub fn build(&self, id: RequestId, source: Principal) -> Result<PermissionRequest> {
        let mut request = PermissionRequest::new(id, source, self.path.clone(), self.mask);
        request.suggestions = self.suggestions.clone();
        request.description = self.description.clone();
        request.validate()?;
        Ok(request)
    }
}

/// True if `authority` fully contains every permission `request` asks for.
pub fn can_grant(request: &PermissionRequest, authority: &PermissionTree) -> bool {
    request
        .permissions()
        .all(|(p, mask)| authority.get(p).contains(mask))
}

/// True if a listener registered at `pattern` should see `request`.
pub fn matches(pattern: &str, request: &PermissionRequest) -> bool {
    path::matches_pattern(pattern, &request.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, mask: PermissionMask) -> PermissionRequest {
        PermissionRequestBuilder::new(path, mask)
            .build(RequestId::from_bytes([7; 16]), "carol".into())
            .unwrap()
    }

    #[test]
    fn test_builder_collects_metadata() {
        let request = PermissionRequestBuilder::new("docs/1", PermissionMask::READ)
            .suggest("docs/1/sub", PermissionMask::WRITE)
            .title("Share the draft")
            .build(RequestId::from_bytes([1; 16]), "carol".into())
            .unwrap();

        assert_eq!(request.title(), Some("Share the draft"));
        assert_eq!(request.suggestions.get("docs/1/sub"), Some(&PermissionMask::WRITE));
        assert_eq!(request.resolution, None);
    }

    #[test]
    fn test_builder_rejects_bad_suggestion() {
        let result = PermissionRequestBuilder::new("docs", PermissionMask::READ)
            .suggest("docs//x", PermissionMask::READ)
            .build(RequestId::from_bytes([1; 16]), "carol".into());
        assert!(result.is_err());
    }

    #[test]
    fn test_gating_requires_every_permission() {
        let mut authority = PermissionTree::new();
        authority.set_own("docs/1", PermissionMask::READ).unwrap();

        assert!(can_grant(&request("docs/1/sub", PermissionMask::READ), &authority));
        assert!(!can_grant(&request("docs/1", PermissionMask::READ | PermissionMask::WRITE), &authority));
        assert!(!can_grant(&request("docs/2", PermissionMask::READ), &authority));

        let mut wide = request("docs/1", PermissionMask::READ);
        wide.suggestions.insert("docs/2".into(), PermissionMask::READ);
        assert!(!can_grant(&wide, &authority));
    }

    #[test]
    fn test_pattern_matching() {
        let request = request("a/b/c", PermissionMask::READ);
        assert!(matches("a/b/c", &request));
        assert!(matches("a/b/c/*", &request));
        assert!(matches("a/*", &request));
        assert!(matches("*", &request));
        assert!(!matches("a/b", &request));
        assert!(!matches("a/b/c/d/*", &request));
        assert!(!matches("x/*", &request));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestState::Created.is_terminal());
        assert!(!RequestState::Broadcast.is_terminal());
        assert_eq!(RequestState::from(RequestResolution::Granted), RequestState::Granted);
        assert!(RequestState::from(RequestResolution::Rejected).is_terminal());
    }
}
