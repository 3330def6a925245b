//! Store record shapes.
//!
//! Each blessing corresponds 1:1 to a [`BlessingRecord`] keyed by its id;
//! each permission request to a [`PermissionRequest`] in the shared
//! requests collection. Records encode to CBOR for storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::mask::PermissionMask;
use crate::path;
use crate::tree::PermissionTree;
use crate::types::{BlessingId, Principal, RequestId};

/// Description key conventionally holding a human-readable request title.
pub const DESCRIPTION_TITLE: &str = "title";

/// The stored form of a blessing `source -> target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlessingRecord {
    /// Derived from `(source, target)`.
    pub id: BlessingId,

    /// The delegating principal. `None` for a self-issued root blessing.
    pub source: Option<Principal>,

    /// The principal (or group) receiving the rules.
    pub target: Principal,

    /// Serialized permission tree.
    pub rules: Value,

    /// Store-assigned version, bumped on every write.
    pub version: u64,
}

impl BlessingRecord {
    /// Create an empty record for `source -> target`.
    pub fn new(source: Option<Principal>, target: Principal) -> Self {
        Self {
            id: BlessingId::derive(source.as_ref(), &target),
            source,
            target,
            rules: Value::Null,
            version: 0,
        }
    }

    /// Create an empty self-issued root record for `target`.
    pub fn root(target: Principal) -> Self {
        Self::new(None, target)
    }

    /// True if this is a self-issued root blessing.
    pub fn is_root(&self) -> bool {
        self.source.is_none()
    }

    /// Hydrate the rules into a permission tree.
    pub fn tree(&self) -> Result<PermissionTree> {
        PermissionTree::from_snapshot(&self.rules)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

/// How a request was finalized by the granting side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestResolution {
    /// The requested permissions were granted.
    Granted,
    /// A peer declined the request.
    Rejected,
}

/// A broadcast desire for permissions at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Allocated by the requester.
    pub id: RequestId,

    /// The requesting principal.
    pub source: Principal,

    /// The primary path.
    pub path: String,

    /// Requested mask at `path`.
    pub mask: PermissionMask,

    /// Additional suggested masks at other paths (usually below `path`).
    pub suggestions: BTreeMap<String, PermissionMask>,

    /// Free-form human-readable metadata, e.g. a `title`.
    pub description: BTreeMap<String, String>,

    /// Creation time in Unix milliseconds, assigned by the store.
    pub timestamp: i64,

    /// Set by the granting side just before the record is removed.
    pub resolution: Option<RequestResolution>,
}

impl PermissionRequest {
    /// Create a request for `mask` at `path`.
    pub fn new(id: RequestId, source: Principal, path: impl Into<String>, mask: PermissionMask) -> Self {
        Self {
            id,
            source,
            path: path.into(),
            mask,
            suggestions: BTreeMap::new(),
            description: BTreeMap::new(),
            timestamp: 0,
            resolution: None,
        }
    }

    /// Every `(path, mask)` this request asks for, primary path first.
    pub fn permissions(&self) -> impl Iterator<Item = (&str, PermissionMask)> {
        std::iter::once((self.path.as_str(), self.mask))
            .chain(self.suggestions.iter().map(|(p, m)| (p.as_str(), *m)))
    }

    /// The human-readable title, if any.
    pub fn title(&self) -> Option<&str> {
        self.description.get(DESCRIPTION_TITLE).map(String::as_str)
    }

    /// Validate every path in the request.
    pub fn validate(&self) -> Result<()> {
        for (p, _) in self.permissions() {
            path::validate(p)?;
        }
        Ok(())
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
