//! Blessings: one principal delegating a permission tree to another.
//!
//! A [`Blessing`] is the in-memory twin of a [`BlessingRecord`]. It holds
//! the rules exactly as written by its source; clipping against the
//! source's own authority happens when trees are merged, never here.
//!
//! ## Lifecycle
//!
//! ```text
//! Unsynced --first snapshot--> Synced --snapshot--> Synced
//!     |                          |
//!     +--------revoke------------+--> Revoked (terminal)
//! ```

use std::collections::BTreeMap;

use blessings_core::{BlessingId, BlessingRecord, PermissionMask, PermissionTree, Principal};

use crate::error::{PermsError, Result};

/// Synchronization state of a blessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlessingState {
    /// Created locally or discovered, no snapshot observed yet.
    Unsynced,
    /// At least one snapshot has been applied.
    Synced,
    /// Terminal. The blessing grants nothing.
    Revoked,
}

/// A delegation of a permission tree from `source` to `target`.
#[derive(Debug, Clone)]
pub struct Blessing {
    id: BlessingId,
    source: Option<Principal>,
    target: Principal,
    tree: PermissionTree,
    state: BlessingState,
    version: u64,
}

impl Blessing {
    /// Create an unsynced blessing `source -> target`.
    pub fn new(source: Option<Principal>, target: Principal) -> Self {
        Self {
            id: BlessingId::derive(source.as_ref(), &target),
            source,
            target,
            tree: PermissionTree::new(),
            state: BlessingState::Unsynced,
            version: 0,
        }
    }

    /// Create an unsynced self-issued root blessing for `target`.
    pub fn root(target: Principal) -> Self {
        Self::new(None, target)
    }

    /// Create a synced blessing from a stored record.
    pub fn from_record(record: &BlessingRecord) -> Result<Self> {
        let mut blessing = Self::new(record.source.clone(), record.target.clone());
        if blessing.id != record.id {
            return Err(PermsError::InvalidOperation(format!(
                "record id {} does not match its source and target",
                record.id
            )));
        }
        blessing.apply_record(record)?;
        Ok(blessing)
    }

    pub fn id(&self) -> &BlessingId {
        &self.id
    }

    /// The delegating principal, `None` for a root blessing.
    pub fn source(&self) -> Option<&Principal> {
        self.source.as_ref()
    }

    pub fn target(&self) -> &Principal {
        &self.target
    }

    /// The rules as written by the source, before any clipping.
    pub fn tree(&self) -> &PermissionTree {
        &self.tree
    }

    pub fn state(&self) -> BlessingState {
        self.state
    }

    /// Version of the last applied snapshot or acknowledged write.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_root(&self) -> bool {
        self.source.is_none()
    }

    pub fn is_synced(&self) -> bool {
        self.state == BlessingState::Synced
    }

    pub fn is_revoked(&self) -> bool {
        self.state == BlessingState::Revoked
    }

    /// The blessing this one descends from: the source's root blessing.
    pub fn parent_id(&self) -> Option<BlessingId> {
        self.source.as_ref().map(BlessingId::root)
    }

    /// Effective mask at `path` under this blessing's own rules.
    pub fn permissions(&self, path: &str) -> PermissionMask {
        if self.is_synced() {
            self.tree.get(path)
        } else {
            PermissionMask::NONE
        }
    }

    /// Apply a snapshot from the store.
    ///
    /// Returns true if the rules changed. A snapshot older than the applied
    /// version is rejected with [`PermsError::StaleWrite`]; one at the same
    /// version is a no-op.
    pub fn apply_record(&mut self, record: &BlessingRecord) -> Result<bool> {
        self.ensure_live()?;
        if self.is_synced() {
            if record.version < self.version {
                return Err(PermsError::StaleWrite {
                    current: self.version,
                    incoming: record.version,
                });
            }
            if record.version == self.version {
                return Ok(false);
            }
        }

        let tree = record.tree()?;
        let changed = !self.is_synced() || tree != self.tree;
        self.tree = tree;
        self.version = record.version;
        self.state = BlessingState::Synced;
        Ok(changed)
    }

    /// Record the version the store assigned to a local write.
    pub fn acknowledge(&mut self, version: u64) {
        self.version = self.version.max(version);
    }

    /// Replace the own mask at `path`.
    pub fn set_permissions(&mut self, path: &str, mask: PermissionMask) -> Result<()> {
        self.ensure_writable()?;
        self.tree.set_own(path, mask)?;
        Ok(())
    }

    /// Replace the own masks at every path of `rules`.
    ///
    /// Every path is validated before any is written.
    pub fn set_permissions_map(&mut self, rules: &BTreeMap<String, PermissionMask>) -> Result<()> {
        self.ensure_writable()?;
        for path in rules.keys() {
            blessings_core::path::validate(path)?;
        }
        for (path, mask) in rules {
            self.tree.set_own(path, *mask)?;
        }
        Ok(())
    }

    /// Remove specific flags from the own mask at `path`.
    pub fn clear_permissions(&mut self, path: &str, mask: PermissionMask) -> Result<()> {
        self.ensure_writable()?;
        self.tree.clear_own(path, mask)?;
        Ok(())
    }

    /// Remove every rule at and below `path`, or every rule if `None`.
    pub fn revoke_permissions(&mut self, path: Option<&str>) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self.tree.remove(path.unwrap_or(blessings_core::path::ROOT))?;
        Ok(removed)
    }

    /// Move to the terminal state. Returns false if already revoked.
    pub fn revoke(&mut self) -> bool {
        if self.is_revoked() {
            return false;
        }
        self.state = BlessingState::Revoked;
        self.tree = PermissionTree::new();
        true
    }

    /// The stored form of this blessing.
    pub fn to_record(&self) -> BlessingRecord {
        BlessingRecord {
            id: self.id,
            source: self.source.clone(),
            target: self.target.clone(),
            rules: self.tree.to_snapshot(),
            version: self.version,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_revoked() {
            return Err(PermsError::Revoked(self.id));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_live()?;
        if !self.is_synced() {
            return Err(PermsError::Unsynced(self.id));
        }
        Ok(())
    }
}
