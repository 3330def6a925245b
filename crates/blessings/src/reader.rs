//! Concurrent read access to the effective permission tree.

use std::sync::{Arc, PoisonError, RwLock};

use blessings_core::{PermissionMask, PermissionTree};

/// A cloneable, thread-safe view of a manager's effective permissions.
///
/// The manager replaces the tree wholesale on every refresh, so a reader
/// always observes a complete tree, never a partially merged one.
#[derive(Debug, Clone, Default)]
pub struct PermissionReader {
    tree: Arc<RwLock<PermissionTree>>,
}

impl PermissionReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Effective mask at `path`, resolved through the nearest ancestor.
    pub fn get(&self, path: &str) -> PermissionMask {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
    }

    /// A copy of the current effective tree.
    pub fn snapshot(&self) -> PermissionTree {
        self.tree
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new tree, returning the previous one.
    pub(crate) fn replace(&self, tree: PermissionTree) -> PermissionTree {
        let mut guard = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sees_replacement_from_other_thread() {
        let reader = PermissionReader::new();
        let handle = reader.clone();

        let mut tree = PermissionTree::new();
        tree.set_own("docs", PermissionMask::READ).unwrap();
        reader.replace(tree);

        let seen = std::thread::spawn(move || handle.get("docs/1"))
            .join()
            .unwrap();
        assert_eq!(seen, PermissionMask::READ);
    }
}
