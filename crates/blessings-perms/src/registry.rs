//! The blessing arena.
//!
//! Every tracked [`Blessing`] lives in one [`BlessingTable`] keyed by its
//! id. Cross references (parent blessing, the blessings a principal
//! received or issued) are resolved by lookup, so removing a blessing can
//! never leave a dangling reference behind.
//!
//! ## Authority
//!
//! The authority of a principal `P` is the merge of every synced blessing
//! targeting `P`. A root blessing contributes its tree unbounded; any other
//! blessing `S -> P` contributes its tree clipped against the authority of
//! `S`. A principal already being evaluated further up the recursion
//! contributes only its root tree, so cyclic data written by independent
//! peers still terminates.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use blessings_core::{BlessingId, PermissionTree, Principal};

use crate::blessing::Blessing;
use crate::error::{PermsError, Result};

/// Owning table of blessings with target and source indexes.
#[derive(Debug, Default)]
pub struct BlessingTable {
    blessings: HashMap<BlessingId, Blessing>,

    /// Index: target -> blessings addressed to it.
    by_target: BTreeMap<Principal, BTreeSet<BlessingId>>,

    /// Index: source -> blessings it issued.
    by_source: BTreeMap<Principal, BTreeSet<BlessingId>>,
}

impl BlessingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blessings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blessings.is_empty()
    }

    pub fn contains(&self, id: &BlessingId) -> bool {
        self.blessings.contains_key(id)
    }

    pub fn get(&self, id: &BlessingId) -> Option<&Blessing> {
        self.blessings.get(id)
    }

    pub fn get_mut(&mut self, id: &BlessingId) -> Option<&mut Blessing> {
        self.blessings.get_mut(id)
    }

    /// Look up the blessing `source -> target`.
    pub fn find(&self, source: Option<&Principal>, target: &Principal) -> Option<&Blessing> {
        self.get(&BlessingId::derive(source, target))
    }

    /// Return the blessing `source -> target`, inserting an unsynced one if
    /// it is not tracked yet. The flag is true when a blessing was inserted.
    pub fn get_or_insert(&mut self, source: Option<Principal>, target: Principal) -> (&mut Blessing, bool) {
        let id = BlessingId::derive(source.as_ref(), &target);
        let inserted = !self.blessings.contains_key(&id);
        if inserted {
            self.index(&id, source.as_ref(), &target);
        }
        let blessing = self
            .blessings
            .entry(id)
            .or_insert_with(|| Blessing::new(source, target));
        (blessing, inserted)
    }

    /// Insert a blessing, replacing any previous one with the same id.
    pub fn insert(&mut self, blessing: Blessing) -> Option<Blessing> {
        let id = *blessing.id();
        self.index(&id, blessing.source(), blessing.target());
        self.blessings.insert(id, blessing)
    }

    /// Remove a blessing from the table and its indexes.
    pub fn remove(&mut self, id: &BlessingId) -> Option<Blessing> {
        let blessing = self.blessings.remove(id)?;
        unindex(&mut self.by_target, blessing.target(), id);
        if let Some(source) = blessing.source() {
            unindex(&mut self.by_source, source, id);
        }
        Some(blessing)
    }

    /// Iterate over every tracked blessing.
    pub fn iter(&self) -> impl Iterator<Item = &Blessing> {
        self.blessings.values()
    }

    /// Blessings addressed to `target`, in id order.
    pub fn targeting<'a>(&'a self, target: &Principal) -> impl Iterator<Item = &'a Blessing> + 'a {
        self.indexed(&self.by_target, target)
    }

    /// Blessings issued by `source`, in id order.
    pub fn issued_by<'a>(&'a self, source: &Principal) -> impl Iterator<Item = &'a Blessing> + 'a {
        self.indexed(&self.by_source, source)
    }

    /// The permissions `principal` holds and may delegate.
    pub fn authority(&self, principal: &Principal) -> PermissionTree {
        let mut visiting = BTreeSet::new();
        self.authority_guarded(principal, &mut visiting)
    }

    /// The rules of `blessing` clipped against its source's authority.
    pub fn validated(&self, blessing: &Blessing) -> PermissionTree {
        let mut tree = PermissionTree::new();
        if !blessing.is_synced() {
            return tree;
        }
        match blessing.source() {
            None => tree.merge(blessing.tree(), None),
            Some(source) => {
                let bound = self.authority(source);
                tree.merge(blessing.tree(), Some(&bound));
            }
        }
        tree
    }

    /// The merged authority of every group in `groups`.
    pub fn effective_tree<'a>(&self, groups: impl IntoIterator<Item = &'a Principal>) -> PermissionTree {
        let mut tree = PermissionTree::new();
        for group in groups {
            tree.merge(&self.authority(group), None);
        }
        tree
    }

    /// Every principal whose authority can flow into `principal`, including
    /// `principal` itself.
    pub fn upstream(&self, principal: &Principal) -> BTreeSet<Principal> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![principal.clone()];
        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            for blessing in self.targeting(&next).filter(|b| !b.is_revoked()) {
                if let Some(source) = blessing.source() {
                    pending.push(source.clone());
                }
            }
        }
        seen
    }

    /// True if `principal` appears in the delegation chain above the
    /// blessing `id` (its target included).
    pub fn descendant_of(&self, id: &BlessingId, principal: &Principal) -> bool {
        self.get(id)
            .map(|blessing| self.upstream(blessing.target()).contains(principal))
            .unwrap_or(false)
    }

    /// Check that `from` may bless `target`.
    ///
    /// Fails with [`PermsError::Cycle`] when `target` is already upstream
    /// of `from`, which includes blessing oneself.
    pub fn check_bless(&self, from: &BlessingId, target: &Principal) -> Result<()> {
        let blessing = self
            .get(from)
            .ok_or_else(|| PermsError::InvalidOperation(format!("unknown blessing {}", from)))?;
        if blessing.is_revoked() {
            return Err(PermsError::Revoked(*from));
        }
        if self.descendant_of(from, target) {
            return Err(PermsError::Cycle {
                issuer: blessing.target().clone(),
                target: target.clone(),
            });
        }
        Ok(())
    }

    /// Every blessing that depends on `target`'s authority, transitively:
    /// those issued by `target`, those issued by their targets, and so on.
    pub fn downstream_of(&self, target: &Principal) -> Vec<BlessingId> {
        let mut seen_principals = BTreeSet::new();
        let mut found = Vec::new();
        let mut pending = vec![target.clone()];
        while let Some(principal) = pending.pop() {
            if !seen_principals.insert(principal.clone()) {
                continue;
            }
            for blessing in self.issued_by(&principal) {
                found.push(*blessing.id());
                pending.push(blessing.target().clone());
            }
        }
        found
    }

    fn authority_guarded(&self, principal: &Principal, visiting: &mut BTreeSet<Principal>) -> PermissionTree {
        let mut tree = PermissionTree::new();
        if !visiting.insert(principal.clone()) {
            if let Some(root) = self.find(None, principal).filter(|b| b.is_synced()) {
                tree.merge(root.tree(), None);
            }
            return tree;
        }

        for blessing in self.targeting(principal).filter(|b| b.is_synced()) {
            match blessing.source() {
                None => tree.merge(blessing.tree(), None),
                Some(source) => {
                    let bound = self.authority_guarded(source, visiting);
                    tree.merge(blessing.tree(), Some(&bound));
                }
            }
        }

        visiting.remove(principal);
        tree
    }

    fn indexed<'a>(
        &'a self,
        index: &'a BTreeMap<Principal, BTreeSet<BlessingId>>,
        key: &Principal,
    ) -> impl Iterator<Item = &'a Blessing> + 'a {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.blessings.get(id))
    }

    fn index(&mut self, id: &BlessingId, source: Option<&Principal>, target: &Principal) {
        self.by_target.entry(target.clone()).or_default().insert(*id);
        if let Some(source) = source {
            self.by_source.entry(source.clone()).or_default().insert(*id);
        }
    }
}

fn unindex(index: &mut BTreeMap<Principal, BTreeSet<BlessingId>>, key: &Principal, id: &BlessingId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blessings_core::{BlessingRecord, PermissionMask};

    const RW: PermissionMask = PermissionMask::from_bits_retain(0b11);

    /// Insert a synced blessing with the given rules.
    fn bless(table: &mut BlessingTable, source: Option<&str>, target: &str, rules: &[(&str, PermissionMask)]) -> BlessingId {
        let mut record = BlessingRecord::new(source.map(Principal::from), target.into());
        let mut tree = PermissionTree::new();
        for (path, mask) in rules {
            tree.set_own(path, *mask).unwrap();
        }
        record.rules = tree.to_snapshot();
        record.version = 1;
        let id = record.id;
        table.insert(Blessing::from_record(&record).unwrap());
        id
    }

    #[test]
    fn test_get_or_insert_is_idempotent() {
        let mut table = BlessingTable::new();
        let (first, inserted) = table.get_or_insert(Some("alice".into()), "bob".into());
        let id = *first.id();
        assert!(inserted);

        let (second, inserted) = table.get_or_insert(Some("alice".into()), "bob".into());
        assert!(!inserted);
        assert_eq!(*second.id(), id);
        assert_eq!(table.len(), 1);
        assert_eq!(table.issued_by(&"alice".into()).count(), 1);
        assert_eq!(table.targeting(&"bob".into()).count(), 1);
    }

    #[test]
    fn test_remove_clears_indexes() {
        let mut table = BlessingTable::new();
        let id = bless(&mut table, Some("alice"), "bob", &[]);
        assert!(table.remove(&id).is_some());
        assert!(table.remove(&id).is_none());
        assert_eq!(table.issued_by(&"alice".into()).count(), 0);
        assert_eq!(table.targeting(&"bob".into()).count(), 0);
    }

    #[test]
    fn test_root_authority_is_unbounded() {
        let mut table = BlessingTable::new();
        bless(&mut table, None, "root", &[("", PermissionMask::ALL)]);
        assert_eq!(table.authority(&"root".into()).get("anything"), PermissionMask::ALL);
    }

    #[test]
    fn test_delegation_is_clipped_by_source_authority() {
        let mut table = BlessingTable::new();
        bless(&mut table, None, "root", &[("docs", RW)]);
        bless(&mut table, Some("root"), "alice", &[("docs/1", PermissionMask::READ | PermissionMask::ADMIN)]);
        bless(&mut table, Some("alice"), "bob", &[("docs", RW), ("docs/1/x", RW)]);

        let alice = table.authority(&"alice".into());
        assert_eq!(alice.get("docs/1"), PermissionMask::READ);
        assert_eq!(alice.get("docs/2"), PermissionMask::NONE);

        // Clipping happens at the delegated tree's own nodes.
        let bob = table.authority(&"bob".into());
        assert_eq!(bob.get("docs"), PermissionMask::NONE);
        assert_eq!(bob.get("docs/1"), PermissionMask::NONE);
        assert_eq!(bob.get("docs/1/x"), PermissionMask::READ);
    }

    #[test]
    fn test_unsynced_blessings_contribute_nothing() {
        let mut table = BlessingTable::new();
        bless(&mut table, None, "root", &[("", PermissionMask::ALL)]);
        table.get_or_insert(Some("root".into()), "alice".into());
        assert!(table.authority(&"alice".into()).is_empty());
    }

    #[test]
    fn test_cyclic_data_terminates() {
        let mut table = BlessingTable::new();
        bless(&mut table, None, "a", &[("x", RW)]);
        bless(&mut table, Some("a"), "b", &[("x", RW)]);
        bless(&mut table, Some("b"), "a", &[("y", RW)]);

        let a = table.authority(&"a".into());
        assert_eq!(a.get("x"), RW);
        assert_eq!(a.get("y"), PermissionMask::NONE);
        assert_eq!(table.authority(&"b".into()).get("x"), RW);
    }

    #[test]
    fn test_effective_tree_merges_groups() {
        let mut table = BlessingTable::new();
        bless(&mut table, None, "root", &[("", PermissionMask::ALL)]);
        bless(&mut table, Some("root"), "bob", &[("a", PermissionMask::READ)]);
        bless(&mut table, Some("root"), "public", &[("b", PermissionMask::WRITE)]);

        let bob: Principal = "bob".into();
        let public: Principal = "public".into();
        let tree = table.effective_tree([&bob, &public]);
        assert_eq!(tree.get("a"), PermissionMask::READ);
        assert_eq!(tree.get("b"), PermissionMask::WRITE);

        let tree = table.effective_tree([&bob]);
        assert_eq!(tree.get("b"), PermissionMask::NONE);
    }

    #[test]
    fn test_cycle_detection() {
        let mut table = BlessingTable::new();
        let root = bless(&mut table, None, "root", &[("", PermissionMask::ALL)]);
        let alice = bless(&mut table, Some("root"), "alice", &[("", RW)]);
        bless(&mut table, Some("alice"), "bob", &[("", RW)]);
        let bob = BlessingId::derive(Some(&"alice".into()), &"bob".into());

        assert!(table.check_bless(&root, &"carol".into()).is_ok());
        assert!(matches!(table.check_bless(&root, &"root".into()), Err(PermsError::Cycle { .. })));
        assert!(matches!(table.check_bless(&bob, &"alice".into()), Err(PermsError::Cycle { .. })));
        assert!(matches!(table.check_bless(&bob, &"root".into()), Err(PermsError::Cycle { .. })));
        assert!(table.descendant_of(&alice, &"root".into()));
        assert!(!table.descendant_of(&alice, &"bob".into()));
    }

    #[test]
    fn test_downstream_walk() {
        let mut table = BlessingTable::new();
        bless(&mut table, Some("root"), "alice", &[]);
        let ab = bless(&mut table, Some("alice"), "bob", &[]);
        let bc = bless(&mut table, Some("bob"), "carol", &[]);
        let ca = bless(&mut table, Some("carol"), "alice", &[]);
        bless(&mut table, Some("dave"), "erin", &[]);

        let mut found = table.downstream_of(&"alice".into());
        found.sort();
        let mut expected = vec![ab, bc, ca];
        expected.sort();
        assert_eq!(found, expected);
    }
}
