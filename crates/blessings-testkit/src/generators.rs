//! Proptest generators for property-based testing.
//!
//! Segments come from a tiny alphabet so generated trees overlap often.

use std::collections::BTreeMap;

use proptest::prelude::*;

use blessings_core::{PermissionMask, PermissionTree, Principal};

/// Generate a path segment.
pub fn segment() -> impl Strategy<Value = String> {
    "[a-c]{1,2}".prop_map(String::from)
}

/// Generate a valid path of zero to three segments. The empty path is the
/// root.
pub fn path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 0..=3).prop_map(|segments| segments.join("/"))
}

/// Generate a mask over the three defined flags.
pub fn mask() -> impl Strategy<Value = PermissionMask> {
    (0u32..8).prop_map(PermissionMask::from_bits_retain)
}

/// Generate a principal name.
pub fn principal() -> impl Strategy<Value = Principal> {
    "[a-z]{3,8}".prop_map(Principal::from)
}

/// Generate a rule set.
pub fn rules() -> impl Strategy<Value = BTreeMap<String, PermissionMask>> {
    prop::collection::btree_map(path(), mask(), 0..8)
}

/// Generate a permission tree.
pub fn tree() -> impl Strategy<Value = PermissionTree> {
    rules().prop_map(|rules| tree_from_rules(&rules))
}

/// Build a tree by setting each rule's own mask.
pub fn tree_from_rules(rules: &BTreeMap<String, PermissionMask>) -> PermissionTree {
    let mut tree = PermissionTree::new();
    for (path, mask) in rules {
        tree.set_own(path, *mask)
            .unwrap_or_else(|err| panic!("generated invalid path {:?}: {}", path, err));
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use blessings_core::path as paths;

    proptest! {
        #[test]
        fn test_generated_paths_are_valid(p in path()) {
            prop_assert!(paths::validate(&p).is_ok());
        }

        #[test]
        fn test_generated_rules_are_set(rules in rules()) {
            let tree = tree_from_rules(&rules);
            for (path, mask) in &rules {
                prop_assert!(tree.get(path).contains(*mask));
            }
        }
    }
}
