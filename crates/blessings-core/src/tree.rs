//! Permission trees.
//!
//! A [`PermissionTree`] is a rooted tree of [`PermissionNode`]s keyed by
//! path segment, plus a flattened `rules` index of every live path and its
//! effective mask.
//!
//! ## Inheritance
//!
//! Each node holds an own mask (rules set at exactly that path) and an
//! inherited mask (the effective mask of its parent). The effective mask is
//! always `own | inherited`. Writes propagate eagerly: any change to a
//! node's effective mask immediately re-sets the inherited mask of every
//! descendant.
//!
//! ## Lookup
//!
//! [`PermissionTree::get`] resolves the nearest ancestor with a node, so an
//! unset sub-path inherits its closest ruled ancestor. The root always
//! exists, so every lookup resolves.
//!
//! ## Snapshots
//!
//! Trees are stored as nested JSON objects. A node's own mask lives under
//! the reserved `_permissions` key; every other key starting with `_` is
//! metadata and ignored by hydration.

use std::collections::{BTreeMap, VecDeque};

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::mask::PermissionMask;
use crate::path::{self, METADATA_PREFIX};

/// Snapshot key holding a node's own mask.
pub const KEY_PERMISSIONS: &str = "_permissions";

/// A single node of a permission tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionNode {
    own: PermissionMask,
    inherited: PermissionMask,
    children: BTreeMap<String, PermissionNode>,
}

impl PermissionNode {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions explicitly set at this node.
    pub fn own(&self) -> PermissionMask {
        self.own
    }

    /// Permissions flowing down from the parent.
    pub fn inherited(&self) -> PermissionMask {
        self.inherited
    }

    /// `own | inherited`.
    pub fn effective(&self) -> PermissionMask {
        self.own | self.inherited
    }

    /// Child nodes keyed by segment.
    pub fn children(&self) -> &BTreeMap<String, PermissionNode> {
        &self.children
    }

    /// Get a direct child.
    pub fn child(&self, segment: &str) -> Option<&PermissionNode> {
        self.children.get(segment)
    }

    /// Exact descent by path segments. No prefix matching.
    pub fn lookup(&self, path: &str) -> Option<&PermissionNode> {
        path::segments(path).try_fold(self, |node, segment| node.children.get(segment))
    }

    fn lookup_mut(&mut self, path: &str) -> Option<&mut PermissionNode> {
        path::segments(path).try_fold(self, |node, segment| node.children.get_mut(segment))
    }

    /// Add flags to the own mask.
    pub fn add_own(&mut self, mask: PermissionMask) {
        let before = self.effective();
        self.own |= mask;
        if self.effective() != before {
            self.propagate();
        }
    }

    /// Replace the own mask.
    pub fn set_own(&mut self, mask: PermissionMask) {
        if self.own == mask {
            return;
        }
        let before = self.effective();
        self.own = mask;
        if self.effective() != before {
            self.propagate();
        }
    }

    /// Remove flags from the own mask.
    pub fn clear_own(&mut self, mask: PermissionMask) {
        let before = self.effective();
        self.own &= !mask;
        if self.effective() != before {
            self.propagate();
        }
    }

    /// Re-set the inherited mask, walking descendants only when it changes.
    pub fn set_inherited(&mut self, mask: PermissionMask) {
        if self.inherited != mask {
            self.inherited = mask;
            self.propagate();
        }
    }

    fn propagate(&mut self) {
        let effective = self.effective();
        for child in self.children.values_mut() {
            child.set_inherited(effective);
        }
    }

    /// Get or create a child, inheriting this node's effective mask.
    fn ensure_child(&mut self, segment: &str) -> &mut PermissionNode {
        let effective = self.effective();
        self.children
            .entry(segment.to_string())
            .or_insert_with(|| PermissionNode {
                inherited: effective,
                ..PermissionNode::default()
            })
    }

    /// Intersect every node's effective mask with `bound` at the same path.
    ///
    /// `path` is the location of `self` within its tree.
    pub fn check_against(&mut self, path: &str, bound: &PermissionTree) {
        let limit = bound.get(path);
        self.own &= limit;
        self.inherited &= limit;

        let effective = self.effective();
        for (segment, child) in self.children.iter_mut() {
            child.inherited = effective;
            child.check_against(&path::join(path, segment), bound);
        }
    }

    /// Pre-order traversal yielding `(relative path, node)`; parents always
    /// precede their children.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: vec![(String::new(), self)],
        }
    }

    fn from_snapshot(value: &Value, inherited: PermissionMask) -> Result<Self> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Ok(PermissionNode {
                inherited,
                ..PermissionNode::default()
            }),
            other => {
                return Err(CoreError::MalformedSnapshot(format!(
                    "expected object, found {}",
                    other
                )))
            }
        };

        let own = match object.get(KEY_PERMISSIONS) {
            None | Some(Value::Null) => PermissionMask::NONE,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|bits| u32::try_from(bits).ok())
                .map(PermissionMask::from_bits_retain)
                .ok_or_else(|| CoreError::MalformedSnapshot(format!("invalid mask {}", n)))?,
            Some(other) => {
                return Err(CoreError::MalformedSnapshot(format!(
                    "invalid mask {}",
                    other
                )))
            }
        };

        let mut node = PermissionNode {
            own,
            inherited,
            children: BTreeMap::new(),
        };
        let effective = node.effective();
        for (key, child) in object {
            if key.starts_with(METADATA_PREFIX) {
                continue;
            }
            if key.is_empty() || key.contains(path::DELIMITER) {
                return Err(CoreError::MalformedSnapshot(format!("invalid key {:?}", key)));
            }
            node.children
                .insert(key.clone(), PermissionNode::from_snapshot(child, effective)?);
        }
        Ok(node)
    }

    fn to_snapshot(&self) -> Value {
        let mut object = Map::new();
        if !self.own.is_empty() {
            object.insert(KEY_PERMISSIONS.to_string(), Value::from(self.own.bits()));
        }
        for (segment, child) in &self.children {
            object.insert(segment.clone(), child.to_snapshot());
        }
        Value::Object(object)
    }
}

/// Pre-order iterator over a node and its descendants.
pub struct Iter<'a> {
    stack: Vec<(String, &'a PermissionNode)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (String, &'a PermissionNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        // Reverse so children come out in key order.
        for (segment, child) in node.children.iter().rev() {
            self.stack.push((path::join(&path, segment), child));
        }
        Some((path, node))
    }
}

/// A rooted tree of permission nodes plus a path index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTree {
    root: PermissionNode,
    /// Every live path and its effective mask, rebuilt after each mutation.
    rules: BTreeMap<String, PermissionMask>,
}

impl Default for PermissionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionTree {
    /// Create an empty tree: a root with no permissions.
    pub fn new() -> Self {
        Self::with_root(PermissionNode::new())
    }

    fn with_root(root: PermissionNode) -> Self {
        let mut tree = Self {
            root,
            rules: BTreeMap::new(),
        };
        tree.update_rules();
        tree
    }

    /// Hydrate a tree from a stored snapshot.
    ///
    /// Pure: the result depends only on `snapshot`. `null` hydrates to an
    /// empty tree.
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        let root = PermissionNode::from_snapshot(snapshot, PermissionMask::NONE)?;
        Ok(Self::with_root(root))
    }

    /// Serialize into the stored snapshot shape.
    pub fn to_snapshot(&self) -> Value {
        self.root.to_snapshot()
    }

    /// The root node.
    pub fn root(&self) -> &PermissionNode {
        &self.root
    }

    /// Every live path with its effective mask.
    pub fn rules(&self) -> &BTreeMap<String, PermissionMask> {
        &self.rules
    }

    /// Iterate over every live path.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Number of live paths (including the root).
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if the tree grants nothing anywhere.
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(PermissionMask::is_empty)
    }

    /// True if a node exists at exactly `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.rules.contains_key(path)
    }

    /// Exact node lookup.
    pub fn node(&self, path: &str) -> Option<&PermissionNode> {
        self.root.lookup(path)
    }

    /// The closest path at or above `path` that has a node.
    pub fn nearest_ancestor<'a>(&self, path: &'a str) -> &'a str {
        path::nearest_ancestor(path, |p| self.rules.contains_key(p)).unwrap_or(path::ROOT)
    }

    /// Effective permission at `path`, resolved through the nearest ancestor.
    pub fn get(&self, path: &str) -> PermissionMask {
        self.rules
            .get(self.nearest_ancestor(path))
            .copied()
            .unwrap_or_default()
    }

    /// Replace the own mask at `path`, creating intermediate nodes.
    pub fn set_own(&mut self, path: &str, mask: PermissionMask) -> Result<()> {
        path::validate(path)?;
        self.node_for_write(path).set_own(mask);
        self.update_rules();
        Ok(())
    }

    /// Add flags to the own mask at `path`, creating intermediate nodes.
    pub fn add_own(&mut self, path: &str, mask: PermissionMask) -> Result<()> {
        path::validate(path)?;
        self.node_for_write(path).add_own(mask);
        self.update_rules();
        Ok(())
    }

    /// Remove flags from the own mask at `path`. Missing paths are a no-op.
    pub fn clear_own(&mut self, path: &str, mask: PermissionMask) -> Result<()> {
        path::validate(path)?;
        if let Some(node) = self.root.lookup_mut(path) {
            node.clear_own(mask);
            self.update_rules();
        }
        Ok(())
    }

    /// Remove every rule at and below `path`. Removing the root empties the
    /// tree. Returns true if anything was removed.
    pub fn remove(&mut self, path: &str) -> Result<bool> {
        path::validate(path)?;
        let removed = match path::parent(path) {
            None => {
                let had_rules = self.len() > 1 || !self.root.own.is_empty();
                self.root = PermissionNode::new();
                had_rules
            }
            Some(parent) => {
                let segment = path[parent.len()..].trim_start_matches(path::DELIMITER);
                match self.root.lookup_mut(parent) {
                    Some(node) => node.children.remove(segment).is_some(),
                    None => false,
                }
            }
        };
        if removed {
            self.update_rules();
        }
        Ok(removed)
    }

    /// Clip this tree so no path exceeds `bound` at the same path.
    pub fn check_against(&mut self, bound: &PermissionTree) {
        self.root.check_against(path::ROOT, bound);
        self.update_rules();
    }

    /// Merge `other` into this tree.
    ///
    /// A copy of `other` is first clipped against `bound` (the delegator's
    /// authority; `None` for unbounded root authority). The copy is then
    /// walked breadth-first: where both trees define a path, the validated
    /// effective mask is OR'd in and descent continues; where only the copy
    /// defines a child, that subtree is grafted wholesale.
    pub fn merge(&mut self, other: &PermissionTree, bound: Option<&PermissionTree>) {
        let mut validated = other.root.clone();
        if let Some(bound) = bound {
            validated.check_against(path::ROOT, bound);
        }

        let mut queue = VecDeque::new();
        queue.push_back((String::new(), validated));

        while let Some((node_path, incoming)) = queue.pop_front() {
            let Some(local) = self.root.lookup_mut(&node_path) else {
                continue;
            };
            local.add_own(incoming.effective());

            for (segment, mut child) in incoming.children {
                if local.children.contains_key(&segment) {
                    queue.push_back((path::join(&node_path, &segment), child));
                } else {
                    child.set_inherited(local.effective());
                    local.children.insert(segment, child);
                }
            }
        }
        self.update_rules();
    }

    /// Pre-order traversal of `(path, node)`.
    pub fn iter(&self) -> Iter<'_> {
        self.root.iter()
    }

    fn node_for_write(&mut self, path: &str) -> &mut PermissionNode {
        path::segments(path).fold(&mut self.root, |node, segment| node.ensure_child(segment))
    }

    fn update_rules(&mut self) {
        self.rules = self
            .root
            .iter()
            .map(|(path, node)| (path, node.effective()))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const R: PermissionMask = PermissionMask::READ;
    const W: PermissionMask = PermissionMask::WRITE;
    const A: PermissionMask = PermissionMask::ADMIN;

    #[test]
    fn test_inheritance_flows_to_unset_subpaths() {
        let mut tree = PermissionTree::new();
        tree.set_own("docs/1", R | W).unwrap();

        assert_eq!(tree.get("docs/1"), R | W);
        assert_eq!(tree.get("docs/1/anything/deep"), R | W);
        assert_eq!(tree.get("docs"), PermissionMask::NONE);
        assert_eq!(tree.get("other"), PermissionMask::NONE);
    }

    #[test]
    fn test_intermediate_nodes_are_tracked() {
        let mut tree = PermissionTree::new();
        tree.set_own("a/b/c", R).unwrap();

        let paths: Vec<_> = tree.paths().collect();
        assert_eq!(paths, vec!["", "a", "a/b", "a/b/c"]);
    }

    #[test]
    fn test_eager_propagation_on_ancestor_write() {
        let mut tree = PermissionTree::new();
        tree.set_own("a/b", R).unwrap();
        tree.set_own("a", W).unwrap();

        let node = tree.node("a/b").unwrap();
        assert_eq!(node.inherited(), W);
        assert_eq!(node.effective(), R | W);

        tree.clear_own("a", W).unwrap();
        assert_eq!(tree.node("a/b").unwrap().inherited(), PermissionMask::NONE);
        assert_eq!(tree.get("a/b/c"), R);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut tree = PermissionTree::new();
        tree.set_own("a/b", R).unwrap();

        assert!(tree.node("a/b").is_some());
        assert!(tree.node("a/b/c").is_none());
        assert_eq!(tree.nearest_ancestor("a/b/c"), "a/b");
        assert_eq!(tree.nearest_ancestor("z"), "");
    }

    #[test]
    fn test_invalid_path_leaves_tree_untouched() {
        let mut tree = PermissionTree::new();
        tree.set_own("a", R).unwrap();
        let before = tree.clone();

        assert!(tree.set_own("/a", W).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = PermissionTree::new();
        tree.set_own("a", R).unwrap();
        tree.set_own("a/b", W).unwrap();
        tree.set_own("c", W).unwrap();

        assert!(tree.remove("a").unwrap());
        assert!(!tree.contains("a/b"));
        assert_eq!(tree.get("a/b"), PermissionMask::NONE);
        assert_eq!(tree.get("c"), W);

        assert!(!tree.remove("missing").unwrap());
        assert!(tree.remove("").unwrap());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_check_against_clips_to_bound() {
        let mut bound = PermissionTree::new();
        bound.set_own("docs/1", R | W).unwrap();

        let mut tree = PermissionTree::new();
        tree.set_own("docs/1", W).unwrap();
        tree.set_own("docs/1/sub", R | W | A).unwrap();
        tree.set_own("secret", A).unwrap();

        tree.check_against(&bound);
        assert_eq!(tree.get("docs/1"), W);
        assert_eq!(tree.get("docs/1/sub"), R | W);
        assert_eq!(tree.get("secret"), PermissionMask::NONE);
    }

    #[test]
    fn test_merge_unions_shared_paths() {
        let mut local = PermissionTree::new();
        local.set_own("a", R).unwrap();

        let mut other = PermissionTree::new();
        other.set_own("a", W).unwrap();

        local.merge(&other, None);
        assert_eq!(local.get("a"), R | W);
    }

    #[test]
    fn test_merge_grafts_unshared_subtrees() {
        let mut local = PermissionTree::new();
        local.set_own("a", R).unwrap();

        let mut other = PermissionTree::new();
        other.set_own("a/b/c", W).unwrap();

        local.merge(&other, None);
        assert!(local.contains("a/b/c"));
        assert_eq!(local.get("a/b/c"), R | W);
        assert_eq!(local.get("a/b"), R);
        assert_eq!(local.node("a/b").unwrap().inherited(), R);
    }

    #[test]
    fn test_merge_keeps_finer_local_rules() {
        let mut local = PermissionTree::new();
        local.set_own("a/b", A).unwrap();

        let mut other = PermissionTree::new();
        other.set_own("a", R).unwrap();

        local.merge(&other, None);
        assert_eq!(local.get("a"), R);
        assert_eq!(local.get("a/b"), R | A);
        assert_eq!(local.get("a/x"), R);
    }

    #[test]
    fn test_merge_validates_a_copy() {
        let mut bound = PermissionTree::new();
        bound.set_own("", R).unwrap();

        let mut other = PermissionTree::new();
        other.set_own("a", R | W).unwrap();
        let original = other.clone();

        let mut local = PermissionTree::new();
        local.merge(&other, Some(&bound));

        assert_eq!(local.get("a"), R);
        assert_eq!(other, original);
    }

    #[test]
    fn test_snapshot_hydration() {
        let snapshot = json!({
            "_permissions": 0,
            "docs": {
                "_permissions": 3,
                "_meta": "ignored",
                "1": { "sub": { "_permissions": 4 } }
            }
        });

        let tree = PermissionTree::from_snapshot(&snapshot).unwrap();
        assert_eq!(tree.get("docs"), R | W);
        assert_eq!(tree.get("docs/1"), R | W);
        assert_eq!(tree.get("docs/1/sub"), R | W | A);
        assert!(!tree.contains("docs/_meta"));

        let rehydrated = PermissionTree::from_snapshot(&tree.to_snapshot()).unwrap();
        assert_eq!(rehydrated, tree);
    }

    #[test]
    fn test_snapshot_null_is_empty() {
        let tree = PermissionTree::from_snapshot(&Value::Null).unwrap();
        assert_eq!(tree, PermissionTree::new());
    }

    #[test]
    fn test_snapshot_rejects_malformed() {
        assert!(PermissionTree::from_snapshot(&json!({ "a": 5 })).is_err());
        assert!(PermissionTree::from_snapshot(&json!({ "_permissions": "rw" })).is_err());
        assert!(PermissionTree::from_snapshot(&json!({ "_permissions": -1 })).is_err());
    }

    #[test]
    fn test_preorder_iteration() {
        let mut tree = PermissionTree::new();
        tree.set_own("b", R).unwrap();
        tree.set_own("a/x", R).unwrap();

        let order: Vec<_> = tree.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["", "a", "a/x", "b"]);
    }
}
