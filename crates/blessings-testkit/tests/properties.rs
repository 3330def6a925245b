//! Algebraic properties of permission trees.

use std::collections::BTreeMap;

use proptest::prelude::*;

use blessings_core::{path as paths, BlessingId, BlessingRecord, PermissionMask, PermissionTree};
use blessings_perms::Blessing;
use blessings_testkit::generators::{path, rules, tree};
use blessings_testkit::{Constellation, PermissionRecorder};

/// Paths to check: every path the trees define, plus extras.
fn sample_paths<'a>(trees: &[&'a PermissionTree], extra: &'a [String]) -> Vec<&'a str> {
    let mut sampled: Vec<&str> = trees.iter().copied().flat_map(PermissionTree::paths).collect();
    sampled.extend(extra.iter().map(String::as_str));
    sampled
}

/// `root` holding everything, with `rules` written once to a blessing for
/// `bob`.
async fn bob_blessed_with(rules: &BTreeMap<String, PermissionMask>) -> (Constellation, BlessingId) {
    let mut world = Constellation::new();
    world.add_principal("root").await;
    world.add_principal("bob").await;
    world.give_root("root", &[("", PermissionMask::ALL)]).await;

    let root = world.manager("root");
    let to_bob = root.bless("bob").await.expect("failed to bless");
    root.set_permissions_map(&to_bob, rules)
        .await
        .expect("failed to write rules");
    world.settle().await;
    (world, to_bob)
}

proptest! {
    #[test]
    fn delegation_never_exceeds_authority(
        authority in tree(),
        delegated in tree(),
        extra in prop::collection::vec(path(), 0..8),
    ) {
        let mut granted = PermissionTree::new();
        granted.merge(&delegated, Some(&authority));

        for p in sample_paths(&[&authority, &delegated, &granted], &extra) {
            prop_assert!(
                authority.get(p).contains(granted.get(p)),
                "{:?}: granted {} beyond authority {}",
                p,
                granted.get(p),
                authority.get(p)
            );
        }
    }

    #[test]
    fn descendants_inherit_ancestor_flags(
        t in tree(),
        extra in prop::collection::vec(path(), 0..8),
    ) {
        for p in sample_paths(&[&t], &extra) {
            for ancestor in paths::ancestors(p) {
                prop_assert!(t.get(p).contains(t.get(ancestor)));
            }
        }
    }

    #[test]
    fn merge_is_idempotent(base in tree(), other in tree(), bound in tree()) {
        let mut once = base.clone();
        once.merge(&other, Some(&bound));
        let mut twice = once.clone();
        twice.merge(&other, Some(&bound));

        prop_assert_eq!(once.rules(), twice.rules());
    }

    #[test]
    fn merge_order_does_not_matter(
        a in tree(),
        b in tree(),
        extra in prop::collection::vec(path(), 0..8),
    ) {
        let mut ab = PermissionTree::new();
        ab.merge(&a, None);
        ab.merge(&b, None);

        let mut ba = PermissionTree::new();
        ba.merge(&b, None);
        ba.merge(&a, None);

        for p in sample_paths(&[&a, &b], &extra) {
            prop_assert_eq!(ab.get(p), ba.get(p), "differs at {:?}", p);
        }
    }

    #[test]
    fn merge_only_adds(base in tree(), other in tree(), bound in tree()) {
        let mut merged = base.clone();
        merged.merge(&other, Some(&bound));

        for p in base.paths() {
            prop_assert!(merged.get(p).contains(base.get(p)));
        }
    }

    #[test]
    fn snapshot_hydration_is_stable(t in tree()) {
        let hydrated = PermissionTree::from_snapshot(&t.to_snapshot()).unwrap();
        prop_assert_eq!(hydrated.rules(), t.rules());

        let again = PermissionTree::from_snapshot(&hydrated.to_snapshot()).unwrap();
        prop_assert_eq!(again, hydrated);
    }

    #[test]
    fn rewriting_rules_leaves_blessing_tree_alone(map in rules()) {
        let record = BlessingRecord::new(Some("root".into()), "bob".into());
        let mut blessing = Blessing::from_record(&record).unwrap();

        blessing.set_permissions_map(&map).unwrap();
        let once = blessing.tree().clone();
        blessing.set_permissions_map(&map).unwrap();

        prop_assert_eq!(blessing.tree(), &once);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rewriting_rules_leaves_effective_tree_alone(map in rules()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (mut world, to_bob) = bob_blessed_with(&map).await;

            let recorder = PermissionRecorder::new();
            let bob = world.manager("bob");
            for p in map.keys() {
                bob.add_permission_listener(p.as_str(), recorder.clone()).unwrap();
            }
            let once = bob.effective_tree().clone();
            let notified = recorder.count();

            world.manager("root").set_permissions_map(&to_bob, &map).await.unwrap();
            world.settle().await;

            prop_assert_eq!(world.manager("bob").effective_tree(), &once);
            prop_assert_eq!(recorder.count(), notified);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
