//! Integration test: structural store operations and config-merge laws.
//!
//! Exercises the store through its public API only: division statistics
//! over many seeds, wildcard inheritance on generation, and property
//! tests for config merging, leaf/branch exclusivity, and path
//! establishment.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_core::{
    BranchUpdate, Composite, DaughterSpec, DivideSpec, GenerateSpec, LeafSchema, Path,
    ProcessRef, Registry, Schema, StoreError, Update, Value,
};
use arbor_store::Store;
use arbor_test_utils::Growth;
use proptest::prelude::*;

fn count_store(seed: u64, count: i64) -> Store {
    let mut store = Store::with_seed(Arc::new(Registry::default()), seed);
    let root = store.root();
    let cell = store.establish_path(root, &Path::parse("agents/1")).unwrap();
    let schema = Schema::branch().with_leaf(
        "count",
        LeafSchema::new().with_default(count).with_divider("split"),
    );
    store.apply_config(cell, &schema).unwrap();
    store
}

fn divide_in_two(store: &mut Store) -> (i64, i64) {
    let update = BranchUpdate::new().with_divide(DivideSpec {
        mother: Path::parse("1"),
        daughters: vec![
            DaughterSpec::new("2", Composite::new()),
            DaughterSpec::new("3", Composite::new()),
        ],
    });
    store
        .apply_update_at(&Path::parse("agents"), &update.into())
        .unwrap();
    let root = store.root();
    let a = store.get_in(root, &Path::parse("agents/2/count")).unwrap();
    let b = store.get_in(root, &Path::parse("agents/3/count")).unwrap();
    (a.as_i64().unwrap(), b.as_i64().unwrap())
}

/// Per node, in path order: value plus the leaf fields that merging
/// touches.
type Fingerprint = Vec<(String, Value, Option<String>, Option<String>, bool)>;

fn fingerprint(store: &Store) -> Fingerprint {
    let mut out: Fingerprint = store
        .depth(store.root())
        .into_iter()
        .map(|(path, id)| {
            let node = store.node(id).unwrap();
            let leaf = node.leaf();
            (
                path.to_string(),
                store.get_value(id),
                leaf.map(|l| l.updater().name().to_string()),
                leaf.and_then(|l| l.units()).map(str::to_string),
                leaf.is_some_and(|l| l.emit()),
            )
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn split_conserves_counts_and_varies_the_remainder_side() {
    let mut seen = BTreeMap::new();
    for seed in 0..1000 {
        let mut store = count_store(seed, 7);
        let (a, b) = divide_in_two(&mut store);
        assert_eq!(a + b, 7, "seed {seed} gave ({a}, {b})");
        *seen.entry((a, b)).or_insert(0) += 1;
    }
    assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec![(3, 4), (4, 3)]);
}

#[test]
fn generated_child_inherits_wildcard_schema() {
    let mut store = Store::default();
    let root = store.root();
    let agents = store.establish_path(root, &Path::parse("agents")).unwrap();
    let agent = Schema::branch()
        .with_leaf(
            "volume",
            LeafSchema::new()
                .with_default(1.0)
                .with_updater("set")
                .with_units("fL"),
        )
        .with_leaf("mass", LeafSchema::new().with_units("fg"));
    store.apply_config(agents, &Schema::wildcard(agent)).unwrap();

    let composite = Composite::new().with_process(
        "growth",
        ProcessRef::new(Growth::new(1.0)),
        [("state", "")],
    );
    let update = BranchUpdate::new().with_generate(GenerateSpec::new("7", composite));
    let delta = store
        .apply_update_at(&Path::parse("agents"), &update.into())
        .unwrap();
    assert!(delta.added.contains_key(&Path::parse("agents/7/growth")));

    let volume = store.resolve(&Path::parse("agents/7/volume")).unwrap();
    let leaf = store.node(volume).unwrap().leaf().unwrap();
    assert_eq!(leaf.value(), Some(&Value::Float(1.0)));
    assert_eq!(leaf.updater().name(), "set");
    assert_eq!(leaf.units(), Some("fL"));

    let mass = store.resolve(&Path::parse("agents/7/mass")).unwrap();
    let leaf = store.node(mass).unwrap().leaf().unwrap();
    assert_eq!(leaf.units(), Some("fg"));
    assert_eq!(leaf.value(), Some(&Value::Float(0.0)));

    store
        .apply_update_at(&Path::parse("agents/7/volume"), &Update::write(2.0))
        .unwrap();
    assert_eq!(
        store.get_in(root, &Path::parse("agents/7/volume")),
        Some(Value::Float(2.0))
    );
}

#[test]
fn reconfiguring_with_a_different_default_conflicts() {
    let mut store = Store::default();
    let root = store.root();
    let leaf = store.establish_path(root, &Path::parse("x")).unwrap();
    let zero = Schema::leaf(
        LeafSchema::new()
            .with_default(0.0)
            .with_updater("accumulate"),
    );
    store.apply_config(leaf, &zero).unwrap();
    store.apply_config(leaf, &zero).unwrap();
    let one = Schema::leaf(
        LeafSchema::new()
            .with_default(1.0)
            .with_updater("accumulate"),
    );
    match store.apply_config(leaf, &one) {
        Err(StoreError::SchemaMergeConflict { path, key, .. }) => {
            assert_eq!(path, Path::parse("x"));
            assert_eq!(key, "_default");
        }
        other => panic!("expected SchemaMergeConflict, got {other:?}"),
    }
}

// ── Properties ───────────────────────────────────────────────────────

fn key() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["a", "b", "c", "d", "e", "f"])
}

fn path() -> impl Strategy<Value = Path> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 1..4)
        .prop_map(|keys| keys.into_iter().collect::<Path>())
}

fn leaf_schema() -> impl Strategy<Value = LeafSchema> {
    (
        prop::option::of(-50i64..50),
        prop::option::of(prop::sample::select(vec!["accumulate", "set", "merge"])),
        prop::option::of(prop::sample::select(vec!["fg", "fL", "mM"])),
        any::<bool>(),
    )
        .prop_map(|(default, updater, units, emit)| {
            let mut leaf = LeafSchema::new().with_emit(emit);
            if let Some(d) = default {
                leaf = leaf.with_default(d);
            }
            if let Some(u) = updater {
                leaf = leaf.with_updater(u);
            }
            if let Some(u) = units {
                leaf = leaf.with_units(u);
            }
            leaf
        })
}

fn fragment(leaves: &BTreeMap<&'static str, LeafSchema>) -> Schema {
    leaves
        .iter()
        .fold(Schema::branch(), |s, (k, leaf)| s.with_leaf(*k, leaf.clone()))
}

proptest! {
    #[test]
    fn config_merge_is_idempotent(leaves in prop::collection::btree_map(key(), leaf_schema(), 1..5)) {
        let schema = fragment(&leaves);
        let mut once = Store::default();
        let mut twice = Store::default();
        let (r1, r2) = (once.root(), twice.root());
        once.apply_config(r1, &schema).unwrap();
        twice.apply_config(r2, &schema).unwrap();
        twice.apply_config(r2, &schema).unwrap();
        prop_assert_eq!(fingerprint(&once), fingerprint(&twice));
    }

    #[test]
    fn config_merge_commutes_on_disjoint_keys(
        leaves in prop::collection::btree_map(key(), leaf_schema(), 2..6),
    ) {
        let mut left = BTreeMap::new();
        let mut right = BTreeMap::new();
        for (i, (k, leaf)) in leaves.into_iter().enumerate() {
            if i % 2 == 0 {
                left.insert(k, leaf);
            } else {
                right.insert(k, leaf);
            }
        }
        let (a, b) = (fragment(&left), fragment(&right));

        let mut ab = Store::default();
        let mut ba = Store::default();
        let (r1, r2) = (ab.root(), ba.root());
        ab.apply_config(r1, &a).unwrap();
        ab.apply_config(r1, &b).unwrap();
        ba.apply_config(r2, &b).unwrap();
        ba.apply_config(r2, &a).unwrap();
        prop_assert_eq!(fingerprint(&ab), fingerprint(&ba));
    }

    #[test]
    fn nodes_are_never_leaf_and_branch(ops in prop::collection::vec((path(), any::<bool>()), 1..20)) {
        let mut store = Store::default();
        let root = store.root();
        for (p, as_leaf) in ops {
            let Ok(id) = store.establish_path(root, &p) else {
                continue;
            };
            let schema = if as_leaf {
                Schema::leaf(LeafSchema::new().with_default(1))
            } else {
                Schema::branch().with_leaf("x", LeafSchema::new().with_default(2))
            };
            if let Err(e) = store.apply_config(id, &schema) {
                prop_assert!(
                    matches!(e, StoreError::LeafBranchConflict { .. }),
                    "unexpected error {e:?}"
                );
            }
        }
        for (p, id) in store.depth(root) {
            let node = store.node(id).unwrap();
            prop_assert!(
                !(node.is_leaf() && node.child_count() > 0),
                "node {p} is both a leaf and a branch"
            );
        }
    }

    #[test]
    fn established_leaf_reads_back_its_default(p in path(), default in any::<i64>(), value in prop::option::of(any::<i64>())) {
        let mut store = Store::default();
        let root = store.root();
        let id = store.establish_path(root, &p).unwrap();
        let mut leaf = LeafSchema::new().with_default(default);
        if let Some(v) = value {
            leaf = leaf.with_value(v);
        }
        store.apply_config(id, &Schema::leaf(leaf)).unwrap();
        let expected = Value::Int(value.unwrap_or(default));
        prop_assert_eq!(store.get_in(root, &p), Some(expected));
    }

    #[test]
    fn split_conserves_any_count(count in -10_000i64..10_000, seed in any::<u64>()) {
        let (a, b) = divide_in_two(&mut count_store(seed, count));
        prop_assert_eq!(a + b, count);
        prop_assert!((a - b).abs() <= 1);
        prop_assert_eq!(divide_in_two(&mut count_store(seed, count)), (a, b));
    }
}
