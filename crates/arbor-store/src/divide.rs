//! Division: split one subtree into two wired daughters.
//!
//! The mother's value is divided leaf by leaf. A leaf without a divider
//! (and every process leaf) contributes nothing, so the daughter falls
//! back to the leaf's default. Each leaf draws its own randomness from
//! the store's seeded generator, in pre-order.

use tracing::debug;

use arbor_core::{DivideSpec, Path, States, StoreError, TopologyDelta, Value, ValueMap};

use crate::handle::NodeId;
use crate::node::Leaf;
use crate::store::Store;
use crate::wiring;

impl Store {
    /// Divide the subtree at `spec.mother` (relative to `at`) into the
    /// two daughters of `spec`, then remove the mother.
    ///
    /// # Errors
    ///
    /// [`StoreError::DivisionArity`] unless exactly two daughters are
    /// given, [`StoreError::MissingPath`] if the mother does not exist,
    /// and [`StoreError::DividerFailed`] if any leaf divider fails. Wiring
    /// errors from either daughter propagate too; on any error the store
    /// (divider generator included) is left as it was.
    pub fn divide(&mut self, at: NodeId, spec: &DivideSpec) -> Result<TopologyDelta, StoreError> {
        self.atomically(|store| store.divide_subtree(at, spec))
    }

    fn divide_subtree(&mut self, at: NodeId, spec: &DivideSpec) -> Result<TopologyDelta, StoreError> {
        let base = self.path_of(at);
        if spec.daughters.len() != 2 {
            return Err(StoreError::DivisionArity {
                path: base.join(&spec.mother),
                daughters: spec.daughters.len(),
            });
        }
        let mother = self
            .get_path(at, &spec.mother)
            .ok_or_else(|| StoreError::MissingPath {
                path: base.join(&spec.mother),
            })?;
        if mother == self.root() {
            return Err(StoreError::InvalidUpdate {
                path: Path::root(),
                reason: "the root cannot be divided".to_string(),
            });
        }

        let [left, right] = self.divide_value(mother)?.unwrap_or([Value::Null, Value::Null]);
        let shapes = self.leaf_shapes(mother);

        let mut delta = TopologyDelta::default();
        for (daughter, state) in spec.daughters.iter().zip([left, right]) {
            let mut composite = daughter.composite.clone();
            let overrides = std::mem::take(&mut composite.initial_state);
            delta.merge(wiring::generate(self, at, &daughter.path, &composite)?);

            let node = self.establish_path(at, &daughter.path)?;
            for (rel, leaf) in &shapes {
                if self.get_path(node, rel).is_none() {
                    let id = self.establish_path(node, rel)?;
                    if let Some(n) = self.node_mut(id) {
                        if n.children.is_empty() && n.subschema.is_none() {
                            n.leaf = Some(leaf.unseeded());
                        }
                    }
                }
            }
            let seed = state.deep_merge(&overrides);
            if !seed.is_null() {
                self.set_value(node, &seed)?;
            }
        }

        if let Some(removed) = self.remove(mother) {
            debug!(mother = %removed, daughters = spec.daughters.len(), "subtree divided");
            delta.removed.push(removed);
        }
        let root = self.root();
        self.apply_subschemas(root)?;
        Ok(delta)
    }

    /// Compute the two daughter values of the subtree at `id`, or `None`
    /// if nothing in it divides.
    fn divide_value(&mut self, id: NodeId) -> Result<Option<[Value; 2]>, StoreError> {
        let Some(node) = self.node(id) else {
            return Ok(None);
        };
        if let Some(leaf) = &node.leaf {
            let (Some(divider), Some(value)) = (leaf.divider.clone(), leaf.value.clone()) else {
                return Ok(None);
            };
            if matches!(value, Value::Process(_)) {
                return Ok(None);
            }
            let context = match (divider.topology(), node.parent) {
                (Some(topology), Some(parent)) => self.port_states(parent, topology),
                _ => States::new(),
            };
            let halves = divider
                .divide(&value, &context, &mut self.rng)
                .map_err(|reason| StoreError::DividerFailed {
                    path: self.path_of(id),
                    reason,
                })?;
            return Ok(Some(halves));
        }

        let children: Vec<(String, NodeId)> = node
            .children
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let mut a = ValueMap::new();
        let mut b = ValueMap::new();
        for (name, child) in children {
            if let Some([x, y]) = self.divide_value(child)? {
                a.insert(name.clone(), x);
                b.insert(name, y);
            }
        }
        if a.is_empty() {
            return Ok(None);
        }
        Ok(Some([Value::Map(a), Value::Map(b)]))
    }

    /// Every non-process leaf under `id`, with its path relative to `id`.
    fn leaf_shapes(&self, id: NodeId) -> Vec<(Path, Leaf)> {
        self.depth(id)
            .into_iter()
            .filter_map(|(path, next)| {
                let leaf = self.node(next)?.leaf.as_ref()?;
                if matches!(leaf.value, Some(Value::Process(_))) || path.is_empty() {
                    return None;
                }
                Some((path, leaf.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_core::{
        BranchUpdate, Composite, DaughterSpec, Divider, DividerSpec, LeafSchema, Registry, Schema,
        Update,
    };

    use super::*;

    fn two_daughters() -> Vec<DaughterSpec> {
        vec![
            DaughterSpec::new("2", Composite::new()),
            DaughterSpec::new("3", Composite::new()),
        ]
    }

    fn agents_store(seed: u64) -> Store {
        let mut store = Store::with_seed(Arc::new(Registry::default()), seed);
        let root = store.root();
        let cell = store.establish_path(root, &Path::parse("agents/1")).unwrap();
        let schema = Schema::branch()
            .with_leaf(
                "count",
                LeafSchema::new().with_default(0).with_divider("split"),
            )
            .with_leaf(
                "volume",
                LeafSchema::new().with_default(1.0).with_divider("set").with_units("fL"),
            )
            .with_leaf("age", LeafSchema::new().with_default(0.0));
        store.apply_config(cell, &schema).unwrap();
        store
            .apply_update_at(&Path::parse("agents/1/count"), &Update::write(7))
            .unwrap();
        store
            .apply_update_at(&Path::parse("agents/1/age"), &Update::write(3.0))
            .unwrap();
        store
    }

    fn divide(store: &mut Store) -> TopologyDelta {
        let update = BranchUpdate::new().with_divide(DivideSpec {
            mother: Path::parse("1"),
            daughters: two_daughters(),
        });
        store
            .apply_update_at(&Path::parse("agents"), &update.into())
            .unwrap()
    }

    #[test]
    fn daughters_conserve_counts_and_copy_schema() {
        let mut store = agents_store(11);
        let delta = divide(&mut store);
        assert_eq!(delta.removed, vec![Path::parse("agents/1")]);
        assert!(store.resolve(&Path::parse("agents/1")).is_none());

        let a = store.get_in(store.root(), &Path::parse("agents/2")).unwrap();
        let b = store.get_in(store.root(), &Path::parse("agents/3")).unwrap();
        assert_eq!(
            a["count"].as_i64().unwrap() + b["count"].as_i64().unwrap(),
            7
        );
        assert_eq!(a["volume"], Value::Float(1.0));
        // No divider: daughters fall back to the default.
        assert_eq!(a["age"], Value::Float(0.0));

        let volume = store.resolve(&Path::parse("agents/3/volume")).unwrap();
        let leaf = store.node(volume).unwrap().leaf().unwrap();
        assert_eq!(leaf.units(), Some("fL"));
        assert_eq!(leaf.divider(), Some(&Divider::Set));
    }

    #[test]
    fn same_seed_divides_identically() {
        let mut x = agents_store(5);
        let mut y = agents_store(5);
        divide(&mut x);
        divide(&mut y);
        assert_eq!(x.get_value(x.root()), y.get_value(y.root()));
    }

    #[test]
    fn daughter_overrides_layer_on_divided_state() {
        let mut store = agents_store(0);
        let daughters = vec![
            DaughterSpec::new(
                "2",
                Composite::new().with_initial_state([("volume", 0.25)].into_iter().collect::<Value>()),
            ),
            DaughterSpec::new("3", Composite::new()),
        ];
        let update = BranchUpdate::new().with_divide(DivideSpec {
            mother: Path::parse("1"),
            daughters,
        });
        store
            .apply_update_at(&Path::parse("agents"), &update.into())
            .unwrap();
        assert_eq!(
            store.get_in(store.root(), &Path::parse("agents/2/volume")),
            Some(Value::Float(0.25))
        );
        assert_eq!(
            store.get_in(store.root(), &Path::parse("agents/3/volume")),
            Some(Value::Float(1.0))
        );
    }

    #[test]
    fn wrong_daughter_count_is_rejected() {
        let mut store = agents_store(0);
        let at = store.resolve(&Path::parse("agents")).unwrap();
        let spec = DivideSpec {
            mother: Path::parse("1"),
            daughters: vec![DaughterSpec::new("2", Composite::new())],
        };
        match store.divide(at, &spec) {
            Err(StoreError::DivisionArity { daughters, .. }) => assert_eq!(daughters, 1),
            other => panic!("expected DivisionArity, got {other:?}"),
        }
        assert!(store.resolve(&Path::parse("agents/1")).is_some());
    }

    #[test]
    fn missing_mother_is_an_error() {
        let mut store = agents_store(0);
        let at = store.resolve(&Path::parse("agents")).unwrap();
        let spec = DivideSpec {
            mother: Path::parse("9"),
            daughters: two_daughters(),
        };
        assert!(matches!(
            store.divide(at, &spec),
            Err(StoreError::MissingPath { .. })
        ));
    }

    #[test]
    fn topology_divider_sees_sibling_state() {
        let mut registry = Registry::default();
        registry.register_divider(
            "by_share",
            Divider::custom("by_share", |value, ctx, _rng| {
                let share = ctx["share"].as_f64().ok_or("share missing")?;
                let x = value.as_f64().ok_or("not a number")?;
                Ok([Value::Float(x * share), Value::Float(x * (1.0 - share))])
            }),
        );
        let mut store = Store::with_seed(Arc::new(registry), 0);
        let root = store.root();
        let cell = store.establish_path(root, &Path::parse("agents/1")).unwrap();
        let divider = DividerSpec::WithTopology {
            divider: Box::new("by_share".into()),
            topology: [("share".to_string(), Path::parse("share"))].into_iter().collect(),
        };
        let schema = Schema::branch()
            .with_leaf("share", LeafSchema::new().with_default(0.25))
            .with_leaf(
                "protein",
                LeafSchema::new().with_default(8.0).with_divider(divider),
            );
        store.apply_config(cell, &schema).unwrap();
        divide(&mut store);
        assert_eq!(
            store.get_in(root, &Path::parse("agents/2/protein")),
            Some(Value::Float(2.0))
        );
        assert_eq!(
            store.get_in(root, &Path::parse("agents/3/protein")),
            Some(Value::Float(6.0))
        );
    }

    #[test]
    fn no_divide_leaf_aborts_division() {
        let mut store = agents_store(0);
        let root = store.root();
        let flag = store
            .establish_path(root, &Path::parse("agents/1/chromosome"))
            .unwrap();
        store
            .apply_config(
                flag,
                &Schema::leaf(LeafSchema::new().with_default(1).with_divider("no_divide")),
            )
            .unwrap();
        let at = store.resolve(&Path::parse("agents")).unwrap();
        let spec = DivideSpec {
            mother: Path::parse("1"),
            daughters: two_daughters(),
        };
        assert!(matches!(
            store.divide(at, &spec),
            Err(StoreError::DividerFailed { .. })
        ));
    }

    #[test]
    fn failed_daughter_rolls_back_the_whole_division() {
        let mut store = agents_store(3);
        let before = store.get_value(store.root());
        let nodes = store.node_count();
        let at = store.resolve(&Path::parse("agents")).unwrap();
        let spec = DivideSpec {
            mother: Path::parse("1"),
            daughters: vec![
                DaughterSpec::new("2", Composite::new()),
                DaughterSpec::new("../../x", Composite::new()),
            ],
        };
        assert!(matches!(
            store.divide(at, &spec),
            Err(StoreError::PathAboveRoot { .. })
        ));
        assert_eq!(store.node_count(), nodes);
        assert!(store.resolve(&Path::parse("agents/2")).is_none());
        assert_eq!(store.get_value(store.root()), before);

        // The divider generator is restored too.
        let mut fresh = agents_store(3);
        divide(&mut store);
        divide(&mut fresh);
        assert_eq!(store.get_value(store.root()), fresh.get_value(fresh.root()));
    }
}
