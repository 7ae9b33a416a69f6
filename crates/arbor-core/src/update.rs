//! The typed update tree, composites, and topology deltas.
//!
//! An [`Update`] mirrors a store subtree. Structural verbs (`delete`,
//! `generate`, `divide`) live in dedicated slots of [`BranchUpdate`]
//! rather than under reserved child names, so a real child called
//! `_delete` is just a child.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::path::Path;
use crate::updater::Updater;
use crate::value::{ProcessRef, Value, ValueMap};

/// Port name → store path, relative to the process's containing node.
pub type PortTopology = IndexMap<String, Path>;

/// Process path → its port wiring.
pub type Topology = IndexMap<Path, PortTopology>;

// ── Update ─────────────────────────────────────────────────────────

/// One write to a store subtree.
#[derive(Clone, Debug)]
pub enum Update {
    /// A raw value, merged by the leaf's configured updater.
    Write(Value),
    /// A value merged with `updater` for this write only. The leaf's
    /// configured updater is unchanged.
    Override {
        /// The incoming value.
        value: Value,
        /// Updater used for this write.
        updater: Updater,
    },
    /// Replace the incoming value with a fold over another subtree.
    Reduce(ReduceSpec),
    /// Structural verbs plus per-child updates.
    Branch(BranchUpdate),
}

impl Update {
    /// A raw write.
    pub fn write(value: impl Into<Value>) -> Self {
        Self::Write(value.into())
    }

    /// A write that replaces the current value regardless of the leaf's
    /// updater.
    pub fn set(value: impl Into<Value>) -> Self {
        Self::Override {
            value: value.into(),
            updater: Updater::Set,
        }
    }

    /// Whether applying this update would do nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Branch(b) => b.is_empty(),
            _ => false,
        }
    }
}

impl From<BranchUpdate> for Update {
    fn from(b: BranchUpdate) -> Self {
        Self::Branch(b)
    }
}

impl From<ReduceSpec> for Update {
    fn from(r: ReduceSpec) -> Self {
        Self::Reduce(r)
    }
}

/// Update of a branch node. Slots are applied in field order: `delete`,
/// `generate`, `divide`, then `children`.
#[derive(Clone, Debug, Default)]
pub struct BranchUpdate {
    /// Subtrees to remove, relative to this node.
    pub delete: Vec<Path>,
    /// Wired subtrees to splice in.
    pub generate: Vec<GenerateSpec>,
    /// A division to perform.
    pub divide: Option<DivideSpec>,
    /// Updates for named children.
    pub children: IndexMap<String, Update>,
}

impl BranchUpdate {
    /// An empty branch update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child update.
    pub fn with_child(mut self, name: impl Into<String>, update: impl Into<Update>) -> Self {
        self.children.insert(name.into(), update.into());
        self
    }

    /// Add a raw write to a child leaf.
    pub fn with_write(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_child(name, Update::write(value))
    }

    /// Remove a subtree.
    pub fn with_delete(mut self, path: impl Into<Path>) -> Self {
        self.delete.push(path.into());
        self
    }

    /// Splice in a wired subtree.
    pub fn with_generate(mut self, spec: GenerateSpec) -> Self {
        self.generate.push(spec);
        self
    }

    /// Divide a subtree.
    pub fn with_divide(mut self, spec: DivideSpec) -> Self {
        self.divide = Some(spec);
        self
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty()
            && self.generate.is_empty()
            && self.divide.is_none()
            && self.children.values().all(Update::is_empty)
    }

    /// Whether this update or any nested one carries a structural verb.
    pub fn is_structural(&self) -> bool {
        !self.delete.is_empty()
            || !self.generate.is_empty()
            || self.divide.is_some()
            || self.children.values().any(|u| match u {
                Update::Branch(b) => b.is_structural(),
                _ => false,
            })
    }
}

// ── Composites ─────────────────────────────────────────────────────

/// A set of processes, their wiring, and initial state.
///
/// Paths in `processes` and `topology` are relative to the node the
/// composite is generated at. Topology paths are relative to each
/// process's containing node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composite {
    /// Process path → process.
    pub processes: IndexMap<Path, ProcessRef>,
    /// Process path → port wiring.
    pub topology: Topology,
    /// Initial values, applied as `_value` relative to the base path.
    pub initial_state: Value,
}

impl Composite {
    /// An empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process with its port wiring.
    pub fn with_process<I, K, P>(mut self, path: impl Into<Path>, process: ProcessRef, ports: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<Path>,
    {
        let path = path.into();
        let ports = ports
            .into_iter()
            .map(|(k, p)| (k.into(), p.into()))
            .collect();
        self.processes.insert(path.clone(), process);
        self.topology.insert(path, ports);
        self
    }

    /// Set the initial state tree.
    pub fn with_initial_state(mut self, state: impl Into<Value>) -> Self {
        self.initial_state = state.into();
        self
    }

    /// Merge another composite into this one, prefixing its paths.
    pub fn merge_at(&mut self, prefix: &Path, other: Composite) {
        for (path, process) in other.processes {
            self.processes.insert(prefix.join(&path), process);
        }
        for (path, ports) in other.topology {
            self.topology.insert(prefix.join(&path), ports);
        }
        let mut nested = other.initial_state;
        for key in prefix.keys().collect::<Vec<_>>().into_iter().rev() {
            nested = Value::Map(ValueMap::from([(key.to_string(), nested)]));
        }
        self.initial_state = self.initial_state.deep_merge(&nested);
    }
}

/// A wired subtree to create at `path`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateSpec {
    /// Base path, relative to the node the update is applied at.
    pub path: Path,
    /// What to wire there.
    pub composite: Composite,
}

impl GenerateSpec {
    /// Generate `composite` at `path`.
    pub fn new(path: impl Into<Path>, composite: Composite) -> Self {
        Self {
            path: path.into(),
            composite,
        }
    }
}

/// One daughter of a division. Its composite's `initial_state` holds
/// daughter-specific overrides layered on the divided mother state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DaughterSpec {
    /// Daughter base path, relative to the node the update is applied at.
    pub path: Path,
    /// Processes, wiring, and overrides for the daughter.
    pub composite: Composite,
}

impl DaughterSpec {
    /// A daughter at `path`.
    pub fn new(path: impl Into<Path>, composite: Composite) -> Self {
        Self {
            path: path.into(),
            composite,
        }
    }
}

/// Split `mother` into two daughters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DivideSpec {
    /// Mother path, relative to the node the update is applied at.
    pub mother: Path,
    /// Exactly two daughters.
    pub daughters: Vec<DaughterSpec>,
}

// ── Reduction ──────────────────────────────────────────────────────

/// What a reducer sees of each node during a fold.
#[derive(Clone, Copy, Debug)]
pub struct NodeView<'a> {
    /// Path of the node relative to the fold's starting node.
    pub path: &'a Path,
    /// The leaf value; `None` for branches and unset leaves.
    pub value: Option<&'a Value>,
    /// Leaf units.
    pub units: Option<&'a str>,
    /// Leaf properties; `None` for branches.
    pub properties: Option<&'a ValueMap>,
}

impl NodeView<'_> {
    /// Whether the node is a configured leaf.
    pub fn is_leaf(&self) -> bool {
        self.properties.is_some()
    }

    /// Look up a leaf property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties?.get(key)
    }
}

/// A fold step: `(accumulator, node) -> accumulator`.
pub type Reducer = Arc<dyn Fn(Value, &NodeView<'_>) -> Value + Send + Sync>;

/// Fold `reducer` pre-order over the subtree at `from`, starting at
/// `initial`. `from` is relative to the parent of the leaf being updated.
#[derive(Clone)]
pub struct ReduceSpec {
    /// The fold step.
    pub reducer: Reducer,
    /// Subtree to fold over.
    pub from: Path,
    /// Starting accumulator.
    pub initial: Value,
}

impl ReduceSpec {
    /// Build a reduction.
    pub fn new<F>(from: impl Into<Path>, initial: impl Into<Value>, reducer: F) -> Self
    where
        F: Fn(Value, &NodeView<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            reducer: Arc::new(reducer),
            from: from.into(),
            initial: initial.into(),
        }
    }
}

impl fmt::Debug for ReduceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceSpec")
            .field("from", &self.from)
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

// ── Topology deltas ────────────────────────────────────────────────

/// Structural changes reported upward by update application.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyDelta {
    /// Newly wired processes (absolute path → ports).
    pub added: Topology,
    /// Removed subtree roots (absolute paths).
    pub removed: Vec<Path>,
}

impl TopologyDelta {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Fold `other` into this delta. Additions under a path removed later
    /// are dropped.
    pub fn merge(&mut self, other: TopologyDelta) {
        for removed in &other.removed {
            self.added.retain(|path, _| !path.starts_with(removed));
        }
        self.removed.extend(other.removed);
        self.added.extend(other.added);
    }
}
