//! Store nodes and leaf configuration.

use indexmap::IndexMap;

use arbor_core::{Divider, Schema, Updater, Value, ValueMap};

use crate::handle::NodeId;

static ACCUMULATE: Updater = Updater::Accumulate;

/// Schema and value of a leaf node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Leaf {
    pub(crate) value: Option<Value>,
    pub(crate) default: Option<Value>,
    /// Explicit `_value`; pinned so later configs can detect conflicts.
    pub(crate) initial: Option<Value>,
    pub(crate) updater: Option<Updater>,
    pub(crate) divider: Option<Divider>,
    pub(crate) units: Option<String>,
    pub(crate) emit: bool,
    pub(crate) properties: ValueMap,
}

impl Leaf {
    /// Current value, if any has been seeded or written.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Configured `_default`.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Effective updater (`accumulate` when none was configured).
    pub fn updater(&self) -> &Updater {
        self.updater.as_ref().unwrap_or(&ACCUMULATE)
    }

    /// Configured divider.
    pub fn divider(&self) -> Option<&Divider> {
        self.divider.as_ref()
    }

    /// Configured units.
    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Whether the leaf is included in history emissions.
    pub fn emit(&self) -> bool {
        self.emit
    }

    /// Free-form leaf metadata.
    pub fn properties(&self) -> &ValueMap {
        &self.properties
    }

    /// A copy of this leaf's schema with no value, used to seed a fresh
    /// leaf of the same shape.
    pub(crate) fn unseeded(&self) -> Self {
        Self {
            value: self.default.clone(),
            initial: None,
            ..self.clone()
        }
    }
}

/// One node of the store tree: a leaf, a branch, or (freshly created)
/// neither yet.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: IndexMap<String, NodeId>,
    pub(crate) leaf: Option<Leaf>,
    pub(crate) subschema: Option<Schema>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            ..Self::default()
        }
    }

    /// Name under the parent (empty for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent handle; `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child handles in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Look up a child by name.
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Leaf configuration, if this is a leaf.
    pub fn leaf(&self) -> Option<&Leaf> {
        self.leaf.as_ref()
    }

    /// Whether a leaf schema has been applied.
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    /// Wildcard schema applied to every child.
    pub fn subschema(&self) -> Option<&Schema> {
        self.subschema.as_ref()
    }
}
