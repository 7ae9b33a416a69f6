//! Pre-order folds over store subtrees.

use arbor_core::{NodeView, Reducer, Value};

use crate::handle::NodeId;
use crate::store::Store;

impl Store {
    /// Fold `reducer` over every `(path, node)` pair of the subtree at
    /// `id`, in pre-order, starting from `initial`. Paths are relative
    /// to `id`.
    pub fn reduce<F>(&self, id: NodeId, initial: Value, reducer: F) -> Value
    where
        F: Fn(Value, &NodeView<'_>) -> Value,
    {
        self.depth(id)
            .into_iter()
            .fold(initial, |acc, (path, next)| {
                let Some(node) = self.node(next) else {
                    return acc;
                };
                let leaf = node.leaf();
                let view = NodeView {
                    path: &path,
                    value: leaf.and_then(|l| l.value()),
                    units: leaf.and_then(|l| l.units()),
                    properties: leaf.map(|l| l.properties()),
                };
                reducer(acc, &view)
            })
    }

    pub(crate) fn reduce_with(&self, id: NodeId, initial: Value, reducer: &Reducer) -> Value {
        self.reduce(id, initial, |acc, view| reducer(acc, view))
    }
}
