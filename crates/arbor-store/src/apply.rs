//! Applying typed updates to the store.
//!
//! [`Store::apply_update`] is the single recursive entry point. A branch
//! update runs its structural slots first (delete, generate, divide) and
//! then recurses into its children; a leaf update is merged by the leaf's
//! updater. Structural changes are reported upward as a
//! [`TopologyDelta`].

use tracing::debug;

use arbor_core::{BranchUpdate, Path, StoreError, TopologyDelta, Update, Updater, Value};

use crate::handle::NodeId;
use crate::store::Store;
use crate::wiring;

impl Store {
    /// Apply an update at an absolute path.
    ///
    /// A missing target is established first when the update generates
    /// or divides below it. Any other update to a missing target (removed
    /// earlier in the same batch) is skipped.
    pub fn apply_update_at(
        &mut self,
        path: &Path,
        update: &Update,
    ) -> Result<TopologyDelta, StoreError> {
        let path = path.normalize();
        if !path.is_resolved() {
            return Err(StoreError::PathAboveRoot { path });
        }
        match self.resolve(&path) {
            Some(id) => self.apply_update(id, update),
            None if grows(update) => {
                let root = self.root();
                let id = self.establish_path(root, &path)?;
                self.apply_update(id, update)
            }
            None => {
                debug!(path = %path, "update target missing, skipped");
                Ok(TopologyDelta::default())
            }
        }
    }

    /// Apply `update` to the node at `id`.
    pub fn apply_update(&mut self, id: NodeId, update: &Update) -> Result<TopologyDelta, StoreError> {
        match update {
            Update::Write(value) => self.write(id, value, None),
            Update::Override { value, updater } => self.write(id, value, Some(updater)),
            Update::Reduce(spec) => {
                let parent = self
                    .node(id)
                    .and_then(|n| n.parent())
                    .unwrap_or_else(|| self.root());
                let folded = match self.get_path(parent, &spec.from) {
                    Some(from) => self.reduce_with(from, spec.initial.clone(), &spec.reducer),
                    None => spec.initial.clone(),
                };
                self.write(id, &folded, None)
            }
            Update::Branch(branch) => self.apply_branch(id, branch),
        }
    }

    fn write(
        &mut self,
        id: NodeId,
        incoming: &Value,
        updater: Option<&Updater>,
    ) -> Result<TopologyDelta, StoreError> {
        let node = self.node(id).ok_or_else(|| StoreError::MissingPath {
            path: self.path_of(id),
        })?;
        if !node.is_leaf() && (node.child_count() > 0 || node.subschema().is_some()) {
            // A map written to a branch is a write to each named child.
            let Value::Map(entries) = incoming else {
                return Err(StoreError::InvalidUpdate {
                    path: self.path_of(id),
                    reason: format!("cannot write a {} value to a branch", incoming.type_name()),
                });
            };
            let mut delta = TopologyDelta::default();
            for (name, value) in entries {
                let child = self.create_child(id, name)?;
                delta.merge(self.write(child, value, updater)?);
            }
            return Ok(delta);
        }

        self.ensure_leaf(id)?;
        let Some(leaf) = self.node(id).and_then(|n| n.leaf()) else {
            return Ok(TopologyDelta::default());
        };
        let updater = updater.unwrap_or(leaf.updater());
        let current = leaf.value().cloned().unwrap_or_default();
        let next = updater
            .apply(&current, incoming)
            .map_err(|reason| StoreError::UpdaterFailed {
                path: self.path_of(id),
                updater: updater.name().to_string(),
                reason,
            })?;
        if let Some(leaf) = self.node_mut(id).and_then(|n| n.leaf.as_mut()) {
            leaf.value = Some(next);
        }
        Ok(TopologyDelta::default())
    }

    fn apply_branch(&mut self, id: NodeId, branch: &BranchUpdate) -> Result<TopologyDelta, StoreError> {
        let mut delta = TopologyDelta::default();
        if branch.is_empty() {
            return Ok(delta);
        }
        if self.node(id).is_some_and(|n| n.is_leaf()) {
            return Err(StoreError::InvalidUpdate {
                path: self.path_of(id),
                reason: "branch update applied to a leaf".to_string(),
            });
        }

        for path in &branch.delete {
            match self.get_path(id, path) {
                Some(target) if target == self.root() => {
                    return Err(StoreError::InvalidUpdate {
                        path: Path::root(),
                        reason: "the root cannot be deleted".to_string(),
                    });
                }
                Some(target) => {
                    if let Some(removed) = self.remove(target) {
                        debug!(path = %removed, "subtree deleted");
                        delta.removed.push(removed);
                    }
                }
                None => debug!(path = %path, "delete target missing, skipped"),
            }
        }

        for spec in &branch.generate {
            let added = wiring::generate(self, id, &spec.path, &spec.composite)?;
            debug!(path = %spec.path, processes = added.added.len(), "subtree generated");
            delta.merge(added);
        }

        if let Some(spec) = &branch.divide {
            delta.merge(self.divide(id, spec)?);
        }

        for (name, update) in &branch.children {
            if update.is_empty() {
                continue;
            }
            let child = match self.node(id).and_then(|n| n.child(name)) {
                Some(child) => child,
                None if matches!(update, Update::Branch(_)) && !grows(update) => {
                    debug!(parent = %self.path_of(id), child = %name, "update target missing, skipped");
                    continue;
                }
                None => self.create_child(id, name)?,
            };
            delta.merge(self.apply_update(child, update)?);
        }
        Ok(delta)
    }
}

/// Whether `update` generates or divides anywhere below its target.
fn grows(update: &Update) -> bool {
    match update {
        Update::Branch(b) => {
            !b.generate.is_empty() || b.divide.is_some() || b.children.values().any(grows)
        }
        _ => false,
    }
}
