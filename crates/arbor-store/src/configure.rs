//! Applying schema fragments to store nodes.
//!
//! Merging is idempotent and commutative for non-conflicting fragments:
//! a field is either unset (and takes the incoming value) or already
//! equal to it. Any other case is a [`StoreError::SchemaMergeConflict`].

use arbor_core::{merge_field, LeafSchema, Schema, StoreError, Value};

use crate::handle::NodeId;
use crate::node::Leaf;
use crate::store::Store;

impl Store {
    /// Merge a schema fragment into the node at `id`, creating children
    /// it names.
    ///
    /// # Errors
    ///
    /// [`StoreError::SchemaMergeConflict`] when a leaf field is already
    /// set to a different value, [`StoreError::LeafBranchConflict`] when
    /// leaf semantics meet children, and
    /// [`StoreError::UnknownUpdater`]/[`StoreError::UnknownDivider`] for
    /// unregistered names.
    pub fn apply_config(&mut self, id: NodeId, schema: &Schema) -> Result<(), StoreError> {
        let node = self.node(id).ok_or_else(|| StoreError::MissingPath {
            path: self.path_of(id),
        })?;
        let wants_branch = !schema.children.is_empty() || schema.subschema.is_some();
        if (schema.leaf.is_some() && (wants_branch || !node.children.is_empty()))
            || (wants_branch && node.is_leaf())
        {
            return Err(StoreError::LeafBranchConflict {
                path: self.path_of(id),
            });
        }

        if let Some(leaf) = &schema.leaf {
            self.configure_leaf(id, leaf)?;
        }

        for (name, child_schema) in &schema.children {
            let child = self.create_child(id, name)?;
            self.apply_config(child, child_schema)?;
        }

        if let Some(sub) = &schema.subschema {
            let merged = match self.node(id).and_then(|n| n.subschema.clone()) {
                Some(mut existing) => {
                    existing.merge(sub, &self.path_of(id).child("*"))?;
                    existing
                }
                None => (**sub).clone(),
            };
            if let Some(node) = self.node_mut(id) {
                node.subschema = Some(merged);
            }
            let children: Vec<NodeId> = self
                .node(id)
                .map(|n| n.children.values().copied().collect())
                .unwrap_or_default();
            for child in children {
                self.apply_config(child, sub)?;
            }
        }
        Ok(())
    }

    fn configure_leaf(&mut self, id: NodeId, schema: &LeafSchema) -> Result<(), StoreError> {
        let updater = schema
            .updater
            .as_ref()
            .map(|spec| {
                self.registry
                    .resolve_updater(spec)
                    .map_err(|name| StoreError::UnknownUpdater {
                        path: self.path_of(id),
                        name,
                    })
            })
            .transpose()?;
        let divider = schema
            .divider
            .as_ref()
            .map(|spec| {
                self.registry
                    .resolve_divider(spec)
                    .map_err(|name| StoreError::UnknownDivider {
                        path: self.path_of(id),
                        name,
                    })
            })
            .transpose()?;

        let mut leaf = self
            .node(id)
            .and_then(|n| n.leaf.clone())
            .unwrap_or_default();

        let path = self.path_of(id);
        if let Some(incoming) = &schema.default {
            let unset = merge_field(&mut leaf.default, incoming, Value::same_as, &path, "_default")?;
            if unset && leaf.value.is_none() {
                leaf.value = Some(incoming.clone());
            }
        }
        if let Some(incoming) = &schema.value {
            if merge_field(&mut leaf.initial, incoming, Value::same_as, &path, "_value")? {
                leaf.value = Some(incoming.clone());
            }
        }
        if let Some(incoming) = &updater {
            merge_field(&mut leaf.updater, incoming, |a, b| a == b, &path, "_updater")?;
        }
        if let Some(incoming) = &divider {
            merge_field(&mut leaf.divider, incoming, |a, b| a == b, &path, "_divider")?;
        }
        if let Some(incoming) = &schema.units {
            merge_field(&mut leaf.units, incoming, |a, b| a == b, &path, "_units")?;
        }
        if let Some(emit) = schema.emit {
            leaf.emit |= emit;
        }
        for (key, incoming) in &schema.properties {
            let mut slot = leaf.properties.get(key).cloned();
            if merge_field(&mut slot, incoming, Value::same_as, &path, "_properties")? {
                leaf.properties.insert(key.clone(), incoming.clone());
            }
        }

        if let Some(node) = self.node_mut(id) {
            node.leaf = Some(leaf);
        }
        Ok(())
    }

    /// Make the node at `id` a leaf if it is not one already, without
    /// touching an existing configuration.
    pub(crate) fn ensure_leaf(&mut self, id: NodeId) -> Result<(), StoreError> {
        let node = self.node(id).ok_or_else(|| StoreError::MissingPath {
            path: self.path_of(id),
        })?;
        if node.is_leaf() {
            return Ok(());
        }
        if !node.children.is_empty() || node.subschema.is_some() {
            return Err(StoreError::LeafBranchConflict {
                path: self.path_of(id),
            });
        }
        if let Some(node) = self.node_mut(id) {
            node.leaf = Some(Leaf::default());
        }
        Ok(())
    }

    /// Re-apply every wildcard subschema in the subtree at `id` to the
    /// children present now. Run after structural changes so freshly
    /// spliced children inherit their ancestors' subschemas.
    pub fn apply_subschemas(&mut self, id: NodeId) -> Result<(), StoreError> {
        let Some(node) = self.node(id) else {
            return Ok(());
        };
        let subschema = node.subschema.clone();
        let children: Vec<NodeId> = node.children.values().copied().collect();
        for child in children {
            if let Some(schema) = &subschema {
                self.apply_config(child, schema)?;
            }
            self.apply_subschemas(child)?;
        }
        Ok(())
    }
}
