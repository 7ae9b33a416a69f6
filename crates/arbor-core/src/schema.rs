//! Schema fragments declared by processes for the state they touch.
//!
//! A [`Schema`] is a config fragment applied to one store node: either
//! leaf semantics ([`LeafSchema`]), a map of child schemas, and/or a
//! wildcard `subschema` applied to every child of the node (including
//! children created later).

use std::fmt;

use indexmap::IndexMap;

use crate::divider::Divider;
use crate::error::StoreError;
use crate::path::Path;
use crate::update::PortTopology;
use crate::updater::Updater;
use crate::value::{Value, ValueMap};

/// An updater named by registry key or supplied directly.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdaterSpec {
    /// Registry key, resolved at wiring time.
    Named(String),
    /// Already resolved.
    Resolved(Updater),
}

impl From<&str> for UpdaterSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<Updater> for UpdaterSpec {
    fn from(u: Updater) -> Self {
        Self::Resolved(u)
    }
}

/// A divider named by registry key, supplied directly, or paired with
/// the sibling topology it needs.
#[derive(Clone, Debug, PartialEq)]
pub enum DividerSpec {
    /// Registry key, resolved at wiring time.
    Named(String),
    /// Already resolved.
    Resolved(Divider),
    /// `{divider, topology}`: the topology is resolved relative to the
    /// leaf's parent at division time.
    WithTopology {
        /// The underlying divider.
        divider: Box<DividerSpec>,
        /// Port name → path, relative to the leaf's parent.
        topology: PortTopology,
    },
}

impl From<&str> for DividerSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<Divider> for DividerSpec {
    fn from(d: Divider) -> Self {
        Self::Resolved(d)
    }
}

/// Leaf semantics. Every field is optional; absent fields leave the
/// leaf's existing configuration untouched when merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeafSchema {
    /// `_default`: initial value when nothing else seeds the leaf.
    pub default: Option<Value>,
    /// `_value`: explicit initial value.
    pub value: Option<Value>,
    /// `_updater`.
    pub updater: Option<UpdaterSpec>,
    /// `_divider`.
    pub divider: Option<DividerSpec>,
    /// `_units`.
    pub units: Option<String>,
    /// `_emit`.
    pub emit: Option<bool>,
    /// `_properties`: free-form metadata (e.g. per-unit mass).
    pub properties: ValueMap,
}

impl LeafSchema {
    /// An empty leaf schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `_default`.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set `_value`.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set `_updater`.
    pub fn with_updater(mut self, updater: impl Into<UpdaterSpec>) -> Self {
        self.updater = Some(updater.into());
        self
    }

    /// Set `_divider`.
    pub fn with_divider(mut self, divider: impl Into<DividerSpec>) -> Self {
        self.divider = Some(divider.into());
        self
    }

    /// Set `_units`.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Set `_emit`.
    pub fn with_emit(mut self, emit: bool) -> Self {
        self.emit = Some(emit);
        self
    }

    /// Add one `_properties` entry.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merge `other` into this leaf schema, field by field, with the same
    /// rules the store applies to configured leaves. `emit` is OR-ed.
    fn merge_fields(&mut self, other: &LeafSchema, path: &Path) -> Result<(), StoreError> {
        if let Some(incoming) = &other.default {
            merge_field(&mut self.default, incoming, Value::same_as, path, "_default")?;
        }
        if let Some(incoming) = &other.value {
            merge_field(&mut self.value, incoming, Value::same_as, path, "_value")?;
        }
        if let Some(incoming) = &other.updater {
            merge_field(&mut self.updater, incoming, |a, b| a == b, path, "_updater")?;
        }
        if let Some(incoming) = &other.divider {
            merge_field(&mut self.divider, incoming, |a, b| a == b, path, "_divider")?;
        }
        if let Some(incoming) = &other.units {
            merge_field(&mut self.units, incoming, |a, b| a == b, path, "_units")?;
        }
        self.emit = match (self.emit, other.emit) {
            (Some(a), Some(b)) => Some(a || b),
            (a, b) => a.or(b),
        };
        for (key, incoming) in &other.properties {
            let mut slot = self.properties.get(key).cloned();
            if merge_field(&mut slot, incoming, Value::same_as, path, "_properties")? {
                self.properties.insert(key.clone(), incoming.clone());
            }
        }
        Ok(())
    }
}

/// Merge one optional schema field. An unset slot takes `incoming`; a set
/// slot must already agree with it under `same`. Returns whether the slot
/// was unset.
///
/// # Errors
///
/// [`StoreError::SchemaMergeConflict`] at `path` when the slot holds a
/// value `same` rejects.
pub fn merge_field<T: Clone + fmt::Debug>(
    slot: &mut Option<T>,
    incoming: &T,
    same: impl Fn(&T, &T) -> bool,
    path: &Path,
    key: &'static str,
) -> Result<bool, StoreError> {
    match slot.as_ref() {
        Some(existing) if same(existing, incoming) => Ok(false),
        Some(existing) => Err(StoreError::SchemaMergeConflict {
            path: path.clone(),
            key,
            existing: format!("{existing:?}"),
            incoming: format!("{incoming:?}"),
        }),
        None => {
            *slot = Some(incoming.clone());
            Ok(true)
        }
    }
}

/// A config fragment for one node and, recursively, its children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    /// Leaf semantics for this node.
    pub leaf: Option<LeafSchema>,
    /// Named child fragments.
    pub children: IndexMap<String, Schema>,
    /// Wildcard (`*`) fragment applied to every child.
    pub subschema: Option<Box<Schema>>,
}

impl Schema {
    /// A branch fragment with no children yet.
    pub fn branch() -> Self {
        Self::default()
    }

    /// A leaf fragment.
    pub fn leaf(leaf: LeafSchema) -> Self {
        Self {
            leaf: Some(leaf),
            ..Self::default()
        }
    }

    /// A branch whose every child follows `subschema`.
    pub fn wildcard(subschema: Schema) -> Self {
        Self {
            subschema: Some(Box::new(subschema)),
            ..Self::default()
        }
    }

    /// Add a named child fragment.
    pub fn with_child(mut self, name: impl Into<String>, child: Schema) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// Add a named leaf child.
    pub fn with_leaf(self, name: impl Into<String>, leaf: LeafSchema) -> Self {
        self.with_child(name, Schema::leaf(leaf))
    }

    /// Whether this fragment carries leaf semantics.
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    /// Combine `other` into this fragment, where `path` names the node it
    /// describes. Leaf fields merge as on a configured leaf; wildcard
    /// fragments report conflicts under `path/*`. On error `self` is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`StoreError::SchemaMergeConflict`] when a leaf field disagrees and
    /// [`StoreError::LeafBranchConflict`] when leaf semantics meet children.
    pub fn merge(&mut self, other: &Schema, path: &Path) -> Result<(), StoreError> {
        let mut merged = self.clone();
        merged.merge_into(other, path)?;
        *self = merged;
        Ok(())
    }

    fn wants_branch(&self) -> bool {
        !self.children.is_empty() || self.subschema.is_some()
    }

    fn merge_into(&mut self, other: &Schema, path: &Path) -> Result<(), StoreError> {
        if (self.leaf.is_some() && other.wants_branch())
            || (other.leaf.is_some() && self.wants_branch())
        {
            return Err(StoreError::LeafBranchConflict { path: path.clone() });
        }
        match (&mut self.leaf, &other.leaf) {
            (Some(mine), Some(theirs)) => mine.merge_fields(theirs, path)?,
            (None, Some(theirs)) => self.leaf = Some(theirs.clone()),
            _ => {}
        }
        for (name, child) in &other.children {
            match self.children.get_mut(name) {
                Some(existing) => existing.merge_into(child, &path.child(name.as_str()))?,
                None => {
                    self.children.insert(name.clone(), child.clone());
                }
            }
        }
        match (&mut self.subschema, &other.subschema) {
            (Some(mine), Some(theirs)) => mine.merge_into(theirs, &path.child("*"))?,
            (None, Some(theirs)) => self.subschema = Some(theirs.clone()),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let leaf = LeafSchema::new()
            .with_default(0.0)
            .with_updater("accumulate")
            .with_divider("split")
            .with_units("fg")
            .with_emit(true)
            .with_property("mw", 180.0);
        assert_eq!(leaf.default, Some(Value::Float(0.0)));
        assert_eq!(leaf.updater, Some(UpdaterSpec::Named("accumulate".into())));
        assert_eq!(leaf.divider, Some(DividerSpec::Named("split".into())));
        assert_eq!(leaf.units.as_deref(), Some("fg"));
        assert_eq!(leaf.emit, Some(true));
        assert_eq!(leaf.properties["mw"], Value::Float(180.0));
    }

    #[test]
    fn merge_fills_unset_fields() {
        let mut a = Schema::branch().with_leaf("mass", LeafSchema::new().with_default(1.0));
        let b = Schema::branch()
            .with_leaf("mass", LeafSchema::new().with_default(1.0).with_emit(true))
            .with_leaf("volume", LeafSchema::new().with_default(3.0));
        a.merge(&b, &Path::parse("cell")).unwrap();
        let mass = a.children["mass"].leaf.as_ref().unwrap();
        assert_eq!(mass.default, Some(Value::Float(1.0)));
        assert_eq!(mass.emit, Some(true));
        assert!(a.children.contains_key("volume"));
    }

    #[test]
    fn conflicting_wildcards_fail_and_leave_the_fragment_unchanged() {
        let mut a = Schema::wildcard(Schema::leaf(LeafSchema::new().with_default(1.0)));
        let before = a.clone();
        let b = Schema::wildcard(Schema::leaf(
            LeafSchema::new().with_default(2.0).with_units("fg"),
        ));
        match a.merge(&b, &Path::parse("agents")) {
            Err(StoreError::SchemaMergeConflict { path, key, .. }) => {
                assert_eq!(path, Path::parse("agents/*"));
                assert_eq!(key, "_default");
            }
            other => panic!("expected SchemaMergeConflict, got {other:?}"),
        }
        assert_eq!(a, before);
    }

    #[test]
    fn leaf_fragment_against_children_conflicts() {
        let mut a = Schema::leaf(LeafSchema::new().with_default(0));
        let b = Schema::branch().with_leaf("x", LeafSchema::new());
        let err = a.merge(&b, &Path::parse("cell")).unwrap_err();
        assert_eq!(err, StoreError::LeafBranchConflict { path: Path::parse("cell") });
    }

    #[test]
    fn nan_defaults_merge_idempotently() {
        let leaf = Schema::leaf(LeafSchema::new().with_default(f64::NAN));
        let mut merged = leaf.clone();
        merged.merge(&leaf, &Path::parse("x")).unwrap();
    }

    #[test]
    fn wildcard_holds_subschema() {
        let s = Schema::wildcard(Schema::leaf(LeafSchema::new().with_default(0)));
        assert!(!s.is_leaf());
        assert!(s.subschema.as_ref().unwrap().is_leaf());
    }
}
