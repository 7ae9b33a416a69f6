//! The arena-backed store tree: allocation, navigation, and value
//! extraction.
//!
//! Nodes live in a flat `Vec` of slots addressed by [`NodeId`]. Parent
//! links are plain handles, so `..` walks need no back-references.
//! Removed subtrees return their slots to a free list with a bumped
//! generation.
//!
//! Structural edits run inside [`Store::atomically`], which journals the
//! pre-image of every slot it touches and restores them on error.

use std::sync::Arc;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use arbor_core::{
    Path, PathStep, PortTopology, ProcessRef, Registry, States, StoreError, Value, ValueMap,
};

use crate::handle::NodeId;
use crate::node::{Leaf, Node};

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Undo log for one open transaction.
struct Journal {
    slots_len: usize,
    free_list: Vec<u32>,
    live: usize,
    rng: ChaCha8Rng,
    /// Slot index → generation and node before the first touch.
    touched: IndexMap<u32, (u32, Option<Node>)>,
}

/// The hierarchical simulation state.
pub struct Store {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    root: NodeId,
    pub(crate) registry: Arc<Registry>,
    pub(crate) rng: ChaCha8Rng,
    journal: Option<Journal>,
}

impl Store {
    /// An empty store resolving names through `registry`, with seed 0.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_seed(registry, 0)
    }

    /// An empty store whose dividers draw from a `ChaCha8Rng` seeded
    /// with `seed`.
    pub fn with_seed(registry: Arc<Registry>, seed: u64) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::new("", None)),
            }],
            free_list: Vec::new(),
            live: 1,
            root: NodeId::new(0, 0),
            registry,
            rng: ChaCha8Rng::seed_from_u64(seed),
            journal: None,
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The registry names are resolved through.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.live
    }

    /// Resolve a handle. Stale handles return `None`.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if self.slots.get(id.index as usize)?.generation != id.generation {
            return None;
        }
        self.record(id.index);
        self.slots.get_mut(id.index as usize)?.node.as_mut()
    }

    /// Whether `id` still refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    // ── Allocation ─────────────────────────────────────────────────

    fn alloc(&mut self, node: Node) -> Result<NodeId, StoreError> {
        if let Some(index) = self.free_list.pop() {
            self.record(index);
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.node = Some(node);
                self.live += 1;
                return Ok(NodeId::new(index, slot.generation));
            }
        }
        self.live += 1;
        let index = u32::try_from(self.slots.len()).map_err(|_| StoreError::ArenaExhausted)?;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Ok(NodeId::new(index, 0))
    }

    fn free(&mut self, id: NodeId) -> Option<Node> {
        if self.slots.get(id.index as usize)?.generation != id.generation {
            return None;
        }
        self.record(id.index);
        let slot = self.slots.get_mut(id.index as usize)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.live -= 1;
        Some(node)
    }

    // ── Transactions ───────────────────────────────────────────────

    /// Run `f` with every slot change journaled. On error the arena, the
    /// free list, and the divider generator are restored to their state
    /// before the call, so no partially spliced subtree survives. Nested
    /// calls join the outermost transaction.
    pub fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if self.journal.is_some() {
            return f(self);
        }
        self.journal = Some(Journal {
            slots_len: self.slots.len(),
            free_list: self.free_list.clone(),
            live: self.live,
            rng: self.rng.clone(),
            touched: IndexMap::new(),
        });
        let result = f(self);
        if let Some(journal) = self.journal.take() {
            if result.is_err() {
                self.rollback(journal);
            }
        }
        result
    }

    fn record(&mut self, index: u32) {
        let Some(journal) = &mut self.journal else {
            return;
        };
        if index as usize >= journal.slots_len || journal.touched.contains_key(&index) {
            return;
        }
        if let Some(slot) = self.slots.get(index as usize) {
            journal
                .touched
                .insert(index, (slot.generation, slot.node.clone()));
        }
    }

    fn rollback(&mut self, journal: Journal) {
        self.slots.truncate(journal.slots_len);
        for (index, (generation, node)) in journal.touched {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.generation = generation;
                slot.node = node;
            }
        }
        self.free_list = journal.free_list;
        self.live = journal.live;
        self.rng = journal.rng;
    }

    /// Create a named child under `parent`. The child immediately
    /// receives the parent's wildcard subschema, if any.
    pub fn create_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, StoreError> {
        let parent_node = self.node(parent).ok_or_else(|| StoreError::MissingPath {
            path: Path::root(),
        })?;
        if let Some(existing) = parent_node.child(name) {
            return Ok(existing);
        }
        if parent_node.is_leaf() {
            return Err(StoreError::LeafBranchConflict {
                path: self.path_of(parent),
            });
        }
        let subschema = parent_node.subschema.clone();
        let id = self.alloc(Node::new(name, Some(parent)))?;
        if let Some(p) = self.node_mut(parent) {
            p.children.insert(name.to_string(), id);
        }
        if let Some(schema) = subschema {
            self.apply_config(id, &schema)?;
        }
        Ok(id)
    }

    /// Detach and free the subtree at `id`. Returns the removed node's
    /// absolute path, or `None` if `id` was stale or the root.
    pub fn remove(&mut self, id: NodeId) -> Option<Path> {
        let node = self.node(id)?;
        let parent = node.parent?;
        let name = node.name.clone();
        let path = self.path_of(id);
        if let Some(p) = self.node_mut(parent) {
            p.children.shift_remove(&name);
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(freed) = self.free(next) {
                stack.extend(freed.children.values().copied());
            }
        }
        Some(path)
    }

    // ── Navigation ─────────────────────────────────────────────────

    /// Follow `path` from `from`. Missing steps (and `..` above the root)
    /// yield `None`: a port pointing at state that does not exist yet is
    /// not an error.
    pub fn get_path(&self, from: NodeId, path: &Path) -> Option<NodeId> {
        let mut current = from;
        for step in path.steps() {
            let node = self.node(current)?;
            current = match step {
                PathStep::Key(k) => node.child(k)?,
                PathStep::Parent => node.parent?,
            };
        }
        self.node(current).map(|_| current)
    }

    /// Follow an absolute path from the root.
    pub fn resolve(&self, path: &Path) -> Option<NodeId> {
        self.get_path(self.root, path)
    }

    /// Follow `path` from `from`, creating missing branches.
    ///
    /// # Errors
    ///
    /// [`StoreError::PathAboveRoot`] if `..` climbs past the root, and
    /// [`StoreError::LeafBranchConflict`] if a step would create a child
    /// under a leaf.
    pub fn establish_path(&mut self, from: NodeId, path: &Path) -> Result<NodeId, StoreError> {
        let mut current = from;
        for step in path.steps() {
            let node = self.node(current).ok_or_else(|| StoreError::MissingPath {
                path: path.clone(),
            })?;
            current = match step {
                PathStep::Key(k) => match node.child(k) {
                    Some(child) => child,
                    None => self.create_child(current, k)?,
                },
                PathStep::Parent => node.parent.ok_or_else(|| StoreError::PathAboveRoot {
                    path: path.clone(),
                })?,
            };
        }
        Ok(current)
    }

    /// Absolute path of a node.
    pub fn path_of(&self, id: NodeId) -> Path {
        let mut names = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            match node.parent {
                Some(parent) => {
                    names.push(node.name.as_str());
                    current = self.node(parent);
                }
                None => break,
            }
        }
        names.into_iter().rev().collect()
    }

    // ── Values ─────────────────────────────────────────────────────

    /// The value of a node: a leaf's value (`Null` when unset), or a map
    /// of every child's value for a branch.
    pub fn get_value(&self, id: NodeId) -> Value {
        let Some(node) = self.node(id) else {
            return Value::Null;
        };
        match &node.leaf {
            Some(leaf) => leaf.value.clone().unwrap_or_default(),
            None => Value::Map(
                node.children
                    .iter()
                    .map(|(name, child)| (name.clone(), self.get_value(*child)))
                    .collect(),
            ),
        }
    }

    /// The value at `path` relative to `from`, if the path resolves.
    pub fn get_in(&self, from: NodeId, path: &Path) -> Option<Value> {
        self.get_path(from, path).map(|id| self.get_value(id))
    }

    /// Collect leaf values selected by `select` into a nested map
    /// mirroring the tree. Branches with nothing selected are omitted.
    pub fn collect_values<F>(&self, id: NodeId, select: &F) -> Option<Value>
    where
        F: Fn(&Leaf) -> Option<Value>,
    {
        let node = self.node(id)?;
        if let Some(leaf) = &node.leaf {
            return select(leaf);
        }
        let map: ValueMap = node
            .children
            .iter()
            .filter_map(|(name, child)| {
                self.collect_values(*child, select)
                    .map(|v| (name.clone(), v))
            })
            .collect();
        (!map.is_empty()).then_some(Value::Map(map))
    }

    /// Overwrite values under `id`, bypassing updaters.
    ///
    /// A map written to a branch is distributed to its children, creating
    /// missing ones. Anything written to a leaf or a fresh node replaces
    /// its value.
    pub fn set_value(&mut self, id: NodeId, value: &Value) -> Result<(), StoreError> {
        let node = self.node(id).ok_or_else(|| StoreError::MissingPath {
            path: Path::root(),
        })?;
        let is_branch = node.leaf.is_none() && (!node.children.is_empty() || node.subschema.is_some());
        match value {
            Value::Map(entries) if is_branch || (node.leaf.is_none() && !entries.is_empty()) => {
                for (name, v) in entries {
                    let child = self.create_child(id, name)?;
                    self.set_value(child, v)?;
                }
                Ok(())
            }
            _ if is_branch => Err(StoreError::InvalidUpdate {
                path: self.path_of(id),
                reason: format!("cannot set a {} value on a branch", value.type_name()),
            }),
            _ => {
                if let Some(node) = self.node_mut(id) {
                    node.leaf.get_or_insert_with(Leaf::default).value = Some(value.clone());
                }
                Ok(())
            }
        }
    }

    /// Port states for a process whose containing node is `frame`.
    /// Unresolvable ports map to `Null`.
    pub fn port_states(&self, frame: NodeId, ports: &PortTopology) -> States {
        ports
            .iter()
            .map(|(port, path)| {
                let value = self.get_in(frame, path).unwrap_or_default();
                (port.clone(), value)
            })
            .collect()
    }

    // ── Traversal ──────────────────────────────────────────────────

    /// Pre-order traversal of the subtree at `id`, with paths relative to
    /// `id` (the node itself comes first, at the empty path).
    pub fn depth(&self, id: NodeId) -> Vec<(Path, NodeId)> {
        let mut out = Vec::new();
        let mut stack = vec![(Path::root(), id)];
        while let Some((path, next)) = stack.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            for (name, child) in node.children.iter().rev() {
                stack.push((path.child(name.as_str()), *child));
            }
            out.push((path, next));
        }
        out
    }

    /// Every process stored in the tree, in pre-order, with absolute
    /// paths.
    pub fn processes(&self) -> Vec<(Path, ProcessRef)> {
        self.depth(self.root)
            .into_iter()
            .filter_map(|(path, id)| {
                let leaf = self.node(id)?.leaf.as_ref()?;
                match &leaf.value {
                    Some(Value::Process(p)) => Some((path, p.clone())),
                    _ => None,
                }
            })
            .collect()
    }

    /// Values of every leaf marked `emit`, as a nested map mirroring the
    /// tree.
    pub fn emit_view(&self) -> Value {
        self.collect_values(self.root, &|leaf: &Leaf| {
            leaf.emit.then(|| leaf.value.clone().unwrap_or_default())
        })
        .unwrap_or_else(Value::map)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Arc::new(Registry::default()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("nodes", &self.live)
            .field("free", &self.free_list.len())
            .finish_non_exhaustive()
    }
}
