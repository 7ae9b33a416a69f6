//! Wiring composites into the store.
//!
//! [`generate`] runs in two phases. First the composite is expanded
//! (declared derivers become sibling processes) and validated against the
//! registry without touching the store. Only then are paths established,
//! port schemas applied, processes stored as leaves, and initial state
//! seeded, inside one [`Store::atomically`] transaction. A composite that
//! fails validation or hits a schema conflict leaves the store unchanged.

use std::sync::Arc;

use tracing::warn;

use arbor_core::{
    Composite, LeafSchema, Path, PortTopology, Registry, Schema, StoreError, TopologyDelta,
    Updater, Value, WiringError,
};

use crate::handle::NodeId;
use crate::store::Store;

/// Instantiate every deriver declared by the composite's processes and
/// wire it as a sibling of its owner.
///
/// Deriver port `p` is wired to the owner's topology entry for
/// `port_mapping[p]`, or for `p` itself when unmapped. A process already
/// present at the deriver's path is kept.
pub fn expand_derivers(registry: &Registry, composite: &Composite) -> Result<Composite, WiringError> {
    let mut expanded = composite.clone();
    for (owner, process) in &composite.processes {
        for spec in process.derivers() {
            let path = owner.parent().unwrap_or_default().child(spec.name.as_str());
            if expanded.processes.contains_key(&path) {
                continue;
            }
            let factory =
                registry
                    .process_factory(&spec.key)
                    .ok_or_else(|| WiringError::UnknownDeriver {
                        process: owner.clone(),
                        key: spec.key.clone(),
                    })?;
            let deriver = factory(&spec.config).map_err(|e| WiringError::DeriverFailed {
                process: owner.clone(),
                reason: e.to_string(),
            })?;

            let owner_ports = composite.topology.get(owner);
            let mut ports = PortTopology::new();
            for port in deriver.ports_schema().keys() {
                let owner_port = spec.port_mapping.get(port).unwrap_or(port);
                let target = owner_ports
                    .and_then(|t| t.get(owner_port))
                    .ok_or_else(|| WiringError::TopologyPortMismatch {
                        process: owner.clone(),
                        path: Path::root(),
                        port: owner_port.clone(),
                    })?;
                ports.insert(port.clone(), target.clone());
            }
            expanded.processes.insert(path.clone(), deriver);
            expanded.topology.insert(path, ports);
        }
    }
    Ok(expanded)
}

/// Check a composite that will be generated at the absolute path `base`.
///
/// # Errors
///
/// - [`WiringError::TopologyPortMismatch`] if a declared port has no
///   topology entry.
/// - [`WiringError::InvalidTimestep`] if a non-deriver's timestep is not
///   finite and positive.
/// - [`StoreError::UnknownUpdater`]/[`StoreError::UnknownDivider`] for
///   unregistered names in any port schema.
/// - [`StoreError::PathAboveRoot`] if a port climbs above the root.
pub fn validate_composite(
    registry: &Registry,
    base: &Path,
    composite: &Composite,
) -> Result<(), StoreError> {
    if !base.is_resolved() {
        return Err(StoreError::PathAboveRoot { path: base.clone() });
    }
    let empty = PortTopology::new();
    for (path, process) in &composite.processes {
        if path.is_empty() {
            return Err(StoreError::InvalidUpdate {
                path: base.clone(),
                reason: format!("process '{}' has an empty path", process.name()),
            });
        }
        let ports = process.ports_schema();
        let topology = composite.topology.get(path).unwrap_or(&empty);
        let frame = base.join(&path.parent().unwrap_or_default());

        for (port, schema) in &ports {
            let target = topology
                .get(port)
                .ok_or_else(|| WiringError::TopologyPortMismatch {
                    process: path.clone(),
                    path: Path::root(),
                    port: port.clone(),
                })?;
            let absolute = frame.join(target);
            if !absolute.is_resolved() {
                return Err(StoreError::PathAboveRoot { path: absolute });
            }
            check_names(registry, schema, &absolute)?;
        }
        for port in topology.keys().filter(|p| !ports.contains_key(*p)) {
            warn!(process = %path, port = %port, "topology entry for undeclared port ignored");
        }

        if !process.is_deriver() {
            let step = process.local_timestep();
            if !step.is_finite() || step <= 0.0 {
                return Err(WiringError::InvalidTimestep {
                    process: path.clone(),
                    value: step,
                }
                .into());
            }
        }
    }
    for path in composite.topology.keys() {
        if !composite.processes.contains_key(path) {
            warn!(process = %path, "topology for unknown process ignored");
        }
    }
    Ok(())
}

fn check_names(registry: &Registry, schema: &Schema, at: &Path) -> Result<(), StoreError> {
    if let Some(leaf) = &schema.leaf {
        if let Some(spec) = &leaf.updater {
            registry
                .resolve_updater(spec)
                .map_err(|name| StoreError::UnknownUpdater {
                    path: at.clone(),
                    name,
                })?;
        }
        if let Some(spec) = &leaf.divider {
            registry
                .resolve_divider(spec)
                .map_err(|name| StoreError::UnknownDivider {
                    path: at.clone(),
                    name,
                })?;
        }
    }
    for (name, child) in &schema.children {
        check_names(registry, child, &at.child(name.as_str()))?;
    }
    if let Some(sub) = &schema.subschema {
        check_names(registry, sub, &at.child("*"))?;
    }
    Ok(())
}

/// Wire `composite` at `path` (relative to `at`).
///
/// Every process is stored as a leaf (updater `set`) at its own path; each
/// declared port's schema is applied at the port's target, established
/// relative to the process's containing node. `initial_state` is then
/// applied as explicit `_value`s relative to the base path and all
/// wildcard subschemas are re-applied.
///
/// Returns the added processes' absolute paths and port wiring.
pub fn generate(
    store: &mut Store,
    at: NodeId,
    path: &Path,
    composite: &Composite,
) -> Result<TopologyDelta, StoreError> {
    let registry = Arc::clone(&store.registry);
    let composite = expand_derivers(&registry, composite)?;
    let base = store.path_of(at).join(path);
    validate_composite(&registry, &base, &composite)?;

    store.atomically(|store| splice(store, at, path, &composite))
}

fn splice(
    store: &mut Store,
    at: NodeId,
    path: &Path,
    composite: &Composite,
) -> Result<TopologyDelta, StoreError> {
    let base_id = store.establish_path(at, path)?;
    let process_leaf = Schema::leaf(LeafSchema::new().with_updater(Updater::Set));
    let mut delta = TopologyDelta::default();

    for (process_path, process) in &composite.processes {
        let node = store.establish_path(base_id, process_path)?;
        store.apply_config(node, &process_leaf)?;
        if let Some(leaf) = store.node_mut(node).and_then(|n| n.leaf.as_mut()) {
            leaf.value = Some(Value::Process(process.clone()));
        }
        let frame = store
            .node(node)
            .and_then(|n| n.parent())
            .unwrap_or(base_id);
        let ports = composite
            .topology
            .get(process_path)
            .cloned()
            .unwrap_or_default();
        for (port, schema) in process.ports_schema() {
            if let Some(target) = ports.get(&port) {
                let target_id = store.establish_path(frame, target)?;
                store.apply_config(target_id, &schema)?;
            }
        }
        delta.added.insert(store.path_of(node), ports);
    }

    seed_initial(store, base_id, &composite.initial_state)?;
    let root = store.root();
    store.apply_subschemas(root)?;
    Ok(delta)
}

fn seed_initial(store: &mut Store, id: NodeId, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::Null => Ok(()),
        Value::Map(entries) if !store.node(id).is_some_and(|n| n.is_leaf()) => {
            for (name, v) in entries {
                let child = store.create_child(id, name)?;
                seed_initial(store, child, v)?;
            }
            Ok(())
        }
        v => store.apply_config(id, &Schema::leaf(LeafSchema::new().with_value(v.clone()))),
    }
}
