//! Error types for the Arbor simulation kernel.
//!
//! Organized by subsystem: store (configuration, update application,
//! structural edits), wiring (composite validation), and process
//! execution.

use std::error::Error;
use std::fmt;

use crate::path::Path;

/// Errors from the hierarchical store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreError {
    /// Two schema fragments disagree on a leaf field.
    SchemaMergeConflict {
        /// Path of the conflicting node.
        path: Path,
        /// The schema key in conflict (`_default`, `_updater`, ...).
        key: &'static str,
        /// Rendering of the value already configured.
        existing: String,
        /// Rendering of the incoming value.
        incoming: String,
    },
    /// A leaf schema was applied to a branch, or a child schema to a leaf.
    LeafBranchConflict {
        /// Path of the conflicting node.
        path: Path,
    },
    /// An `_updater` name is not in the registry.
    UnknownUpdater {
        /// Path of the leaf declaring it.
        path: Path,
        /// The unresolved name.
        name: String,
    },
    /// A `_divider` name is not in the registry.
    UnknownDivider {
        /// Path of the leaf declaring it.
        path: Path,
        /// The unresolved name.
        name: String,
    },
    /// A path climbed above the root.
    PathAboveRoot {
        /// The offending path, as given.
        path: Path,
    },
    /// A path required by a structural operation does not exist.
    MissingPath {
        /// The missing path.
        path: Path,
    },
    /// An updater rejected its operands.
    UpdaterFailed {
        /// Path of the leaf being updated.
        path: Path,
        /// Name of the updater.
        updater: String,
        /// Description from the updater.
        reason: String,
    },
    /// A divider rejected its mother value.
    DividerFailed {
        /// Path of the leaf being divided.
        path: Path,
        /// Description from the divider.
        reason: String,
    },
    /// A division named a daughter count other than two.
    DivisionArity {
        /// Path of the mother.
        path: Path,
        /// Number of daughters given.
        daughters: usize,
    },
    /// An update's shape does not fit the node it targets.
    InvalidUpdate {
        /// Path of the targeted node.
        path: Path,
        /// What was wrong.
        reason: String,
    },
    /// The node arena ran out of `u32` indices.
    ArenaExhausted,
    /// A composite failed validation while being generated.
    Wiring(WiringError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaMergeConflict {
                path,
                key,
                existing,
                incoming,
            } => write!(
                f,
                "schema conflict at {path}: {key} is {existing}, refusing {incoming}"
            ),
            Self::LeafBranchConflict { path } => {
                write!(f, "node {path} cannot be both a leaf and a branch")
            }
            Self::UnknownUpdater { path, name } => {
                write!(f, "unknown updater '{name}' at {path}")
            }
            Self::UnknownDivider { path, name } => {
                write!(f, "unknown divider '{name}' at {path}")
            }
            Self::PathAboveRoot { path } => write!(f, "path {path} climbs above the root"),
            Self::MissingPath { path } => write!(f, "no node at {path}"),
            Self::UpdaterFailed {
                path,
                updater,
                reason,
            } => write!(f, "updater '{updater}' failed at {path}: {reason}"),
            Self::DividerFailed { path, reason } => {
                write!(f, "division failed at {path}: {reason}")
            }
            Self::DivisionArity { path, daughters } => write!(
                f,
                "division of {path} needs exactly 2 daughters, got {daughters}"
            ),
            Self::InvalidUpdate { path, reason } => {
                write!(f, "invalid update at {path}: {reason}")
            }
            Self::ArenaExhausted => write!(f, "node arena exhausted"),
            Self::Wiring(e) => write!(f, "wiring failed: {e}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Wiring(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WiringError> for StoreError {
    fn from(e: WiringError) -> Self {
        Self::Wiring(e)
    }
}

/// Errors from validating and instantiating a composite.
#[derive(Clone, Debug, PartialEq)]
pub enum WiringError {
    /// A process's topology and declared ports disagree.
    TopologyPortMismatch {
        /// Path of the process in the composite.
        process: Path,
        /// Path given in the topology (empty if the port is unwired).
        path: Path,
        /// The port name.
        port: String,
    },
    /// A process declared a non-finite or non-positive timestep.
    InvalidTimestep {
        /// Path of the process in the composite.
        process: Path,
        /// The declared timestep.
        value: f64,
    },
    /// A deriver key is not registered.
    UnknownDeriver {
        /// Path of the process declaring it.
        process: Path,
        /// The unregistered key.
        key: String,
    },
    /// A deriver factory rejected its configuration.
    DeriverFailed {
        /// Path of the process declaring it.
        process: Path,
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for WiringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopologyPortMismatch {
                process,
                path,
                port,
            } => write!(
                f,
                "process {process}: port '{port}' has no matching topology entry ({path})"
            ),
            Self::InvalidTimestep { process, value } => {
                write!(f, "process {process}: invalid timestep {value}")
            }
            Self::UnknownDeriver { process, key } => {
                write!(f, "process {process}: unknown deriver '{key}'")
            }
            Self::DeriverFailed { process, reason } => {
                write!(f, "process {process}: deriver construction failed: {reason}")
            }
        }
    }
}

impl Error for WiringError {}

/// Errors from an individual process's `next_update`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessError {
    /// The process could not compute an update.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A port state the process needs was absent or mistyped.
    MissingState {
        /// The port name.
        port: String,
    },
    /// A user-defined constraint was violated.
    ConstraintViolation {
        /// Description of the violated constraint.
        constraint: String,
    },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::MissingState { port } => write!(f, "missing state for port '{port}'"),
            Self::ConstraintViolation { constraint } => {
                write!(f, "constraint violation: {constraint}")
            }
        }
    }
}

impl Error for ProcessError {}
