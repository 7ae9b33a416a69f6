//! Core types and traits for the Arbor simulation kernel.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the store and the engine: dynamically typed
//! [`Value`]s, store [`Path`]s, schema fragments, the updater and divider
//! strategies with their string lookup [`Registry`], the typed [`Update`]
//! tree, the [`Process`] trait, and the error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod divider;
pub mod error;
pub mod path;
pub mod process;
pub mod registry;
pub mod schema;
pub mod update;
pub mod updater;
pub mod value;

pub use divider::{Divider, DividerFn};
pub use error::{ProcessError, StoreError, WiringError};
pub use path::{Path, PathStep};
pub use process::{
    DeriverSpec, PortsSchema, Process, ProcessUpdate, States, DEFAULT_TIMESTEP,
};
pub use registry::{ProcessFactory, Registry};
pub use schema::{merge_field, DividerSpec, LeafSchema, Schema, UpdaterSpec};
pub use update::{
    BranchUpdate, Composite, DaughterSpec, DivideSpec, GenerateSpec, NodeView, PortTopology,
    ReduceSpec, Reducer, Topology, TopologyDelta, Update,
};
pub use updater::{Updater, UpdaterFn};
pub use value::{ProcessRef, Value, ValueMap};
