//! Arbor: a multi-rate simulation kernel over a hierarchical state store.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Arbor sub-crates. For most users, adding `arbor` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use arbor::prelude::*;
//!
//! // First-order decay of one leaf.
//! struct Decay;
//! impl Process for Decay {
//!     fn name(&self) -> &str { "decay" }
//!     fn ports_schema(&self) -> PortsSchema {
//!         let x = LeafSchema::new().with_default(1.0).with_emit(true);
//!         PortsSchema::from([("cell".to_string(), Schema::branch().with_leaf("x", x))])
//!     }
//!     fn next_update(&self, interval: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
//!         let x = states["cell"]["x"].as_f64().unwrap_or(0.0);
//!         Ok(ProcessUpdate::from([(
//!             "cell".to_string(),
//!             BranchUpdate::new().with_write("x", -0.5 * x * interval).into(),
//!         )]))
//!     }
//! }
//!
//! let composite = Composite::new()
//!     .with_process("decay", ProcessRef::new(Decay), [("cell", "cell")]);
//! let log = RamEmitter::new();
//! let mut config = ExperimentConfig::new(composite);
//! config.emitter = Box::new(log.clone());
//!
//! let mut experiment = Experiment::new(config).unwrap();
//! experiment.update(2.0).unwrap();
//! assert_eq!(experiment.global_time(), 2.0);
//! assert_eq!(log.history().len(), 3);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `arbor-core` | Values, paths, schemas, updaters, dividers, updates, the `Process` trait |
//! | [`store`] | `arbor-store` | Arena-backed store, navigation, division, wiring |
//! | [`engine`] | `arbor-engine` | Experiment scheduler, configuration, emitters, metrics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary (`arbor-core`).
///
/// Contains [`types::Value`], [`types::Path`], schema fragments, the
/// updater and divider strategies with their [`types::Registry`], the
/// typed [`types::Update`] tree, and the [`types::Process`] trait.
pub use arbor_core as types;

/// The hierarchical state store (`arbor-store`).
///
/// [`store::Store`] plus the wiring entry points
/// [`store::generate`] and [`store::validate_composite`].
pub use arbor_store as store;

/// The experiment scheduler (`arbor-engine`).
///
/// [`engine::Experiment`] drives processes to a horizon;
/// [`engine::RamEmitter`] records what it emits.
pub use arbor_engine as engine;

/// Common imports for typical Arbor usage.
///
/// ```rust
/// use arbor::prelude::*;
/// ```
pub mod prelude {
    // Values, paths, schemas
    pub use arbor_core::{
        DividerSpec, LeafSchema, Path, PathStep, ProcessRef, Schema, UpdaterSpec, Value,
        ValueMap,
    };

    // Strategies
    pub use arbor_core::{Divider, Registry, Updater};

    // Processes and updates
    pub use arbor_core::{
        BranchUpdate, Composite, DaughterSpec, DeriverSpec, DivideSpec, GenerateSpec,
        PortsSchema, Process, ProcessUpdate, ReduceSpec, States, Topology, Update,
    };

    // Errors
    pub use arbor_core::{ProcessError, StoreError, WiringError};

    // Store
    pub use arbor_store::{NodeId, Store};

    // Engine
    pub use arbor_engine::{
        ConfigError, Emission, Emitter, Experiment, ExperimentConfig, ExperimentError,
        NullEmitter, RamEmitter, Table, UpdateMetrics,
    };
}
