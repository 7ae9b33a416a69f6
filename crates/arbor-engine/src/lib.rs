//! Experiment scheduler for Arbor simulations.
//!
//! An [`Experiment`] owns one [`Store`](arbor_store::Store) and drives
//! every process wired into it to a common horizon. Processes run at
//! their own local timesteps; their updates are merged in batches as
//! fronts complete, and derivers re-run after every merge. Snapshots of
//! emitted state go to an [`Emitter`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod emitter;
pub mod experiment;
pub mod metrics;

pub use config::{ConfigError, ExperimentConfig};
pub use emitter::{Emission, Emitter, NullEmitter, RamEmitter, Table};
pub use experiment::{Experiment, ExperimentError, Front};
pub use metrics::UpdateMetrics;
