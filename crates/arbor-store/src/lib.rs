//! Arena-backed hierarchical state store for Arbor simulations.
//!
//! The store is a tree of schema-typed nodes held in a flat arena:
//!
//! ```text
//! Store
//! ├── Slot[] (generation + Option<Node>), free list for recycling
//! │   └── Node: name, parent NodeId, children IndexMap<String, NodeId>,
//! │             leaf config (value, default, updater, divider, units, emit),
//! │             wildcard subschema
//! ├── Arc<Registry> (string → updater/divider/process factory)
//! └── ChaCha8Rng (seeded, drives dividers)
//! ```
//!
//! # Operations
//!
//! - **Configuration:** [`Store::apply_config`] merges schema fragments
//!   and fails loudly on conflicting leaf fields.
//! - **Navigation:** [`Store::get_path`] (soft, returns `None`) and
//!   [`Store::establish_path`] (creates missing branches), both honoring
//!   `..` steps.
//! - **Updates:** [`Store::apply_update`] runs structural verbs (delete,
//!   generate, divide) before per-child writes and reports a
//!   [`TopologyDelta`](arbor_core::TopologyDelta).
//! - **Wiring:** [`wiring::generate`] splices a validated composite into
//!   the tree, storing processes as ordinary leaves.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod apply;
mod configure;
mod divide;
pub mod handle;
pub mod node;
mod reduce;
pub mod store;
pub mod wiring;

pub use handle::NodeId;
pub use node::{Leaf, Node};
pub use store::Store;
pub use wiring::{expand_derivers, generate, validate_composite};
