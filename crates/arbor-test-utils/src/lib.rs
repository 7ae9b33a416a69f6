//! Test fixtures for Arbor development.
//!
//! Provides small deterministic [`Process`](arbor_core::Process)
//! implementations and composite builders shared by the store, engine,
//! and benchmark test suites.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    agent_composite, growth_death_composite, slow_fast_composite, CopyDeriver,
    DeathThreshold, DivideAtThreshold, FailingProcess, FastMotion, Growth, SlowGrowth,
};
