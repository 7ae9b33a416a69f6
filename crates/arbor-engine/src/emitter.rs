//! Snapshot sinks.
//!
//! An [`Experiment`](crate::Experiment) emits one `configuration` record
//! at construction and one `history` record per scheduler iteration.
//! Persistent back-ends live outside this crate; [`RamEmitter`] keeps
//! records in memory and [`NullEmitter`] drops them.

use std::sync::{Arc, Mutex, PoisonError};

use arbor_core::{Path, Value};

/// Which log a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// Process, topology, and initial-state dump, written once.
    Configuration,
    /// Emitted leaf values at one simulation time.
    History,
}

impl Table {
    /// Table name as used by external back-ends.
    pub fn name(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::History => "history",
        }
    }
}

/// One emitted record.
#[derive(Clone, Debug, PartialEq)]
pub struct Emission {
    /// Destination table.
    pub table: Table,
    /// Absolute simulation time.
    pub time: f64,
    /// Record payload. For history, a nested map of every leaf marked
    /// `emit`, mirroring the store.
    pub data: Value,
}

/// A sink for experiment records.
pub trait Emitter: Send {
    /// Accept one record.
    fn emit(&mut self, emission: Emission);
}

/// Drops every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&mut self, _: Emission) {}
}

/// In-memory emitter. Clones share one log, so a test can keep a clone
/// while the experiment owns another.
#[derive(Clone, Debug, Default)]
pub struct RamEmitter {
    records: Arc<Mutex<Vec<Emission>>>,
}

impl RamEmitter {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record so far, in emission order.
    pub fn records(&self) -> Vec<Emission> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The configuration record, if one was emitted.
    pub fn configuration(&self) -> Option<Emission> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.table == Table::Configuration)
            .cloned()
    }

    /// History records in time order.
    pub fn history(&self) -> Vec<Emission> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.table == Table::History)
            .cloned()
            .collect()
    }

    /// `(time, value)` for `path` across the history log. Records where
    /// the path is absent yield `Null`.
    pub fn timeseries(&self, path: &Path) -> Vec<(f64, Value)> {
        self.history()
            .into_iter()
            .map(|e| (e.time, e.data.get_in(path).cloned().unwrap_or_default()))
            .collect()
    }

    /// Number of records so far.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Emitter for RamEmitter {
    fn emit(&mut self, emission: Emission) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(emission);
    }
}
