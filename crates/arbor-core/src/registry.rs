//! The single string lookup table for updaters, dividers, and process
//! factories.
//!
//! String keys are resolved here, at the wiring boundary, and nowhere
//! else. Registries are plain values owned by an experiment, not
//! process-global singletons.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::divider::Divider;
use crate::error::ProcessError;
use crate::schema::{DividerSpec, UpdaterSpec};
use crate::updater::Updater;
use crate::value::{ProcessRef, Value};

/// Builds a process from a configuration value. Used to instantiate the
/// derivers a process declares via [`Process::derivers`](crate::Process::derivers).
pub type ProcessFactory = Arc<dyn Fn(&Value) -> Result<ProcessRef, ProcessError> + Send + Sync>;

/// Named updaters, dividers, and process factories.
#[derive(Clone)]
pub struct Registry {
    updaters: IndexMap<String, Updater>,
    dividers: IndexMap<String, Divider>,
    processes: IndexMap<String, ProcessFactory>,
}

impl Registry {
    /// A registry holding only the built-in strategies.
    pub fn with_builtins() -> Self {
        let updaters = [
            ("accumulate", Updater::Accumulate),
            ("delta", Updater::Accumulate),
            ("set", Updater::Set),
            ("merge", Updater::Merge),
            ("null", Updater::Null),
            ("nonnegative_accumulate", Updater::NonnegativeAccumulate),
        ]
        .into_iter()
        .map(|(k, u)| (k.to_string(), u))
        .collect();
        let dividers = [
            ("set", Divider::Set),
            ("split", Divider::Split),
            ("zero", Divider::Zero),
            ("no_divide", Divider::NoDivide),
        ]
        .into_iter()
        .map(|(k, d)| (k.to_string(), d))
        .collect();
        Self {
            updaters,
            dividers,
            processes: IndexMap::new(),
        }
    }

    /// Register (or replace) a named updater.
    pub fn register_updater(&mut self, name: impl Into<String>, updater: Updater) {
        self.updaters.insert(name.into(), updater);
    }

    /// Register (or replace) a named divider.
    pub fn register_divider(&mut self, name: impl Into<String>, divider: Divider) {
        self.dividers.insert(name.into(), divider);
    }

    /// Register (or replace) a process factory.
    pub fn register_process<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<ProcessRef, ProcessError> + Send + Sync + 'static,
    {
        self.processes.insert(key.into(), Arc::new(factory));
    }

    /// Look up an updater by name.
    pub fn updater(&self, name: &str) -> Option<&Updater> {
        self.updaters.get(name)
    }

    /// Look up a divider by name.
    pub fn divider(&self, name: &str) -> Option<&Divider> {
        self.dividers.get(name)
    }

    /// Look up a process factory by key.
    pub fn process_factory(&self, key: &str) -> Option<&ProcessFactory> {
        self.processes.get(key)
    }

    /// Resolve an updater spec. On failure returns the unknown name.
    pub fn resolve_updater(&self, spec: &UpdaterSpec) -> Result<Updater, String> {
        match spec {
            UpdaterSpec::Resolved(u) => Ok(u.clone()),
            UpdaterSpec::Named(name) => self.updater(name).cloned().ok_or_else(|| name.clone()),
        }
    }

    /// Resolve a divider spec. On failure returns the unknown name.
    pub fn resolve_divider(&self, spec: &DividerSpec) -> Result<Divider, String> {
        match spec {
            DividerSpec::Resolved(d) => Ok(d.clone()),
            DividerSpec::Named(name) => self.divider(name).cloned().ok_or_else(|| name.clone()),
            DividerSpec::WithTopology { divider, topology } => Ok(Divider::WithTopology {
                divider: Box::new(self.resolve_divider(divider)?),
                topology: topology.clone(),
            }),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("updaters", &self.updaters.keys().collect::<Vec<_>>())
            .field("dividers", &self.dividers.keys().collect::<Vec<_>>())
            .field("processes", &self.processes.keys().collect::<Vec<_>>())
            .finish()
    }
}
