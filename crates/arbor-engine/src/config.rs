//! Experiment configuration, validation, and error types.
//!
//! [`ExperimentConfig`] is the builder-input for an
//! [`Experiment`](crate::Experiment). [`validate()`](ExperimentConfig::validate)
//! checks everything that can be checked without touching a store, so a
//! bad composite never produces a partially wired tree.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use arbor_core::{Composite, Path, Registry, StoreError, Value};
use arbor_store::{expand_derivers, validate_composite};

use crate::emitter::{Emitter, NullEmitter};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`ExperimentConfig::validate()`] or initial
/// wiring.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Wiring or schema configuration failed.
    Store(StoreError),
    /// `time_epsilon` is NaN, infinite, negative, or not below 1.
    InvalidTimeEpsilon {
        /// The invalid value.
        value: f64,
    },
    /// `initial_state` is neither empty nor a map.
    InvalidInitialState {
        /// Type of the value supplied.
        found: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::InvalidTimeEpsilon { value } => {
                write!(f, "time_epsilon must be finite and in [0, 1), got {value}")
            }
            Self::InvalidInitialState { found } => {
                write!(f, "initial_state must be a map, got {found}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ConfigError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ── ExperimentConfig ───────────────────────────────────────────────

/// Complete configuration for constructing an experiment.
pub struct ExperimentConfig {
    /// Processes, topology, and initial state wired at the root.
    pub composite: Composite,
    /// Updater, divider, and deriver lookup table.
    pub registry: Arc<Registry>,
    /// Seed for the store's division RNG.
    pub seed: u64,
    /// Relative tolerance for snapping front times onto the horizon.
    /// Default: 1e-9.
    pub time_epsilon: f64,
    /// Record sink. Default: [`NullEmitter`].
    pub emitter: Box<dyn Emitter>,
    /// Identifier written to the configuration record.
    pub experiment_id: String,
    /// Free-form description written to the configuration record.
    pub description: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            composite: Composite::new(),
            registry: Arc::new(Registry::default()),
            seed: 0,
            time_epsilon: 1e-9,
            emitter: Box::new(NullEmitter),
            experiment_id: "experiment".to_string(),
            description: String::new(),
        }
    }
}

impl ExperimentConfig {
    /// A default config wiring `composite`.
    pub fn new(composite: Composite) -> Self {
        Self {
            composite,
            ..Self::default()
        }
    }

    /// Validate all structural invariants.
    ///
    /// Expands derivers and checks the composite against the registry
    /// exactly as wiring will, without building a store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Tolerance.
        let eps = self.time_epsilon;
        if !eps.is_finite() || !(0.0..1.0).contains(&eps) {
            return Err(ConfigError::InvalidTimeEpsilon { value: eps });
        }
        // 2. Initial state shape.
        match &self.composite.initial_state {
            Value::Null | Value::Map(_) => {}
            other => {
                return Err(ConfigError::InvalidInitialState {
                    found: other.type_name(),
                })
            }
        }
        // 3. Composite wiring.
        let expanded = expand_derivers(&self.registry, &self.composite).map_err(StoreError::from)?;
        validate_composite(&self.registry, &Path::root(), &expanded)?;
        Ok(())
    }
}

impl fmt::Debug for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentConfig")
            .field("processes", &self.composite.processes.len())
            .field("registry", &self.registry)
            .field("seed", &self.seed)
            .field("time_epsilon", &self.time_epsilon)
            .field("experiment_id", &self.experiment_id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
