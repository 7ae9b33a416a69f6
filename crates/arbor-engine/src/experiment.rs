//! The multi-rate experiment scheduler.
//!
//! [`Experiment`] owns one [`Store`] and one front per regular process.
//! [`update()`](Experiment::update) advances to a horizon in iterations:
//!
//! 1. every due front calls `next_update` with
//!    `min(local_timestep, horizon - front_time)` and parks the result;
//! 2. the clock jumps to the earliest front time (capped at the horizon);
//! 3. every front that has completed is merged as one batch, in
//!    pre-order of process discovery;
//! 4. derivers re-run against the merged state;
//! 5. a history record is emitted.
//!
//! # Clock exactness
//!
//! Front times within `time_epsilon` (relative to the horizon) snap onto
//! the horizon, and the clock only ever takes a front's time or the
//! horizon itself, so after `update(T)` the clock is exactly the old
//! time plus `T`.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info, trace};

use arbor_core::{
    Composite, Path, ProcessError, ProcessRef, ProcessUpdate, States, StoreError, Topology,
    TopologyDelta, Value,
};
use arbor_store::{generate, Store};

use crate::config::{ConfigError, ExperimentConfig};
use crate::emitter::{Emission, Emitter, Table};
use crate::metrics::UpdateMetrics;

// ── ExperimentError ────────────────────────────────────────────────

/// Errors from constructing or advancing an [`Experiment`].
#[derive(Clone, Debug, PartialEq)]
pub enum ExperimentError {
    /// Configuration or initial wiring failed.
    Config(ConfigError),
    /// A process's `next_update` returned an error.
    ProcessFailed {
        /// Absolute path of the process.
        path: Path,
        /// The process's name.
        process: String,
        /// The process's error.
        source: ProcessError,
    },
    /// Applying an update to the store failed.
    Store(StoreError),
    /// `update()` was called with a NaN, infinite, or negative timestep.
    InvalidTimestep {
        /// The invalid value.
        value: f64,
    },
    /// A process returned an update for a port it is not wired to.
    UnknownPort {
        /// Absolute path of the process.
        process: Path,
        /// The unknown port.
        port: String,
    },
    /// The scheduler loop finished in an inconsistent state.
    SchedulerInvariant {
        /// What was inconsistent.
        reason: String,
    },
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::ProcessFailed {
                path,
                process,
                source,
            } => write!(f, "process '{process}' at {path} failed: {source}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::InvalidTimestep { value } => {
                write!(f, "timestep must be finite and non-negative, got {value}")
            }
            Self::UnknownPort { process, port } => {
                write!(f, "process {process} updated unwired port '{port}'")
            }
            Self::SchedulerInvariant { reason } => {
                write!(f, "scheduler invariant violated: {reason}")
            }
        }
    }
}

impl Error for ExperimentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::ProcessFailed { source, .. } => Some(source),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ExperimentError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for ExperimentError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ── Front ──────────────────────────────────────────────────────────

/// Scheduler bookkeeping for one regular process.
#[derive(Clone, Debug, Default)]
pub struct Front {
    /// Simulation time the process has been advanced to.
    pub time: f64,
    /// Update computed up to `time`, not yet merged.
    pub update: Option<ProcessUpdate>,
}

impl Front {
    /// Whether an update is waiting to be merged.
    pub fn is_pending(&self) -> bool {
        self.update.is_some()
    }
}

// ── Experiment ─────────────────────────────────────────────────────

/// A store plus the scheduler driving every process wired into it.
///
/// # Example
///
/// ```ignore
/// let log = RamEmitter::new();
/// let mut config = ExperimentConfig::new(composite);
/// config.emitter = Box::new(log.clone());
/// let mut experiment = Experiment::new(config)?;
/// experiment.update(10.0)?;
/// let mass = log.timeseries(&Path::parse("cell/mass"));
/// ```
pub struct Experiment {
    store: Store,
    topology: Topology,
    fronts: IndexMap<Path, Front>,
    global_time: f64,
    time_epsilon: f64,
    emitter: Box<dyn Emitter>,
    experiment_id: String,
    last_metrics: UpdateMetrics,
}

impl Experiment {
    /// Validate `config`, wire its composite at the root, emit the
    /// configuration record, run derivers once, and emit the time-0
    /// history record.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::Config`] if validation or wiring fails (no
    /// partially wired experiment is returned), or
    /// [`ExperimentError::ProcessFailed`] if an initial deriver run fails.
    pub fn new(config: ExperimentConfig) -> Result<Self, ExperimentError> {
        config.validate()?;
        let ExperimentConfig {
            composite,
            registry,
            seed,
            time_epsilon,
            emitter,
            experiment_id,
            description,
        } = config;

        let mut store = Store::with_seed(registry, seed);
        let root = store.root();
        let delta = generate(&mut store, root, &Path::root(), &composite).map_err(ConfigError::from)?;

        let mut experiment = Self {
            store,
            topology: delta.added,
            fronts: IndexMap::new(),
            global_time: 0.0,
            time_epsilon,
            emitter,
            experiment_id,
            last_metrics: UpdateMetrics::default(),
        };
        info!(
            experiment = %experiment.experiment_id,
            processes = experiment.topology.len(),
            nodes = experiment.store.node_count(),
            seed,
            "experiment wired"
        );

        experiment.emit_configuration(&composite, description);
        let mut metrics = UpdateMetrics::default();
        experiment.run_derivers(&mut metrics)?;
        experiment.emit_history();
        Ok(experiment)
    }

    /// Advance every process to `global_time() + timestep`.
    ///
    /// # Errors
    ///
    /// [`ExperimentError::InvalidTimestep`] for a NaN, infinite, or
    /// negative timestep. Process and store errors propagate unchanged;
    /// the experiment is left at the iteration that failed.
    pub fn update(&mut self, timestep: f64) -> Result<UpdateMetrics, ExperimentError> {
        if !timestep.is_finite() || timestep < 0.0 {
            return Err(ExperimentError::InvalidTimestep { value: timestep });
        }
        let start = Instant::now();
        let end = self.global_time + timestep;
        let mut metrics = UpdateMetrics::default();

        while self.global_time < end {
            let processes: Vec<(Path, ProcessRef)> = self
                .store
                .processes()
                .into_iter()
                .filter(|(_, p)| !p.is_deriver())
                .collect();
            self.sync_fronts(&processes);

            // Step every due front.
            let step_start = Instant::now();
            for (path, process) in &processes {
                let Some(front) = self.fronts.get(path) else {
                    continue;
                };
                if front.is_pending() || front.time > self.global_time {
                    continue;
                }
                let front_time = front.time;
                let interval = process.local_timestep().min(end - front_time);
                let states = self.port_states(path);
                trace!(process = %path, interval, "next_update");
                let update = process
                    .next_update(interval, &states)
                    .map_err(|source| ExperimentError::ProcessFailed {
                        path: path.clone(),
                        process: process.name().to_string(),
                        source,
                    })?;
                for port in update.keys() {
                    self.port_target(path, port)?;
                }
                metrics.process_calls += 1;

                let reached = front_time + interval;
                let time = if reached > front_time {
                    self.snap(reached, end)
                } else {
                    end
                };
                if let Some(front) = self.fronts.get_mut(path) {
                    front.time = time;
                    front.update = Some(update);
                }
            }
            metrics.process_us += step_start.elapsed().as_micros() as u64;

            // Jump to the next-completing front.
            let next = self.fronts.values().map(|f| f.time).fold(end, f64::min);
            self.global_time = next;

            let batch: Vec<(Path, ProcessUpdate)> = self
                .fronts
                .iter_mut()
                .filter(|(_, f)| f.time <= next)
                .filter_map(|(path, f)| f.update.take().map(|u| (path.clone(), u)))
                .collect();
            metrics.batches += 1;

            if !batch.is_empty() {
                let apply_start = Instant::now();
                debug!(time = next, updates = batch.len(), "merging batch");
                let mut delta = TopologyDelta::default();
                for (path, update) in &batch {
                    delta.merge(self.apply_process_update(path, update)?);
                }
                self.absorb(delta, &mut metrics);
                self.run_derivers(&mut metrics)?;
                metrics.apply_us += apply_start.elapsed().as_micros() as u64;
            }
            self.emit_history();
        }

        if self.global_time != end {
            return Err(ExperimentError::SchedulerInvariant {
                reason: format!("clock at {} after update to {end}", self.global_time),
            });
        }
        if let Some((path, _)) = self.fronts.iter().find(|(_, f)| f.is_pending()) {
            return Err(ExperimentError::SchedulerInvariant {
                reason: format!("front of {path} still pending at {end}"),
            });
        }

        metrics.node_count = self.store.node_count();
        metrics.total_us = start.elapsed().as_micros() as u64;
        debug!(
            time = self.global_time,
            batches = metrics.batches,
            calls = metrics.process_calls,
            derivers = metrics.deriver_runs,
            "update complete"
        );
        self.last_metrics = metrics.clone();
        Ok(metrics)
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Current simulation time.
    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    /// The simulation state.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Value at an absolute path, if it exists.
    pub fn state(&self, path: &Path) -> Option<Value> {
        self.store.get_in(self.store.root(), path)
    }

    /// Absolute process path → port wiring, for every live process.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Fronts of the regular processes seen so far.
    pub fn fronts(&self) -> &IndexMap<Path, Front> {
        &self.fronts
    }

    /// Metrics from the most recent successful `update()`.
    pub fn last_metrics(&self) -> &UpdateMetrics {
        &self.last_metrics
    }

    /// Identifier from the configuration.
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Drop fronts of vanished processes and open fronts for new ones at
    /// the current time. Fronts are kept in the pre-order of `processes`,
    /// which is the order a batch is merged in.
    fn sync_fronts(&mut self, processes: &[(Path, ProcessRef)]) {
        let now = self.global_time;
        let mut previous = std::mem::take(&mut self.fronts);
        self.fronts = processes
            .iter()
            .map(|(path, _)| {
                let front = previous.swap_remove(path).unwrap_or(Front {
                    time: now,
                    update: None,
                });
                (path.clone(), front)
            })
            .collect();
    }

    fn snap(&self, t: f64, end: f64) -> f64 {
        let tolerance = self.time_epsilon * end.abs().max(1.0);
        if t >= end - tolerance {
            end
        } else {
            t
        }
    }

    fn port_states(&self, process: &Path) -> States {
        let Some(ports) = self.topology.get(process) else {
            return States::new();
        };
        let frame = process.parent().unwrap_or_default();
        match self.store.resolve(&frame) {
            Some(id) => self.store.port_states(id, ports),
            None => States::new(),
        }
    }

    /// Absolute store path a process's port is wired to.
    fn port_target(&self, process: &Path, port: &str) -> Result<Path, ExperimentError> {
        let target = self
            .topology
            .get(process)
            .and_then(|ports| ports.get(port))
            .ok_or_else(|| ExperimentError::UnknownPort {
                process: process.clone(),
                port: port.to_string(),
            })?;
        Ok(process.parent().unwrap_or_default().join(target))
    }

    fn apply_process_update(
        &mut self,
        process: &Path,
        update: &ProcessUpdate,
    ) -> Result<TopologyDelta, ExperimentError> {
        let mut delta = TopologyDelta::default();
        for (port, port_update) in update {
            if port_update.is_empty() {
                continue;
            }
            let target = self.port_target(process, port)?;
            delta.merge(self.store.apply_update_at(&target, port_update)?);
        }
        Ok(delta)
    }

    /// Fold a structural report into the topology and drop fronts of
    /// removed processes.
    fn absorb(&mut self, delta: TopologyDelta, metrics: &mut UpdateMetrics) {
        if delta.is_empty() {
            return;
        }
        metrics.structural_events += (delta.added.len() + delta.removed.len()) as u32;
        debug!(
            added = delta.added.len(),
            removed = delta.removed.len(),
            "topology updated"
        );
        for removed in &delta.removed {
            self.topology.retain(|path, _| !path.starts_with(removed));
            self.fronts.retain(|path, _| !path.starts_with(removed));
        }
        self.topology.extend(delta.added);
    }

    /// Run every deriver once with `interval = 0`, merging each update
    /// before the next deriver runs.
    fn run_derivers(&mut self, metrics: &mut UpdateMetrics) -> Result<(), ExperimentError> {
        let derivers: Vec<(Path, ProcessRef)> = self
            .store
            .processes()
            .into_iter()
            .filter(|(_, p)| p.is_deriver())
            .collect();
        for (path, process) in derivers {
            if !self.is_live(&path, &process) {
                continue;
            }
            let states = self.port_states(&path);
            trace!(deriver = %path, "next_update");
            let update = process
                .next_update(0.0, &states)
                .map_err(|source| ExperimentError::ProcessFailed {
                    path: path.clone(),
                    process: process.name().to_string(),
                    source,
                })?;
            metrics.deriver_runs += 1;
            let delta = self.apply_process_update(&path, &update)?;
            self.absorb(delta, metrics);
        }
        Ok(())
    }

    /// Whether `process` is still stored at `path`.
    fn is_live(&self, path: &Path, process: &ProcessRef) -> bool {
        self.store
            .resolve(path)
            .and_then(|id| self.store.node(id))
            .and_then(|n| n.leaf())
            .and_then(|leaf| leaf.value())
            .and_then(Value::as_process)
            .is_some_and(|stored| stored == process)
    }

    fn emit_configuration(&mut self, composite: &Composite, description: String) {
        let processes: Value = self
            .store
            .processes()
            .into_iter()
            .map(|(path, p)| (path.to_string(), Value::from(p.name())))
            .collect();
        let topology: Value = self
            .topology
            .iter()
            .map(|(path, ports)| {
                let ports: Value = ports
                    .iter()
                    .map(|(port, target)| (port.clone(), Value::from(target.to_string())))
                    .collect();
                (path.to_string(), ports)
            })
            .collect();
        let data: Value = [
            ("experiment_id", Value::from(self.experiment_id.clone())),
            ("description", Value::from(description)),
            ("processes", processes),
            ("topology", topology),
            ("initial_state", composite.initial_state.clone()),
        ]
        .into_iter()
        .collect();
        self.emitter.emit(Emission {
            table: Table::Configuration,
            time: self.global_time,
            data,
        });
    }

    fn emit_history(&mut self) {
        let data = self.store.emit_view();
        self.emitter.emit(Emission {
            table: Table::History,
            time: self.global_time,
            data,
        });
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("experiment_id", &self.experiment_id)
            .field("global_time", &self.global_time)
            .field("processes", &self.topology.len())
            .field("fronts", &self.fronts.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use arbor_test_utils::{slow_fast_composite, Growth};

    use super::*;

    fn growth_experiment() -> Experiment {
        let composite = Composite::new().with_process(
            "growth",
            ProcessRef::new(Growth::new(2.0)),
            [("state", "cell")],
        );
        Experiment::new(ExperimentConfig::new(composite)).unwrap()
    }

    #[test]
    fn rejects_bad_timesteps() {
        let mut exp = growth_experiment();
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            match exp.update(bad) {
                Err(ExperimentError::InvalidTimestep { .. }) => {}
                other => panic!("expected InvalidTimestep, got {other:?}"),
            }
        }
        assert_eq!(exp.global_time(), 0.0);
    }

    #[test]
    fn zero_timestep_is_a_no_op() {
        let mut exp = growth_experiment();
        let metrics = exp.update(0.0).unwrap();
        assert_eq!(metrics.batches, 0);
        assert_eq!(exp.state(&Path::parse("cell/mass")), Some(Value::Float(0.0)));
    }

    #[test]
    fn partial_step_near_horizon() {
        let mut exp = growth_experiment();
        exp.update(0.25).unwrap();
        assert_eq!(exp.global_time(), 0.25);
        assert_eq!(exp.state(&Path::parse("cell/mass")), Some(Value::Float(0.5)));
    }

    #[test]
    fn metrics_count_calls_and_batches() {
        let mut exp = growth_experiment();
        let metrics = exp.update(3.0).unwrap();
        assert_eq!(metrics.batches, 3);
        assert_eq!(metrics.process_calls, 3);
        assert_eq!(metrics.deriver_runs, 0);
        assert_eq!(exp.last_metrics(), &metrics);
        assert_eq!(metrics.node_count, exp.store().node_count());
    }

    #[test]
    fn fronts_open_for_regular_processes_only() {
        let mut exp = Experiment::new(ExperimentConfig::new(slow_fast_composite())).unwrap();
        exp.update(0.5).unwrap();
        let paths: Vec<String> = exp.fronts().keys().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["slow", "fast"]);
        assert!(exp.fronts().values().all(|f| f.time == 0.5 && !f.is_pending()));
    }

    #[test]
    fn error_source_chains() {
        let err = ExperimentError::ProcessFailed {
            path: Path::parse("cell/growth"),
            process: "growth".into(),
            source: ProcessError::ExecutionFailed {
                reason: "boom".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("cell/growth"));
    }
}
