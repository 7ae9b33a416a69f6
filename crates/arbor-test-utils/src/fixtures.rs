//! Reusable process fixtures.
//!
//! - [`Growth`]: linear growth of `mass` (accumulate, emitted).
//! - [`DeathThreshold`]: deletes every process in its compartment once
//!   `mass` exceeds a threshold.
//! - [`SlowGrowth`] / [`FastMotion`]: a slow and a fast process sharing
//!   one `state` branch, for multi-rate scheduling.
//! - [`CopyDeriver`]: a deriver mirroring one leaf into another.
//! - [`DivideAtThreshold`]: a deriver dividing its agent once `mass`
//!   reaches a threshold.
//! - [`FailingProcess`]: fails deterministically after N calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use arbor_core::{
    BranchUpdate, Composite, DaughterSpec, DivideSpec, LeafSchema, Path, PortsSchema, Process,
    ProcessError, ProcessRef, ProcessUpdate, Schema, States, Update, Value,
};

fn number(states: &States, port: &str, key: &str) -> Result<f64, ProcessError> {
    states
        .get(port)
        .and_then(|s| s.get(key))
        .and_then(Value::as_f64)
        .ok_or_else(|| ProcessError::MissingState {
            port: format!("{port}/{key}"),
        })
}

fn single_port(port: &str, update: impl Into<Update>) -> ProcessUpdate {
    ProcessUpdate::from([(port.to_string(), update.into())])
}

fn mass_schema() -> LeafSchema {
    LeafSchema::new()
        .with_default(0.0)
        .with_divider("split")
        .with_units("fg")
        .with_emit(true)
}

/// Adds `rate * interval` to `state/mass`.
pub struct Growth {
    pub rate: f64,
}

impl Growth {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl Process for Growth {
    fn name(&self) -> &str {
        "growth"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "state".to_string(),
            Schema::branch().with_leaf("mass", mass_schema()),
        )])
    }

    fn next_update(&self, interval: f64, _: &States) -> Result<ProcessUpdate, ProcessError> {
        Ok(single_port(
            "state",
            BranchUpdate::new().with_write("mass", self.rate * interval),
        ))
    }
}

/// Once `state/mass` exceeds `threshold`, deletes every entry of the
/// branch wired to its `processes` port.
pub struct DeathThreshold {
    pub threshold: f64,
}

impl DeathThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Process for DeathThreshold {
    fn name(&self) -> &str {
        "death"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "state".to_string(),
                Schema::branch().with_leaf("mass", mass_schema()),
            ),
            ("processes".to_string(), Schema::branch()),
        ])
    }

    fn next_update(&self, _: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let mass = number(states, "state", "mass")?;
        if mass <= self.threshold {
            return Ok(ProcessUpdate::new());
        }
        let doomed = states
            .get("processes")
            .and_then(Value::as_map)
            .map(|m| m.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        let update = doomed
            .into_iter()
            .fold(BranchUpdate::new(), |u, name| u.with_delete(Path::from([name.as_str()])));
        Ok(single_port("processes", update))
    }
}

/// `local_timestep = 3.0`; adds `interval * base * 0.1` to `state/base`.
pub struct SlowGrowth;

impl Process for SlowGrowth {
    fn name(&self) -> &str {
        "slow"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "state".to_string(),
            Schema::branch().with_leaf("base", LeafSchema::new().with_default(1.0).with_emit(true)),
        )])
    }

    fn next_update(&self, interval: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let base = number(states, "state", "base")?;
        Ok(single_port(
            "state",
            BranchUpdate::new().with_write("base", interval * base * 0.1),
        ))
    }

    fn local_timestep(&self) -> f64 {
        3.0
    }
}

/// `local_timestep = 0.1`; reads `state/base`, adds `interval * base`
/// to `state/motion`.
pub struct FastMotion;

impl Process for FastMotion {
    fn name(&self) -> &str {
        "fast"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "state".to_string(),
            Schema::branch()
                .with_leaf("base", LeafSchema::new().with_default(1.0))
                .with_leaf("motion", LeafSchema::new().with_default(0.0).with_emit(true)),
        )])
    }

    fn next_update(&self, interval: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let base = number(states, "state", "base")?;
        Ok(single_port(
            "state",
            BranchUpdate::new().with_write("motion", interval * base),
        ))
    }

    fn local_timestep(&self) -> f64 {
        0.1
    }
}

/// Deriver copying `state/<from>` into `state/<to>` (updater `set`).
pub struct CopyDeriver {
    pub from: String,
    pub to: String,
}

impl CopyDeriver {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Process for CopyDeriver {
    fn name(&self) -> &str {
        "copy"
    }

    fn ports_schema(&self) -> PortsSchema {
        let target = LeafSchema::new()
            .with_default(0.0)
            .with_updater("set")
            .with_emit(true);
        PortsSchema::from([(
            "state".to_string(),
            Schema::branch()
                .with_leaf(self.from.as_str(), LeafSchema::new())
                .with_leaf(self.to.as_str(), target),
        )])
    }

    fn next_update(&self, _: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let value = states
            .get("state")
            .and_then(|s| s.get(&self.from))
            .cloned()
            .unwrap_or_default();
        Ok(single_port(
            "state",
            BranchUpdate::new().with_child(self.to.as_str(), Update::Write(value)),
        ))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}

/// Deriver that divides agent `agent_id` (under the branch wired to its
/// `agents` port) once its `mass` reaches `threshold`. Daughters are
/// named `<agent_id>0` and `<agent_id>1` and carry the same processes.
pub struct DivideAtThreshold {
    pub agent_id: String,
    pub rate: f64,
    pub threshold: f64,
}

impl Process for DivideAtThreshold {
    fn name(&self) -> &str {
        "divide"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([
            (
                "state".to_string(),
                Schema::branch().with_leaf("mass", mass_schema()),
            ),
            ("agents".to_string(), Schema::branch()),
        ])
    }

    fn next_update(&self, _: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let mass = number(states, "state", "mass")?;
        if mass < self.threshold {
            return Ok(ProcessUpdate::new());
        }
        let daughters = (0..2)
            .map(|i| {
                let id = format!("{}{i}", self.agent_id);
                let composite = agent_composite(&id, self.rate, self.threshold);
                DaughterSpec::new(Path::from([id.as_str()]), composite)
            })
            .collect();
        let divide = DivideSpec {
            mother: Path::from([self.agent_id.as_str()]),
            daughters,
        };
        Ok(single_port("agents", BranchUpdate::new().with_divide(divide)))
    }

    fn is_deriver(&self) -> bool {
        true
    }
}

/// Fails deterministically after `succeed_count` successful calls. On
/// success adds 1.0 to `state/mass`.
pub struct FailingProcess {
    pub succeed_count: usize,
    call_count: AtomicUsize,
}

impl FailingProcess {
    pub fn new(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `next_update()` has been called.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Process for FailingProcess {
    fn name(&self) -> &str {
        "failing"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([(
            "state".to_string(),
            Schema::branch().with_leaf("mass", mass_schema()),
        )])
    }

    fn next_update(&self, _: f64, _: &States) -> Result<ProcessUpdate, ProcessError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(ProcessError::ExecutionFailed {
                reason: format!(
                    "deliberate failure after {} successful calls",
                    self.succeed_count
                ),
            });
        }
        Ok(single_port("state", BranchUpdate::new().with_write("mass", 1.0)))
    }
}

// ── Composites ─────────────────────────────────────────────────────

/// [`SlowGrowth`] and [`FastMotion`] sharing `state`, with
/// `base = 1.0, motion = 0.0`.
pub fn slow_fast_composite() -> Composite {
    Composite::new()
        .with_process("slow", ProcessRef::new(SlowGrowth), [("state", "state")])
        .with_process("fast", ProcessRef::new(FastMotion), [("state", "state")])
        .with_initial_state(
            [(
                "state",
                [("base", 1.0), ("motion", 0.0)]
                    .into_iter()
                    .collect::<Value>(),
            )]
            .into_iter()
            .collect::<Value>(),
        )
}

/// [`Growth`] and [`DeathThreshold`] under `processes/`, both reading
/// `state/mass` (starting at 0.0).
pub fn growth_death_composite(rate: f64, threshold: f64) -> Composite {
    Composite::new()
        .with_process(
            "processes/growth",
            ProcessRef::new(Growth::new(rate)),
            [("state", "../state")],
        )
        .with_process(
            "processes/death",
            ProcessRef::new(DeathThreshold::new(threshold)),
            [("state", "../state"), ("processes", "")],
        )
}

/// One dividing agent, relative to its own node under an `agents`
/// branch: [`Growth`] on the agent's `mass` plus a [`DivideAtThreshold`]
/// deriver.
pub fn agent_composite(agent_id: &str, rate: f64, threshold: f64) -> Composite {
    let divider = DivideAtThreshold {
        agent_id: agent_id.to_string(),
        rate,
        threshold,
    };
    Composite::new()
        .with_process("growth", ProcessRef::new(Growth::new(rate)), [("state", "")])
        .with_process(
            "divide",
            ProcessRef::new(divider),
            [("state", ""), ("agents", "..")],
        )
}
