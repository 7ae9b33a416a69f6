//! Integration test: multi-rate scheduling end to end.
//!
//! Drives full experiments built from the shared fixtures and checks the
//! externally visible contract: the clock lands exactly on the horizon,
//! emitted history matches hand-computed series, derivers see merged
//! state, structural updates rewire the topology, and process failures
//! surface with their path.

use std::sync::Arc;

use arbor_core::{
    BranchUpdate, Composite, GenerateSpec, LeafSchema, Path, PortsSchema, Process, ProcessError,
    ProcessRef, ProcessUpdate, Schema, States, StoreError, Update, Value, WiringError,
};
use arbor_engine::{ConfigError, Experiment, ExperimentConfig, ExperimentError, RamEmitter, Table};
use arbor_test_utils::{
    agent_composite, growth_death_composite, slow_fast_composite, CopyDeriver, FailingProcess,
    Growth,
};
use proptest::prelude::*;

fn with_log(composite: Composite) -> (ExperimentConfig, RamEmitter) {
    let log = RamEmitter::new();
    let mut config = ExperimentConfig::new(composite);
    config.emitter = Box::new(log.clone());
    (config, log)
}

fn floats(series: Vec<(f64, Value)>) -> Vec<f64> {
    series
        .into_iter()
        .map(|(_, v)| v.as_f64().unwrap_or(f64::NAN))
        .collect()
}

// ── Inline processes ─────────────────────────────────────────────────

/// Writes to a port it never declared.
struct Rogue;

impl Process for Rogue {
    fn name(&self) -> &str {
        "rogue"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::from([("state".to_string(), Schema::branch())])
    }

    fn next_update(&self, _: f64, _: &States) -> Result<ProcessUpdate, ProcessError> {
        Ok(ProcessUpdate::from([(
            "elsewhere".to_string(),
            Update::write(1.0),
        )]))
    }
}

/// Reports a zero local timestep.
struct Stuck;

impl Process for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    fn ports_schema(&self) -> PortsSchema {
        PortsSchema::new()
    }

    fn next_update(&self, _: f64, _: &States) -> Result<ProcessUpdate, ProcessError> {
        Ok(ProcessUpdate::new())
    }

    fn local_timestep(&self) -> f64 {
        0.0
    }
}

/// Overwrites `x` in the `out` port with a constant each step.
struct Writer {
    value: f64,
}

impl Process for Writer {
    fn name(&self) -> &str {
        "writer"
    }

    fn ports_schema(&self) -> PortsSchema {
        let x = LeafSchema::new().with_default(0.0).with_updater("set");
        PortsSchema::from([("out".to_string(), Schema::branch().with_leaf("x", x))])
    }

    fn next_update(&self, _: f64, _: &States) -> Result<ProcessUpdate, ProcessError> {
        Ok(ProcessUpdate::from([(
            "out".to_string(),
            BranchUpdate::new().with_write("x", self.value).into(),
        )]))
    }
}

/// Generates a `Writer` named `a` beside itself on its first step.
struct Spawner;

impl Process for Spawner {
    fn name(&self) -> &str {
        "spawner"
    }

    fn ports_schema(&self) -> PortsSchema {
        let flag = LeafSchema::new().with_default(false).with_updater("set");
        PortsSchema::from([("home".to_string(), Schema::branch().with_leaf("spawned", flag))])
    }

    fn next_update(&self, _: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
        let spawned = states
            .get("home")
            .and_then(|home| home["spawned"].as_bool())
            .unwrap_or(false);
        if spawned {
            return Ok(ProcessUpdate::new());
        }
        let writer = Composite::new().with_process(
            "a",
            ProcessRef::new(Writer { value: 1.0 }),
            [("out", "../cell")],
        );
        Ok(ProcessUpdate::from([(
            "home".to_string(),
            BranchUpdate::new()
                .with_write("spawned", true)
                .with_generate(GenerateSpec::new(Path::root(), writer))
                .into(),
        )]))
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn slow_and_fast_processes_reach_the_horizon_exactly() {
    let mut exp = Experiment::new(ExperimentConfig::new(slow_fast_composite())).unwrap();
    exp.update(10.0).unwrap();

    assert_eq!(exp.global_time(), 10.0);
    assert_eq!(exp.fronts().len(), 2);
    for (path, front) in exp.fronts() {
        assert_eq!(front.time, 10.0, "front of {path}");
        assert!(!front.is_pending(), "front of {path} still pending");
    }

    // Slow ran at 0, 3, 6, 9 (the last with a 1.0 interval), each time
    // reading `base` as it stood at the start of its interval.
    let mut base = 1.0_f64;
    for interval in [3.0, 3.0, 3.0, 1.0] {
        base += interval * base * 0.1;
    }
    let got = exp
        .state(&Path::parse("state/base"))
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!((got - base).abs() < 1e-12, "base = {got}, expected {base}");
    let motion = exp
        .state(&Path::parse("state/motion"))
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!(motion > 10.0, "motion = {motion}");
}

#[test]
fn growth_halts_after_death_clears_the_compartment() {
    let (config, log) = with_log(growth_death_composite(1.0, 5.0));
    let mut exp = Experiment::new(config).unwrap();
    for _ in 0..10 {
        exp.update(1.0).unwrap();
    }

    let mass = floats(log.timeseries(&Path::parse("state/mass")));
    assert_eq!(
        mass,
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 7.0, 7.0, 7.0]
    );
    let times: Vec<f64> = log.history().iter().map(|e| e.time).collect();
    assert_eq!(times, (0..=10).map(f64::from).collect::<Vec<_>>());

    assert!(exp.store().processes().is_empty());
    assert!(exp.topology().is_empty());
    assert!(exp.fronts().is_empty());
    assert_eq!(exp.global_time(), 10.0);
}

#[test]
fn derivers_observe_the_merged_update() {
    let composite = Composite::new()
        .with_process(
            "growth",
            ProcessRef::new(Growth::new(1.5)),
            [("state", "cell")],
        )
        .with_process(
            "mirror",
            ProcessRef::new(CopyDeriver::new("mass", "copy")),
            [("state", "cell")],
        );
    let (config, log) = with_log(composite);
    let mut exp = Experiment::new(config).unwrap();
    for _ in 0..4 {
        exp.update(1.0).unwrap();
    }

    let mass = floats(log.timeseries(&Path::parse("cell/mass")));
    let copy = floats(log.timeseries(&Path::parse("cell/copy")));
    assert_eq!(mass, vec![0.0, 1.5, 3.0, 4.5, 6.0]);
    assert_eq!(copy, mass);
    assert_eq!(exp.last_metrics().deriver_runs, 1);
    assert_eq!(exp.fronts().len(), 1);
}

#[test]
fn dividing_agents_double_and_conserve_mass() {
    let mut composite = Composite::new();
    composite.merge_at(
        &Path::parse("agents/1"),
        agent_composite("1", 1.0, 4.0)
            .with_initial_state([("mass", 1.0)].into_iter().collect::<Value>()),
    );
    let mut config = ExperimentConfig::new(composite);
    config.seed = 7;
    let mut exp = Experiment::new(config).unwrap();

    let metrics = exp.update(5.0).unwrap();
    let agents = exp.state(&Path::parse("agents")).unwrap();
    let names: Vec<&str> = agents
        .as_map()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(names, vec!["100", "101", "110", "111"]);
    for name in names {
        assert_eq!(agents[name]["mass"], Value::Float(2.0), "agent {name}");
    }

    let processes: Vec<String> = exp.topology().keys().map(|p| p.to_string()).collect();
    assert_eq!(processes.len(), 8);
    assert!(processes.iter().all(|p| !p.starts_with("agents/1/")));
    assert!(exp.topology().contains_key(&Path::parse("agents/111/growth")));
    // Daughters born at the horizon get their fronts on the next update.
    assert!(exp.fronts().is_empty());
    exp.update(0.5).unwrap();
    assert_eq!(exp.fronts().len(), 4);
    // Three divisions: each adds two daughters' processes and removes a mother.
    assert_eq!(metrics.structural_events, 3 * 5);
}

#[test]
fn failing_process_surfaces_with_its_path() {
    let failing = Arc::new(FailingProcess::new(2));
    let composite = Composite::new().with_process(
        "cell/failing",
        ProcessRef::from_arc(failing.clone()),
        [("state", "")],
    );
    let mut exp = Experiment::new(ExperimentConfig::new(composite)).unwrap();
    exp.update(1.0).unwrap();
    exp.update(1.0).unwrap();
    match exp.update(1.0) {
        Err(ExperimentError::ProcessFailed {
            path,
            process,
            source: ProcessError::ExecutionFailed { .. },
        }) => {
            assert_eq!(path, Path::parse("cell/failing"));
            assert_eq!(process, "failing");
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
    assert_eq!(failing.calls(), 3);
    assert_eq!(exp.state(&Path::parse("cell/mass")), Some(Value::Float(2.0)));
}

#[test]
fn update_for_an_unwired_port_is_rejected() {
    let composite =
        Composite::new().with_process("rogue", ProcessRef::new(Rogue), [("state", "cell")]);
    let mut exp = Experiment::new(ExperimentConfig::new(composite)).unwrap();
    match exp.update(1.0) {
        Err(ExperimentError::UnknownPort { process, port }) => {
            assert_eq!(process, Path::parse("rogue"));
            assert_eq!(port, "elsewhere");
        }
        other => panic!("expected UnknownPort, got {other:?}"),
    }
}

#[test]
fn zero_local_timestep_aborts_construction() {
    let composite =
        Composite::new().with_process("stuck", ProcessRef::new(Stuck), Vec::<(&str, &str)>::new());
    match Experiment::new(ExperimentConfig::new(composite)) {
        Err(ExperimentError::Config(ConfigError::Store(StoreError::Wiring(
            WiringError::InvalidTimestep { process, value },
        )))) => {
            assert_eq!(process, Path::parse("stuck"));
            assert_eq!(value, 0.0);
        }
        other => panic!("expected InvalidTimestep, got {other:?}"),
    }
}

#[test]
fn configuration_record_precedes_history() {
    let (config, log) = with_log(slow_fast_composite());
    let mut exp = Experiment::new(config).unwrap();
    exp.update(0.3).unwrap();

    let records = log.records();
    assert_eq!(records[0].table, Table::Configuration);
    assert!(records[1..].iter().all(|e| e.table == Table::History));
    let configuration = log.configuration().unwrap();
    assert_eq!(configuration.data["processes"]["slow"], Value::from("slow"));
    assert_eq!(configuration.data["topology"]["fast"]["state"], Value::from("state"));
    assert_eq!(configuration.data["experiment_id"], Value::from("experiment"));
    assert_eq!(log.history().first().map(|e| e.time), Some(0.0));
    assert_eq!(log.history().last().map(|e| e.time), Some(exp.global_time()));
}

#[test]
fn empty_experiment_still_advances_the_clock() {
    let (config, log) = with_log(Composite::new());
    let mut exp = Experiment::new(config).unwrap();
    exp.update(2.5).unwrap();
    assert_eq!(exp.global_time(), 2.5);
    assert_eq!(log.history().len(), 2);
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn horizon_is_exact_after_every_update(steps in prop::collection::vec(0.0f64..4.0, 1..6)) {
        let mut exp = Experiment::new(ExperimentConfig::new(slow_fast_composite())).unwrap();
        for step in steps {
            let expected = exp.global_time() + step;
            exp.update(step).unwrap();
            prop_assert_eq!(exp.global_time(), expected);
            prop_assert!(exp.fronts().values().all(|f| !f.is_pending()));
        }
    }
}

#[test]
fn same_time_writes_merge_in_pre_order() {
    for (first, second, expected) in [("a", "b", 2.0), ("b", "a", 1.0)] {
        let value = |name: &str| if name == "a" { 1.0 } else { 2.0 };
        let composite = Composite::new()
            .with_process(first, ProcessRef::new(Writer { value: value(first) }), [("out", "cell")])
            .with_process(second, ProcessRef::new(Writer { value: value(second) }), [("out", "cell")]);
        let mut exp = Experiment::new(ExperimentConfig::new(composite)).unwrap();
        exp.update(1.0).unwrap();
        assert_eq!(
            exp.state(&Path::parse("cell/x")),
            Some(Value::Float(expected)),
            "{first} then {second}"
        );
    }
}

#[test]
fn generated_writer_takes_its_pre_order_place() {
    let composite = Composite::new()
        .with_process("p/spawner", ProcessRef::new(Spawner), [("home", "")])
        .with_process("q/b", ProcessRef::new(Writer { value: 2.0 }), [("out", "../cell")]);
    let mut exp = Experiment::new(ExperimentConfig::new(composite)).unwrap();

    exp.update(1.0).unwrap();
    assert!(exp.store().resolve(&Path::parse("p/a")).is_some());
    assert_eq!(exp.state(&Path::parse("cell/x")), Some(Value::Float(2.0)));

    // p/a now precedes q/b, so q/b's write lands last.
    exp.update(1.0).unwrap();
    let order: Vec<String> = exp.fronts().keys().map(|p| p.to_string()).collect();
    assert_eq!(order, vec!["p/spawner", "p/a", "q/b"]);
    assert_eq!(exp.state(&Path::parse("cell/x")), Some(Value::Float(2.0)));
    assert_eq!(
        exp.state(&Path::parse("p/spawned")),
        Some(Value::Bool(true))
    );
}
