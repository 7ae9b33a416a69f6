//! The [`Process`] trait and the types it exchanges with the kernel.
//!
//! Processes are stateless, immutable value-holders: they live inside
//! store leaves and are replaced wholesale, never mutated in place.
//! Everything a process needs per call arrives through its port states.

use indexmap::IndexMap;

use crate::error::ProcessError;
use crate::schema::Schema;
use crate::update::Update;
use crate::value::Value;

/// Timestep used by processes that do not declare their own.
pub const DEFAULT_TIMESTEP: f64 = 1.0;

/// Port name → schema fragment for the store node the port is wired to.
///
/// A fragment with children declares named targets under the port's
/// node; a fragment with a `subschema` declares the wildcard `*` target.
pub type PortsSchema = IndexMap<String, Schema>;

/// Port name → current value of the store node the port is wired to.
/// Unresolvable ports map to [`Value::Null`].
pub type States = IndexMap<String, Value>;

/// Port name → update for the store node the port is wired to.
pub type ProcessUpdate = IndexMap<String, Update>;

/// An auxiliary deriver a process asks to have wired alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct DeriverSpec {
    /// Sibling node name for the deriver.
    pub name: String,
    /// Registry key of the deriver's process factory.
    pub key: String,
    /// Deriver port → owner port. Unmapped deriver ports reuse the owner
    /// port of the same name.
    pub port_mapping: IndexMap<String, String>,
    /// Configuration passed to the factory.
    pub config: Value,
}

/// A simulation unit with its own timestep.
///
/// # Contract
///
/// - `next_update()` is a pure function of `interval` and the port states;
///   it must not depend on hidden mutable state.
/// - `ports_schema()` and `derivers()` are called once at wiring time.
/// - Derivers (`is_deriver() == true`) are re-run with `interval == 0`
///   after every merged batch instead of being scheduled on a timestep.
///
/// # Examples
///
/// ```
/// use arbor_core::{
///     LeafSchema, Process, ProcessError, ProcessUpdate, PortsSchema, Schema, States, Update,
/// };
///
/// struct Decay {
///     rate: f64,
/// }
///
/// impl Process for Decay {
///     fn name(&self) -> &str { "decay" }
///
///     fn ports_schema(&self) -> PortsSchema {
///         let level = LeafSchema::new().with_default(1.0).with_updater("accumulate");
///         PortsSchema::from([("pool".to_string(), Schema::branch().with_leaf("level", level))])
///     }
///
///     fn next_update(&self, interval: f64, states: &States) -> Result<ProcessUpdate, ProcessError> {
///         let level = states["pool"]["level"].as_f64().ok_or(ProcessError::MissingState {
///             port: "pool".into(),
///         })?;
///         let pool = arbor_core::BranchUpdate::new().with_write("level", -self.rate * level * interval);
///         Ok(ProcessUpdate::from([("pool".to_string(), Update::from(pool))]))
///     }
/// }
///
/// let decay = Decay { rate: 0.5 };
/// assert_eq!(decay.local_timestep(), arbor_core::DEFAULT_TIMESTEP);
/// assert!(!decay.is_deriver());
/// ```
pub trait Process: Send + Sync + 'static {
    /// Human-readable name for diagnostics and emission.
    fn name(&self) -> &str;

    /// Schema fragments for every port.
    fn ports_schema(&self) -> PortsSchema;

    /// Compute the update for the next `interval` of simulated time.
    fn next_update(&self, interval: f64, states: &States) -> Result<ProcessUpdate, ProcessError>;

    /// Preferred interval between calls.
    fn local_timestep(&self) -> f64 {
        DEFAULT_TIMESTEP
    }

    /// Whether this process is a zero-timestep deriver.
    fn is_deriver(&self) -> bool {
        false
    }

    /// Derivers to wire alongside this process.
    fn derivers(&self) -> Vec<DeriverSpec> {
        Vec::new()
    }
}
