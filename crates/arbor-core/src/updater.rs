//! Updater strategies: how an incoming write is merged into a leaf.
//!
//! Updaters are a closed set of built-in strategies plus one variant
//! wrapping an injected function. String keys are resolved once, at
//! wiring time, through the [`Registry`](crate::registry::Registry); the
//! update hot path only ever sees an [`Updater`] value.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Signature of an injected updater: `(current, incoming) -> new`.
pub type UpdaterFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;

/// A pure merge rule `(current, incoming) -> new_value`.
#[derive(Clone)]
pub enum Updater {
    /// Arithmetic add (`accumulate`, alias `delta`).
    Accumulate,
    /// Replace the current value (`set`).
    Set,
    /// Shallow per-key map merge, biased toward the incoming value (`merge`).
    Merge,
    /// Ignore the write (`null`).
    Null,
    /// Arithmetic add clamped at zero (`nonnegative_accumulate`).
    NonnegativeAccumulate,
    /// A user-supplied rule.
    Custom {
        /// Name used in diagnostics.
        name: String,
        /// The merge function.
        func: UpdaterFn,
    },
}

impl Updater {
    /// Wrap a closure as a named custom updater.
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The registry key (or custom name) of this updater.
    pub fn name(&self) -> &str {
        match self {
            Self::Accumulate => "accumulate",
            Self::Set => "set",
            Self::Merge => "merge",
            Self::Null => "null",
            Self::NonnegativeAccumulate => "nonnegative_accumulate",
            Self::Custom { name, .. } => name,
        }
    }

    /// Merge `incoming` into `current`.
    pub fn apply(&self, current: &Value, incoming: &Value) -> Result<Value, String> {
        match self {
            Self::Accumulate => current.add(incoming),
            Self::Set => Ok(incoming.clone()),
            Self::Null => Ok(current.clone()),
            Self::NonnegativeAccumulate => Ok(clamp_nonnegative(current.add(incoming)?)),
            Self::Merge => match (current, incoming) {
                (Value::Null, v) => Ok(v.clone()),
                (Value::Map(base), Value::Map(over)) => {
                    let mut out = base.clone();
                    for (k, v) in over {
                        out.insert(k.clone(), v.clone());
                    }
                    Ok(Value::Map(out))
                }
                (a, b) => Err(format!(
                    "merge requires maps, got {} and {}",
                    a.type_name(),
                    b.type_name()
                )),
            },
            Self::Custom { func, .. } => func(current, incoming),
        }
    }
}

fn clamp_nonnegative(value: Value) -> Value {
    match value {
        Value::Int(n) if n < 0 => Value::Int(0),
        Value::Float(x) if x < 0.0 => Value::Float(0.0),
        Value::List(items) => Value::List(items.into_iter().map(clamp_nonnegative).collect()),
        Value::Map(m) => Value::Map(
            m.into_iter()
                .map(|(k, v)| (k, clamp_nonnegative(v)))
                .collect(),
        ),
        other => other,
    }
}

impl PartialEq for Updater {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom { func: a, .. }, Self::Custom { func: b, .. }) => Arc::ptr_eq(a, b),
            (Self::Custom { .. }, _) | (_, Self::Custom { .. }) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updater({})", self.name())
    }
}
