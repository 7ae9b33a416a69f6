//! Divider strategies: how a leaf value is split between two daughters.
//!
//! Dividers run only when a `divide` update is applied. A leaf without a
//! divider contributes nothing to the daughter states, so daughters fall
//! back to the leaf's schema default.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::process::States;
use crate::update::PortTopology;
use crate::value::Value;

/// Signature of an injected divider.
///
/// Receives the mother value, the sibling context resolved from the
/// divider's topology (empty when it declares none), and the store's
/// random source.
pub type DividerFn =
    Arc<dyn Fn(&Value, &States, &mut dyn RngCore) -> Result<[Value; 2], String> + Send + Sync>;

/// A rule producing two daughter values from one mother value.
#[derive(Clone)]
pub enum Divider {
    /// Both daughters receive a copy (`set`).
    Set,
    /// Halve numbers; an odd integer remainder goes to a randomly chosen
    /// daughter so counts are conserved exactly (`split`).
    Split,
    /// Both daughters start at zero (`zero`).
    Zero,
    /// Division of this leaf is an error (`no_divide`).
    NoDivide,
    /// A user-supplied rule.
    Custom {
        /// Name used in diagnostics.
        name: String,
        /// The split function.
        func: DividerFn,
    },
    /// A divider that needs state outside its own leaf. `topology` is
    /// resolved relative to the leaf's parent and passed as context.
    WithTopology {
        /// The underlying rule.
        divider: Box<Divider>,
        /// Port name → path, relative to the leaf's parent.
        topology: PortTopology,
    },
}

impl Divider {
    /// Wrap a closure as a named custom divider.
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &States, &mut dyn RngCore) -> Result<[Value; 2], String>
            + Send
            + Sync
            + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// The registry key (or custom name) of this divider.
    pub fn name(&self) -> &str {
        match self {
            Self::Set => "set",
            Self::Split => "split",
            Self::Zero => "zero",
            Self::NoDivide => "no_divide",
            Self::Custom { name, .. } => name,
            Self::WithTopology { divider, .. } => divider.name(),
        }
    }

    /// The sibling topology this divider needs, if any.
    pub fn topology(&self) -> Option<&PortTopology> {
        match self {
            Self::WithTopology { topology, .. } => Some(topology),
            _ => None,
        }
    }

    /// Split `value` into two daughter values.
    pub fn divide(
        &self,
        value: &Value,
        context: &States,
        rng: &mut dyn RngCore,
    ) -> Result<[Value; 2], String> {
        match self {
            Self::Set => Ok([value.clone(), value.clone()]),
            Self::Split => split(value, rng),
            Self::Zero => zero(value).map(|z| [z.clone(), z]),
            Self::NoDivide => Err("leaf is marked no_divide".to_string()),
            Self::Custom { func, .. } => func(value, context, rng),
            Self::WithTopology { divider, .. } => divider.divide(value, context, rng),
        }
    }
}

/// Each integer leaf draws its own coin for the remainder.
fn split(value: &Value, rng: &mut dyn RngCore) -> Result<[Value; 2], String> {
    match value {
        Value::Null => Ok([Value::Null, Value::Null]),
        Value::Int(n) => {
            let half = n.div_euclid(2);
            let rem = n.rem_euclid(2);
            if rng.gen_bool(0.5) {
                Ok([Value::Int(half + rem), Value::Int(half)])
            } else {
                Ok([Value::Int(half), Value::Int(half + rem)])
            }
        }
        Value::Float(x) => Ok([Value::Float(x / 2.0), Value::Float(x / 2.0)]),
        Value::List(items) => {
            let mut a = Vec::with_capacity(items.len());
            let mut b = Vec::with_capacity(items.len());
            for item in items {
                let [x, y] = split(item, rng)?;
                a.push(x);
                b.push(y);
            }
            Ok([Value::List(a), Value::List(b)])
        }
        Value::Map(m) => {
            let mut a = crate::value::ValueMap::with_capacity(m.len());
            let mut b = crate::value::ValueMap::with_capacity(m.len());
            for (k, v) in m {
                let [x, y] = split(v, rng)?;
                a.insert(k.clone(), x);
                b.insert(k.clone(), y);
            }
            Ok([Value::Map(a), Value::Map(b)])
        }
        other => Err(format!("cannot split a {} value", other.type_name())),
    }
}

fn zero(value: &Value) -> Result<Value, String> {
    match value {
        Value::Null | Value::Float(_) => Ok(Value::Float(0.0)),
        Value::Int(_) => Ok(Value::Int(0)),
        Value::List(items) => items.iter().map(zero).collect::<Result<_, _>>().map(Value::List),
        Value::Map(m) => m
            .iter()
            .map(|(k, v)| zero(v).map(|z| (k.clone(), z)))
            .collect::<Result<_, _>>()
            .map(Value::Map),
        other => Err(format!("cannot zero a {} value", other.type_name())),
    }
}

impl PartialEq for Divider {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Custom { func: a, .. }, Self::Custom { func: b, .. }) => Arc::ptr_eq(a, b),
            (
                Self::WithTopology {
                    divider: a,
                    topology: ta,
                },
                Self::WithTopology {
                    divider: b,
                    topology: tb,
                },
            ) => a == b && ta == tb,
            (Self::Custom { .. }, _)
            | (_, Self::Custom { .. })
            | (Self::WithTopology { .. }, _)
            | (_, Self::WithTopology { .. }) => false,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Debug for Divider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithTopology { divider, topology } => f
                .debug_struct("Divider")
                .field("divider", divider)
                .field("topology", topology)
                .finish(),
            other => write!(f, "Divider({})", other.name()),
        }
    }
}
