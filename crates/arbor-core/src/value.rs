//! Dynamically typed values held by store leaves and carried by updates.

use std::fmt;
use std::ops::{Deref, Index};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::path::{Path, PathStep};
use crate::process::Process;

/// Ordered string-keyed map of values.
pub type ValueMap = IndexMap<String, Value>;

/// A leaf value, or a nested tree of them.
///
/// Maps preserve insertion order so that traversals, emissions, and
/// batch application are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// No value (unset leaf, missing port state).
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Exact integer count.
    Int(i64),
    /// Floating-point quantity.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Ordered string-keyed map.
    Map(ValueMap),
    /// A process stored as an ordinary leaf value.
    Process(ProcessRef),
}

impl Value {
    /// An empty map.
    pub fn map() -> Self {
        Self::Map(ValueMap::new())
    }

    /// Short name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Process(_) => "process",
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view: ints are widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Integer view.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Map view.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// List view.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Process view.
    pub fn as_process(&self) -> Option<&ProcessRef> {
        match self {
            Self::Process(p) => Some(p),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    /// Follow the keys of `path` through nested maps.
    ///
    /// Parent markers cannot be followed in a detached value tree, so a
    /// path containing one yields `None`.
    pub fn get_in(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for step in path.steps() {
            match step {
                PathStep::Key(k) => current = current.get(k)?,
                PathStep::Parent => return None,
            }
        }
        Some(current)
    }

    /// Arithmetic sum used by the `accumulate` family of updaters.
    ///
    /// Ints add exactly, mixed numeric operands promote to float, `Null`
    /// is the identity, lists add element-wise and maps add key-wise
    /// (keys missing on the left are inserted).
    pub fn add(&self, other: &Value) -> Result<Value, String> {
        match (self, other) {
            (Self::Null, v) => Ok(v.clone()),
            (v, Self::Null) => Ok(v.clone()),
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(*b)
                .map(Self::Int)
                .ok_or_else(|| format!("integer overflow adding {a} and {b}")),
            (Self::Float(a), Self::Float(b)) => Ok(Self::Float(a + b)),
            (Self::Int(a), Self::Float(b)) => Ok(Self::Float(*a as f64 + b)),
            (Self::Float(a), Self::Int(b)) => Ok(Self::Float(a + *b as f64)),
            (Self::List(a), Self::List(b)) => {
                if a.len() != b.len() {
                    return Err(format!(
                        "cannot add lists of length {} and {}",
                        a.len(),
                        b.len()
                    ));
                }
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.add(y))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Self::List)
            }
            (Self::Map(a), Self::Map(b)) => {
                let mut out = a.clone();
                for (k, v) in b {
                    let sum = match out.get(k) {
                        Some(existing) => existing.add(v)?,
                        None => v.clone(),
                    };
                    out.insert(k.clone(), sum);
                }
                Ok(Self::Map(out))
            }
            (a, b) => Err(format!(
                "cannot add {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// Recursively overlay `other` onto this value: maps merge key by key,
    /// anything else is replaced by `other`.
    pub fn deep_merge(&self, other: &Value) -> Value {
        match (self, other) {
            (Self::Map(base), Self::Map(over)) => {
                let mut out = base.clone();
                for (k, v) in over {
                    let merged = match out.get(k) {
                        Some(existing) => existing.deep_merge(v),
                        None => v.clone(),
                    };
                    out.insert(k.clone(), merged);
                }
                Self::Map(out)
            }
            (base, Self::Null) => base.clone(),
            (_, over) => over.clone(),
        }
    }

    /// Structural equality in which floats compare by bit pattern, so a
    /// `NaN` equals itself. Used where configuration must be idempotent.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.same_as(w)))
            }
            (a, b) => a == b,
        }
    }
}

static NULL: Value = Value::Null;

impl Index<&str> for Value {
    type Output = Value;

    /// Missing keys (and non-map values) index to `Null`.
    fn index(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(m: ValueMap) -> Self {
        Self::Map(m)
    }
}

impl From<ProcessRef> for Value {
    fn from(p: ProcessRef) -> Self {
        Self::Process(p)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ── ProcessRef ─────────────────────────────────────────────────────

/// Shared handle to a [`Process`] stored in the tree.
///
/// Equality is identity: two handles are equal only if they point at the
/// same process instance.
#[derive(Clone)]
pub struct ProcessRef(Arc<dyn Process>);

impl ProcessRef {
    /// Wrap a process.
    pub fn new<P: Process>(process: P) -> Self {
        Self(Arc::new(process))
    }

    /// Wrap an already shared process.
    pub fn from_arc(process: Arc<dyn Process>) -> Self {
        Self(process)
    }
}

impl Deref for ProcessRef {
    type Target = dyn Process;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for ProcessRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessRef({})", self.0.name())
    }
}
