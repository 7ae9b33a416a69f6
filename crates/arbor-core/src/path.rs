//! Store paths: sequences of child names and parent markers.
//!
//! A [`Path`] is always interpreted relative to some node. Topology paths
//! are relative to the process's containing node; update control paths
//! (`delete`, `generate`, `divide`) are relative to the node the update is
//! applied at. `..` steps ([`PathStep::Parent`]) let a port reach state
//! outside the process's local subtree.

use smallvec::SmallVec;
use std::fmt;

/// One step along a [`Path`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    /// Descend into the named child.
    Key(String),
    /// Step up to the parent node (`..`).
    Parent,
}

impl PathStep {
    /// The child name, or `None` for a parent marker.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Parent => None,
        }
    }
}

impl From<&str> for PathStep {
    fn from(s: &str) -> Self {
        if s == ".." {
            Self::Parent
        } else {
            Self::Key(s.to_string())
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Parent => write!(f, ".."),
        }
    }
}

/// An ordered sequence of [`PathStep`]s.
///
/// Most paths are a handful of steps, so they are stored inline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(SmallVec<[PathStep; 4]>);

impl Path {
    /// The empty path, addressing the node it is resolved from.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    /// Parse a `/`-separated path. Empty segments are skipped and `..`
    /// becomes [`PathStep::Parent`].
    ///
    /// ```
    /// use arbor_core::{Path, PathStep};
    /// let p = Path::parse("../global/volume");
    /// assert_eq!(p.len(), 3);
    /// assert_eq!(p.steps()[0], PathStep::Parent);
    /// ```
    pub fn parse(s: &str) -> Self {
        s.split('/').filter(|seg| !seg.is_empty()).collect()
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the empty path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a child step.
    pub fn push(&mut self, key: impl Into<String>) {
        self.0.push(PathStep::Key(key.into()));
    }

    /// Return a copy with a child step appended.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push(key);
        next
    }

    /// The path with its last step removed, or `None` for the empty path.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut steps = self.0.clone();
        steps.pop();
        Some(Self(steps))
    }

    /// The last step's child name, if the path ends in one.
    pub fn last_key(&self) -> Option<&str> {
        self.0.last().and_then(PathStep::key)
    }

    /// Concatenate `other` onto this path and normalize the result.
    pub fn join(&self, other: &Path) -> Self {
        let mut steps = self.0.clone();
        steps.extend(other.0.iter().cloned());
        Self(steps).normalize()
    }

    /// Cancel every `Key` followed by a `Parent`.
    ///
    /// Leading `Parent` steps that have nothing left to cancel are kept,
    /// so a normalized path is either fully resolved (keys only) or climbs
    /// above the node it is resolved from.
    pub fn normalize(&self) -> Self {
        let mut out: SmallVec<[PathStep; 4]> = SmallVec::new();
        for step in &self.0 {
            match step {
                PathStep::Parent => match out.last() {
                    Some(PathStep::Key(_)) => {
                        out.pop();
                    }
                    _ => out.push(PathStep::Parent),
                },
                key => out.push(key.clone()),
            }
        }
        Self(out)
    }

    /// Whether the path contains no [`PathStep::Parent`] steps.
    pub fn is_resolved(&self) -> bool {
        self.0.iter().all(|s| matches!(s, PathStep::Key(_)))
    }

    /// Whether `prefix` is a leading sub-sequence of this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The remainder of this path after `prefix`, if it starts with it.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Self> {
        if self.starts_with(prefix) {
            Some(Self(self.0[prefix.0.len()..].iter().cloned().collect()))
        } else {
            None
        }
    }

    /// Iterate over the child names, skipping parent markers.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(PathStep::key)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|s| PathStep::from(s.as_ref()))
                .collect(),
        )
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(steps: [&str; N]) -> Self {
        steps.into_iter().collect()
    }
}

impl From<Vec<PathStep>> for Path {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_empty_segments() {
        let p = Path::parse("/agents//1/");
        assert_eq!(p, Path::from(["agents", "1"]));
    }

    #[test]
    fn parent_marker_round_trips_through_display() {
        let p = Path::parse("../../global");
        assert_eq!(p.to_string(), "../../global");
        assert!(!p.is_resolved());
    }

    #[test]
    fn join_cancels_parent_steps() {
        let frame = Path::from(["agents", "1"]);
        let port = Path::parse("../../global");
        assert_eq!(frame.join(&port), Path::from(["global"]));
    }

    #[test]
    fn normalize_keeps_unmatched_leading_parents() {
        let p = Path::parse("a/../../b").normalize();
        assert_eq!(p.steps(), &[PathStep::Parent, PathStep::Key("b".into())]);
    }

    #[test]
    fn strip_prefix_returns_remainder() {
        let p = Path::from(["agents", "1", "mass"]);
        let rest = p.strip_prefix(&Path::from(["agents"])).unwrap();
        assert_eq!(rest, Path::from(["1", "mass"]));
        assert!(p.strip_prefix(&Path::from(["global"])).is_none());
    }

    #[test]
    fn root_displays_as_slash() {
        assert_eq!(Path::root().to_string(), "/");
        assert!(Path::root().parent().is_none());
    }
}
