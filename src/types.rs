//! Core types for spark-validation.
//!
//! Paths address both the data model (store paths) and the validation tree
//! (group-by-path references). Status flags summarise a node's reactive
//! attributes in one value.

use std::fmt;

// =============================================================================
// Path
// =============================================================================

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key (or tree child name).
    Key(String),
    /// Array position (or collection element).
    Index(usize),
}

impl Segment {
    /// Position this segment addresses in a sequence, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(key) => canonical_index(key),
        }
    }

    /// The segment as it appears in a dotted path.
    pub fn as_string(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Segment {
    /// Canonical decimal text (`"0"`, `"12"`) is an index; anything else,
    /// `"007"` and `"+1"` included, is a key.
    fn from(raw: &str) -> Self {
        match canonical_index(raw) {
            Some(index) => Segment::Index(index),
            None => Segment::Key(raw.to_string()),
        }
    }
}

fn canonical_index(raw: &str) -> Option<usize> {
    let index = raw.parse::<usize>().ok()?;
    (index.to_string() == raw).then_some(index)
}

impl From<String> for Segment {
    fn from(raw: String) -> Self {
        Segment::from(raw.as_str())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A location in the data model or the validation tree.
///
/// The empty path is the root. Numeric segments parse as indices, everything
/// else as keys; lookups accept either form against both objects and arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<Segment>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path (`"items.0.name"`). The empty string is the root.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(Segment::from).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path with one more segment appended.
    pub fn join(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    /// Path of the containing value, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// True if `self` equals `other` or is an ancestor of it.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// True if one path contains the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Segments rendered as strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(Segment::as_string).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse(dotted)
    }
}

impl From<String> for Path {
    fn from(dotted: String) -> Self {
        Path::parse(&dotted)
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for Path {
    fn from(segments: Vec<&str>) -> Self {
        Self(segments.into_iter().map(Segment::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.into_iter().map(Segment::from).collect())
    }
}

// =============================================================================
// Node Status (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Snapshot of a node's boolean attributes.
    ///
    /// Combine with bitwise OR: `NodeStatus::DIRTY | NodeStatus::INVALID`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeStatus: u8 {
        const NONE = 0;
        const INVALID = 1 << 0;
        const DIRTY = 1 << 1;
        const ANY_DIRTY = 1 << 2;
        const ERROR = 1 << 3;
        const ANY_ERROR = 1 << 4;
        const PENDING = 1 << 5;
    }
}

// =============================================================================
// Tests
// =============================================================================
