use std::fmt;

use serde::{Deserialize, Serialize};

/// A stable location in the shared document tree.
///
/// Paths are ordered lexicographically by segment, which keeps register
/// iteration deterministic and makes subtree scans a contiguous range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend this path with one more segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &DocPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends() {
        let p = DocPath::new(["entities", "abc"]);
        let q = p.child("transform");
        assert_eq!(q.segments(), ["entities", "abc", "transform"]);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn starts_with_prefix() {
        let root = DocPath::new(["entities", "abc"]);
        let leaf = root.child("transform").child("origin");
        assert!(leaf.starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!root.starts_with(&leaf));
        assert!(leaf.starts_with(&DocPath::root()));
    }

    #[test]
    fn display_joins_segments() {
        let p = DocPath::new(["entities", "e1", "transform"]);
        assert_eq!(p.to_string(), "entities/e1/transform");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = DocPath::new(["a"]);
        let ab = DocPath::new(["a", "b"]);
        let b = DocPath::new(["b"]);
        assert!(a < ab);
        assert!(ab < b);
    }
}
