//! Typed paths into JSON documents.
//!
//! A [`JsonPath`] is an immutable sequence of field-name and array-index
//! segments. Paths are built during traversal with [`JsonPath::append`] and
//! [`JsonPath::append_index`], each returning a new path.
//!
//! Paths render in dotted form (`tags[1].name`) for reports and convert to
//! RFC 6901 JSON Pointers (`/tags/1/name`) for JSON Patch interop.

use crate::errors::DiffError;
use crate::DiffResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single step into a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object property key
    Field(String),
    /// Array index
    Index(usize),
}

/// Relationship between two paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    /// Paths are identical
    Same,
    /// First path is a strict prefix of the second
    Ancestor,
    /// Second path is a strict prefix of the first
    Descendant,
    /// Paths share the same parent (e.g. `a.b` and `a.c`)
    Sibling,
    /// None of the above
    Unrelated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// The document root (empty path)
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn append(&self, field: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(field.into()));
        Self { segments }
    }

    pub fn append_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Get parent path, or None for the root
    pub fn parent(&self) -> Option<JsonPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Index of the final segment when it addresses an array element
    pub fn last_index(&self) -> Option<usize> {
        match self.last() {
            Some(PathSegment::Index(idx)) => Some(*idx),
            _ => None,
        }
    }

    /// True if `self` is a strict prefix of `other`
    pub fn is_ancestor_of(&self, other: &JsonPath) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    pub fn is_descendant_of(&self, other: &JsonPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// Same path or one contains the other
    pub fn overlaps(&self, other: &JsonPath) -> bool {
        matches!(
            self.relation(other),
            PathRelation::Same | PathRelation::Ancestor | PathRelation::Descendant
        )
    }

    /// Determine relationship between two paths
    ///
    /// # Examples
    /// ```
    /// # use concord_core::path::{JsonPath, PathRelation};
    /// let a = JsonPath::root().append("a");
    /// assert_eq!(a.relation(&a.append("b")), PathRelation::Ancestor);
    /// assert_eq!(a.append("b").relation(&a.append("c")), PathRelation::Sibling);
    /// ```
    pub fn relation(&self, other: &JsonPath) -> PathRelation {
        if self == other {
            return PathRelation::Same;
        }
        if self.is_ancestor_of(other) {
            return PathRelation::Ancestor;
        }
        if other.is_ancestor_of(self) {
            return PathRelation::Descendant;
        }
        match (self.parent(), other.parent()) {
            (Some(p1), Some(p2)) if p1 == p2 => PathRelation::Sibling,
            _ => PathRelation::Unrelated,
        }
    }

    /// Parse an RFC 6901 JSON Pointer.
    ///
    /// Segments made only of digits (without a leading zero) become array
    /// indices; everything else is a field name.
    ///
    /// # Examples
    /// ```
    /// # use concord_core::path::JsonPath;
    /// let path = JsonPath::from_pointer("/items/0/name").unwrap();
    /// assert_eq!(path.to_string(), "items[0].name");
    /// assert!(JsonPath::from_pointer("").unwrap().is_root());
    /// ```
    pub fn from_pointer(pointer: &str) -> DiffResult<Self> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }

        if !pointer.starts_with('/') {
            return Err(DiffError::InvalidPath(format!(
                "Pointer must start with /: {}",
                pointer
            )));
        }

        let segments = pointer[1..]
            .split('/')
            .map(|segment| {
                // Unescape ~1 before ~0
                let unescaped = segment.replace("~1", "/").replace("~0", "~");
                let is_index = !unescaped.is_empty()
                    && unescaped.bytes().all(|b| b.is_ascii_digit())
                    && (unescaped == "0" || !unescaped.starts_with('0'));
                match unescaped.parse::<usize>() {
                    Ok(index) if is_index => PathSegment::Index(index),
                    _ => PathSegment::Field(unescaped),
                }
            })
            .collect();

        Ok(Self { segments })
    }

    /// Render as an RFC 6901 JSON Pointer (root is the empty string)
    pub fn to_pointer(&self) -> String {
        let mut pointer = String::new();
        for segment in &self.segments {
            pointer.push('/');
            match segment {
                PathSegment::Field(key) => {
                    // ~ must be escaped before /
                    pointer.push_str(&key.replace('~', "~0").replace('/', "~1"));
                }
                PathSegment::Index(idx) => pointer.push_str(&idx.to_string()),
            }
        }
        pointer
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Field(key) => write!(f, ".{}", key)?,
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for JsonPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self::from_segments(segments)
    }
}
