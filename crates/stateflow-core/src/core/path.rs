// stateflow-core/src/core/path.rs
// ============================================================================
// Module: Stateflow State Paths
// Description: Slash-separated state paths for lookup and history records.
// Purpose: Address states in the tree without parent back-references.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A state path is the chain of state ids from the root to a state, rendered
//! with `/` separators. Paths are how the engine, history, and edits address
//! tree positions; parent lookup is a path walk from the root.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

use crate::core::identifiers::StateId;

// ============================================================================
// SECTION: State Path
// ============================================================================

/// Chain of state ids addressing a state from the root.
///
/// Paths serialize as their `/`-separated rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StatePath(Vec<StateId>);

impl Serialize for StatePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rendered = String::deserialize(deserializer)?;
        if rendered.contains("//") {
            return Err(de::Error::custom("empty state path segment"));
        }
        Ok(Self::parse(&rendered))
    }
}

impl StatePath {
    /// Creates a path from its segments.
    #[must_use]
    pub const fn new(segments: Vec<StateId>) -> Self {
        Self(segments)
    }

    /// Creates a single-segment path for a root state.
    #[must_use]
    pub fn root(id: StateId) -> Self {
        Self(vec![id])
    }

    /// Parses a `/`-separated rendering.
    #[must_use]
    pub fn parse(rendered: &str) -> Self {
        if rendered.is_empty() {
            return Self(Vec::new());
        }
        Self(rendered.split('/').map(StateId::from).collect())
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[StateId] {
        &self.0
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the last segment, if any.
    #[must_use]
    pub fn leaf(&self) -> Option<&StateId> {
        self.0.last()
    }

    /// Returns the path without its last segment, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[.. self.0.len() - 1].to_vec()))
    }

    /// Returns this path extended by one segment.
    #[must_use]
    pub fn join(&self, id: StateId) -> Self {
        let mut segments = self.0.clone();
        segments.push(id);
        Self(segments)
    }

    /// Returns true if `self` is a strict prefix of `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0[.. self.0.len()] == self.0[..]
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
