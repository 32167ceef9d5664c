// stateflow-core/src/core/identifiers.rs
// ============================================================================
// Module: Stateflow Identifiers
// Description: Canonical opaque identifiers for states, elements, and runs.
// Purpose: Provide strongly typed, serializable ids with explicit allocation.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Stateflow. State ids
//! are short opaque strings unique among siblings; element ids (ports,
//! outcomes, transitions, data flows) are numeric and unique within their
//! owning state; run and history-item ids are uuid-shaped strings. Numeric
//! ids are allocated from the set of ids already in use, so no ambient
//! counters are involved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of characters in a generated state identifier.
pub const STATE_ID_LENGTH: usize = 6;

/// Alphabet used for generated state identifiers.
const STATE_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of random bytes in a generated run or history-item identifier.
const OPAQUE_ID_BYTES: usize = 16;

/// Reserved state identifier of the implicit decider child of a
/// barrier-concurrency state.
///
/// The id is one character longer than generated state ids, so it can never
/// collide with a sibling.
pub const UNIQUE_DECIDER_STATE_ID: &str = "DECIDER";

// ============================================================================
// SECTION: State Identifier
// ============================================================================

/// State identifier, unique among the siblings of one container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    /// Creates a state identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random state identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id: String = (0 .. STATE_ID_LENGTH)
            .map(|_| char::from(STATE_ID_ALPHABET[rng.gen_range(0 .. STATE_ID_ALPHABET.len())]))
            .collect();
        Self(id)
    }

    /// Returns the reserved decider state identifier.
    #[must_use]
    pub fn decider() -> Self {
        Self(UNIQUE_DECIDER_STATE_ID.to_string())
    }

    /// Returns true if this is the reserved decider state identifier.
    #[must_use]
    pub fn is_decider(&self) -> bool {
        self.0 == UNIQUE_DECIDER_STATE_ID
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StateId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Element Identifiers
// ============================================================================

/// Data port identifier, unique within the owning state across input ports,
/// output ports, and scoped variables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PortId(u64);

impl PortId {
    /// Creates a port identifier from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome identifier, unique within the owning state.
///
/// Non-negative values are user outcomes; the reserved outcomes use `0`
/// (success), `-1` (aborted), and `-2` (preempted).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OutcomeId(i64);

impl OutcomeId {
    /// Creates an outcome identifier from a raw value.
    #[must_use]
    pub const fn from_raw(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OutcomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transition identifier, unique within the owning container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TransitionId(u64);

impl TransitionId {
    /// Creates a transition identifier from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Data flow identifier, unique within the owning container.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DataFlowId(u64);

impl DataFlowId {
    /// Creates a data flow identifier from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DataFlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Run and History Identifiers
// ============================================================================

/// Run identifier shared by every history item of one execution of one state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a run identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh uuid-shaped run identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_opaque_id())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State machine identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Creates a machine identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh uuid-shaped machine identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_opaque_id())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// History item identifier, unique across one execution log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryItemId(String);

impl HistoryItemId {
    /// Creates a history item identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh uuid-shaped history item identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_opaque_id())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HistoryItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Allocation Helpers
// ============================================================================

/// Returns the next free numeric id given the ids already in use.
///
/// Allocation is deterministic: one past the maximum used value, so removed
/// ids are never recycled within the same owner generation.
#[must_use]
pub fn next_numeric_id(used: impl IntoIterator<Item = u64>) -> u64 {
    used.into_iter().max().map_or(1, |max| max + 1)
}

/// Returns the next free non-negative outcome id given the ids in use.
///
/// Reserved negative ids are ignored, so user outcomes start at `1`.
#[must_use]
pub fn next_outcome_id(used: impl IntoIterator<Item = i64>) -> i64 {
    used.into_iter().filter(|id| *id >= 0).max().map_or(1, |max| max + 1)
}

/// Generates a hex-encoded opaque identifier.
fn generate_opaque_id() -> String {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(OPAQUE_ID_BYTES * 2);
    for _ in 0 .. OPAQUE_ID_BYTES {
        let byte: u8 = rng.r#gen();
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
