// stateflow-core/src/core/time.rs
// ============================================================================
// Module: Stateflow Time Model
// Description: Canonical timestamp representation for history records.
// Purpose: Provide replay-friendly time values with wall and logical forms.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! History items carry explicit timestamps produced by the configured clock.
//! Wall timestamps are unix milliseconds; logical timestamps are monotonic
//! counters that keep replays and determinism tests stable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in history records.
///
/// # Invariants
/// - Monotonicity within one thread is a clock responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Monotonic logical time value.
    Logical(u64),
    /// Unix epoch milliseconds.
    UnixMillis(i64),
}

impl Timestamp {
    /// Returns the current wall-clock timestamp.
    #[must_use]
    pub fn now_wall() -> Self {
        let now = OffsetDateTime::now_utc();
        let millis = now.unix_timestamp() * 1_000 + i64::from(now.millisecond());
        Self::UnixMillis(millis)
    }

    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::Logical(value) => Some(*value),
            Self::UnixMillis(_) => None,
        }
    }
}
