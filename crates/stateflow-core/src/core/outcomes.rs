// stateflow-core/src/core/outcomes.rs
// ============================================================================
// Module: Stateflow Outcomes
// Description: Labelled exit edges of states and the reserved outcome set.
// Purpose: Provide the outcome vocabulary shared by states and transitions.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Every state carries an ordered outcome list that always contains the
//! three reserved outcomes: `success` (0), `aborted` (-1), and `preempted`
//! (-2). User outcomes use positive identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OutcomeId;

// ============================================================================
// SECTION: Reserved Outcomes
// ============================================================================

/// Identifier of the reserved `success` outcome.
pub const SUCCESS_OUTCOME_ID: OutcomeId = OutcomeId::from_raw(0);

/// Identifier of the reserved `aborted` outcome.
pub const ABORTED_OUTCOME_ID: OutcomeId = OutcomeId::from_raw(-1);

/// Identifier of the reserved `preempted` outcome.
pub const PREEMPTED_OUTCOME_ID: OutcomeId = OutcomeId::from_raw(-2);

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Labelled exit edge of a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Outcome identifier, unique within the owning state.
    pub outcome_id: OutcomeId,
    /// Outcome name, unique within the owning state.
    pub name: String,
}

impl Outcome {
    /// Creates a new outcome.
    #[must_use]
    pub fn new(outcome_id: OutcomeId, name: impl Into<String>) -> Self {
        Self {
            outcome_id,
            name: name.into(),
        }
    }

    /// Returns the reserved `success` outcome.
    #[must_use]
    pub fn success() -> Self {
        Self::new(SUCCESS_OUTCOME_ID, "success")
    }

    /// Returns the reserved `aborted` outcome.
    #[must_use]
    pub fn aborted() -> Self {
        Self::new(ABORTED_OUTCOME_ID, "aborted")
    }

    /// Returns the reserved `preempted` outcome.
    #[must_use]
    pub fn preempted() -> Self {
        Self::new(PREEMPTED_OUTCOME_ID, "preempted")
    }

    /// Returns the reserved outcome set every state starts with.
    #[must_use]
    pub fn standard_set() -> Vec<Self> {
        vec![Self::success(), Self::aborted(), Self::preempted()]
    }

    /// Returns true if this is one of the reserved outcomes.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.outcome_id.as_raw() <= 0
    }
}
