// stateflow-core/src/core/linkage.rs
// ============================================================================
// Module: Stateflow Linkage
// Description: Transitions and data flows between sibling states.
// Purpose: Describe control and data routing within one container.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Transitions route a `(state, outcome)` pair to a sibling or to an outcome
//! of the enclosing container; data flows route port and scoped-variable
//! values between siblings, the container, and scoped variables. Both are
//! owned by the container whose children they connect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DataFlowId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TransitionId;

// ============================================================================
// SECTION: Transition
// ============================================================================

/// Control transition within a container.
///
/// # Invariants
/// - `from_state == container id` with `from_outcome == None` marks the
///   start linkage of the container.
/// - `to_outcome` is present exactly when `to_state` is the container id.
/// - `(from_state, from_outcome)` is unique across the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition identifier, unique within the owning container.
    pub transition_id: TransitionId,
    /// Origin state; the container id for start linkage.
    pub from_state: StateId,
    /// Origin outcome; absent for start linkage.
    pub from_outcome: Option<OutcomeId>,
    /// Target state; the container id when leaving the container.
    pub to_state: StateId,
    /// Target outcome of the container when leaving it.
    pub to_outcome: Option<OutcomeId>,
}

impl Transition {
    /// Creates a new transition.
    #[must_use]
    pub const fn new(
        transition_id: TransitionId,
        from_state: StateId,
        from_outcome: Option<OutcomeId>,
        to_state: StateId,
        to_outcome: Option<OutcomeId>,
    ) -> Self {
        Self {
            transition_id,
            from_state,
            from_outcome,
            to_state,
            to_outcome,
        }
    }

    /// Returns true if this transition is the start linkage of `container`.
    #[must_use]
    pub fn is_start(&self, container: &StateId) -> bool {
        self.from_state == *container && self.from_outcome.is_none()
    }

    /// Returns true if this transition leaves `container`.
    #[must_use]
    pub fn leaves(&self, container: &StateId) -> bool {
        self.to_state == *container
    }
}

// ============================================================================
// SECTION: Data Flow
// ============================================================================

/// Data flow within a container.
///
/// # Invariants
/// - Keys name a port or scoped variable of the endpoint state.
/// - `(to_state, to_key)` is unique across the container; an input can only
///   be driven once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlow {
    /// Data flow identifier, unique within the owning container.
    pub data_flow_id: DataFlowId,
    /// Source state; the container id for parent-side endpoints.
    pub from_state: StateId,
    /// Source port or scoped-variable identifier.
    pub from_key: PortId,
    /// Target state; the container id for parent-side endpoints.
    pub to_state: StateId,
    /// Target port or scoped-variable identifier.
    pub to_key: PortId,
}

impl DataFlow {
    /// Creates a new data flow.
    #[must_use]
    pub const fn new(
        data_flow_id: DataFlowId,
        from_state: StateId,
        from_key: PortId,
        to_state: StateId,
        to_key: PortId,
    ) -> Self {
        Self {
            data_flow_id,
            from_state,
            from_key,
            to_state,
            to_key,
        }
    }
}
