// stateflow-core/src/core/validate.rs
// ============================================================================
// Module: Stateflow Structural Validation
// Description: Structure errors and whole-tree invariant checks.
// Purpose: Reject mutations and loaded trees that break the invariants.
// Dependencies: crate::core::{identifiers, state, value}, thiserror
// ============================================================================

//! ## Overview
//! Mutations validate locally before committing; this module adds the
//! whole-tree check used after loading a machine from disk and by tests.
//! Every violation maps to a [`StructureError`], the `InvalidStructure`
//! entry of the error taxonomy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::identifiers::DataFlowId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TransitionId;
use crate::core::outcomes::ABORTED_OUTCOME_ID;
use crate::core::outcomes::PREEMPTED_OUTCOME_ID;
use crate::core::outcomes::SUCCESS_OUTCOME_ID;
use crate::core::state::State;
use crate::core::state::StateKind;
use crate::core::value::TypeName;

// ============================================================================
// SECTION: Structure Errors
// ============================================================================

/// Structural invariant violations.
#[derive(Debug, Error)]
pub enum StructureError {
    /// The state is not a container.
    #[error("state {0} is not a container")]
    NotAContainer(StateId),
    /// The state is not an execution state.
    #[error("state {0} is not an execution state")]
    NotAnExecutionState(StateId),
    /// A state id collides with the container or a sibling.
    #[error("state id already in use: {0}")]
    DuplicateStateId(StateId),
    /// A referenced state does not exist.
    #[error("state not found: {0}")]
    StateNotFound(StateId),
    /// A state path does not resolve in the tree.
    #[error("state path not found: {0}")]
    PathNotFound(String),
    /// A port name collides within its direction.
    #[error("port name '{name}' already in use on state {state}")]
    DuplicatePortName {
        /// Owning state.
        state: StateId,
        /// Colliding name.
        name: String,
    },
    /// A referenced port or scoped variable does not exist.
    #[error("port {port} not found on state {state}")]
    PortNotFound {
        /// Owning state.
        state: StateId,
        /// Missing port id.
        port: PortId,
    },
    /// A port is still referenced by a data flow.
    #[error("port {port} on state {state} is referenced by a data flow")]
    PortInUse {
        /// Owning state.
        state: StateId,
        /// Referenced port id.
        port: PortId,
    },
    /// An outcome name collides within the state.
    #[error("outcome name '{name}' already in use on state {state}")]
    DuplicateOutcomeName {
        /// Owning state.
        state: StateId,
        /// Colliding name.
        name: String,
    },
    /// A referenced outcome does not exist.
    #[error("outcome {outcome} not found on state {state}")]
    OutcomeNotFound {
        /// Owning state.
        state: StateId,
        /// Missing outcome id.
        outcome: OutcomeId,
    },
    /// A reserved outcome cannot be removed.
    #[error("outcome {outcome} on state {state} is reserved")]
    ReservedOutcome {
        /// Owning state.
        state: StateId,
        /// Reserved outcome id.
        outcome: OutcomeId,
    },
    /// An outcome is still referenced by a transition.
    #[error("outcome {outcome} on state {state} is referenced by a transition")]
    OutcomeInUse {
        /// Owning state.
        state: StateId,
        /// Referenced outcome id.
        outcome: OutcomeId,
    },
    /// A transition shape is invalid.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// A referenced transition does not exist.
    #[error("transition not found: {0}")]
    TransitionNotFound(TransitionId),
    /// Two transitions share the same origin pair.
    #[error("origin ({state}, {outcome:?}) is already connected")]
    DuplicateTransitionOrigin {
        /// Origin state.
        state: StateId,
        /// Origin outcome.
        outcome: Option<OutcomeId>,
    },
    /// A referenced data flow does not exist.
    #[error("data flow not found: {0}")]
    DataFlowNotFound(DataFlowId),
    /// Two data flows drive the same target.
    #[error("target ({state}, {port}) is already driven")]
    TargetAlreadyDriven {
        /// Target state.
        state: StateId,
        /// Target port id.
        port: PortId,
    },
    /// Source and target declared types are incompatible.
    #[error("data flow types incompatible: {source_type} -> {target}")]
    IncompatibleDataTypes {
        /// Source declared type.
        source_type: TypeName,
        /// Target declared type.
        target: TypeName,
    },
    /// The decider child of a barrier-concurrency state is managed by the
    /// type-change rebuild and cannot be edited directly.
    #[error("decider child of barrier state {0} cannot be edited directly")]
    DeciderImmutable(StateId),
    /// The requested type change is not supported.
    #[error("state {state} cannot change to variant {target:?}")]
    UnsupportedTypeChange {
        /// State being rebuilt.
        state: StateId,
        /// Requested target kind.
        target: StateKind,
    },
    /// A start state id names no child.
    #[error("start state {start} of container {state} does not exist")]
    StartStateMissing {
        /// Owning container.
        state: StateId,
        /// Dangling start state id.
        start: StateId,
    },
    /// A reserved outcome is missing from a state.
    #[error("state {state} is missing reserved outcome {outcome}")]
    MissingReservedOutcome {
        /// Offending state.
        state: StateId,
        /// Missing reserved outcome id.
        outcome: OutcomeId,
    },
    /// A barrier-concurrency state is missing its decider child.
    #[error("barrier state {0} is missing its decider child")]
    MissingDecider(StateId),
    /// The tree cannot be edited while the engine is executing it.
    #[error("state machine is executing; stop the engine before editing")]
    EngineBusy,
}

// ============================================================================
// SECTION: Whole-Tree Validation
// ============================================================================

/// Validates a full subtree against the structural invariants.
///
/// Linkage invariants are re-checked from scratch, so the function also
/// covers trees deserialized from untrusted storage.
///
/// # Errors
///
/// Returns the first [`StructureError`] found.
pub fn validate_tree(state: &State) -> Result<(), StructureError> {
    validate_shared_fields(state)?;
    if state.kind() == StateKind::BarrierConcurrency && state.child(&StateId::decider()).is_none() {
        return Err(StructureError::MissingDecider(state.state_id().clone()));
    }
    if let Some(core) = state.container() {
        if let Some(start) = &core.start_state_id
            && !core.children.contains_key(start)
        {
            return Err(StructureError::StartStateMissing {
                state: state.state_id().clone(),
                start: start.clone(),
            });
        }
        for (key, child) in &core.children {
            if *key != *child.state_id() || *key == *state.state_id() {
                return Err(StructureError::DuplicateStateId(key.clone()));
            }
            validate_tree(child)?;
        }
        validate_linkage(state)?;
    }
    Ok(())
}

/// Validates port name uniqueness and the reserved outcome set.
fn validate_shared_fields(state: &State) -> Result<(), StructureError> {
    for outcome in [SUCCESS_OUTCOME_ID, ABORTED_OUTCOME_ID, PREEMPTED_OUTCOME_ID] {
        if state.outcome(outcome).is_none() {
            return Err(StructureError::MissingReservedOutcome {
                state: state.state_id().clone(),
                outcome,
            });
        }
    }

    let mut names = BTreeSet::new();
    for outcome in state.outcomes() {
        if !names.insert(outcome.name.as_str()) {
            return Err(StructureError::DuplicateOutcomeName {
                state: state.state_id().clone(),
                name: outcome.name.clone(),
            });
        }
    }

    for ports in [state.input_ports(), state.output_ports()] {
        let mut names = BTreeSet::new();
        for port in ports {
            if !names.insert(port.name.as_str()) {
                return Err(StructureError::DuplicatePortName {
                    state: state.state_id().clone(),
                    name: port.name.clone(),
                });
            }
        }
    }

    let mut ids = BTreeSet::new();
    for id in state.used_port_ids() {
        if !ids.insert(id) {
            return Err(StructureError::PortInUse {
                state: state.state_id().clone(),
                port: id,
            });
        }
    }
    Ok(())
}

/// Re-validates every transition and data flow of a container.
fn validate_linkage(state: &State) -> Result<(), StructureError> {
    let own_id = state.state_id();

    let mut origins = BTreeSet::new();
    for transition in state.transitions() {
        if transition.from_state == *own_id {
            if transition.from_outcome.is_some() {
                return Err(StructureError::InvalidTransition(
                    "container-origin transitions carry no origin outcome".to_string(),
                ));
            }
        } else {
            let origin = state
                .child(&transition.from_state)
                .ok_or_else(|| StructureError::StateNotFound(transition.from_state.clone()))?;
            let outcome = transition.from_outcome.ok_or_else(|| {
                StructureError::InvalidTransition(
                    "sibling-origin transitions require an origin outcome".to_string(),
                )
            })?;
            if origin.outcome(outcome).is_none() {
                return Err(StructureError::OutcomeNotFound {
                    state: transition.from_state.clone(),
                    outcome,
                });
            }
        }
        if transition.to_state == *own_id {
            let outcome = transition.to_outcome.ok_or_else(|| {
                StructureError::InvalidTransition(
                    "container-target transitions require a target outcome".to_string(),
                )
            })?;
            if state.outcome(outcome).is_none() {
                return Err(StructureError::OutcomeNotFound {
                    state: own_id.clone(),
                    outcome,
                });
            }
        } else if state.child(&transition.to_state).is_none() {
            return Err(StructureError::StateNotFound(transition.to_state.clone()));
        }
        if !origins.insert((transition.from_state.clone(), transition.from_outcome)) {
            return Err(StructureError::DuplicateTransitionOrigin {
                state: transition.from_state.clone(),
                outcome: transition.from_outcome,
            });
        }
    }

    let mut targets = BTreeSet::new();
    for flow in state.data_flows() {
        let source_resolves = if flow.from_state == *own_id {
            state.input_port(flow.from_key).is_some()
                || state.scoped_variable(flow.from_key).is_some()
        } else {
            state
                .child(&flow.from_state)
                .is_some_and(|child| child.output_port(flow.from_key).is_some())
        };
        if !source_resolves {
            return Err(StructureError::PortNotFound {
                state: flow.from_state.clone(),
                port: flow.from_key,
            });
        }
        let target_resolves = if flow.to_state == *own_id {
            state.output_port(flow.to_key).is_some()
                || state.scoped_variable(flow.to_key).is_some()
        } else {
            state
                .child(&flow.to_state)
                .is_some_and(|child| child.input_port(flow.to_key).is_some())
        };
        if !target_resolves {
            return Err(StructureError::PortNotFound {
                state: flow.to_state.clone(),
                port: flow.to_key,
            });
        }
        if !targets.insert((flow.to_state.clone(), flow.to_key)) {
            return Err(StructureError::TargetAlreadyDriven {
                state: flow.to_state.clone(),
                port: flow.to_key,
            });
        }
    }
    Ok(())
}
