// stateflow-core/src/core/mod.rs
// ============================================================================
// Module: Stateflow Core Model
// Description: State tree data model, identifiers, values, and observers.
// Purpose: Group the model types and re-export the public surface.
// Dependencies: crate::core::*
// ============================================================================

//! ## Overview
//! The core model owns the state tree: identifiers, values, ports, outcomes,
//! linkage, states, machines, validation, paths, time, and observation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod linkage;
pub mod machine;
pub mod observer;
pub mod outcomes;
pub mod path;
pub mod ports;
pub mod state;
pub mod time;
pub mod validate;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::DataFlowId;
pub use identifiers::HistoryItemId;
pub use identifiers::MachineId;
pub use identifiers::OutcomeId;
pub use identifiers::PortId;
pub use identifiers::RunId;
pub use identifiers::STATE_ID_LENGTH;
pub use identifiers::StateId;
pub use identifiers::TransitionId;
pub use identifiers::UNIQUE_DECIDER_STATE_ID;
pub use identifiers::next_numeric_id;
pub use identifiers::next_outcome_id;
pub use linkage::DataFlow;
pub use linkage::Transition;
pub use machine::StateMachine;
pub use observer::DirtyFlagObserver;
pub use observer::ObserverRegistry;
pub use outcomes::ABORTED_OUTCOME_ID;
pub use outcomes::Outcome;
pub use outcomes::PREEMPTED_OUTCOME_ID;
pub use outcomes::SUCCESS_OUTCOME_ID;
pub use path::StatePath;
pub use ports::DataPort;
pub use ports::PortDirection;
pub use ports::ScopedVariable;
pub use state::ContainerCore;
pub use state::LibraryReference;
pub use state::RelatedLinkage;
pub use state::ScriptSource;
pub use state::State;
pub use state::StateKind;
pub use state::StateVariant;
pub use time::Timestamp;
pub use validate::StructureError;
pub use validate::validate_tree;
pub use value::TypeName;
pub use value::Value;
pub use value::ValueError;
