// crates/stateflow-core/tests/structure.rs
// ============================================================================
// Module: Structure Tests
// Description: Tests for structural mutation, validation, and type changes.
// ============================================================================
//! ## Overview
//! Validates that mutations enforce the structural invariants, that failed
//! mutations leave the tree unchanged, and that type changes preserve
//! container content.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateKind;
use stateflow_core::StateMachine;
use stateflow_core::StructureError;
use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::TypeName;
use stateflow_core::UNIQUE_DECIDER_STATE_ID;
use stateflow_core::Value;
use stateflow_core::validate_tree;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn two_state_machine() -> StateMachine {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    root.add_child_state(State::new_execution(StateId::new("AAAAAA"), "a")).unwrap();
    root.add_child_state(State::new_execution(StateId::new("BBBBBB"), "b")).unwrap();
    root.set_start_state(Some(StateId::new("AAAAAA"))).unwrap();
    StateMachine::new(root)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests that duplicate transition origins are rejected.
#[test]
fn duplicate_transition_origin_is_rejected() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    machine
        .add_transition(
            &root,
            StateId::new("AAAAAA"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("BBBBBB"),
            None,
        )
        .unwrap();
    let err = machine
        .add_transition(
            &root,
            StateId::new("AAAAAA"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("BBBBBB"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StructureError::DuplicateTransitionOrigin { .. }));
    assert_eq!(machine.root().transitions().len(), 1);
    validate_tree(machine.root()).unwrap();
}

/// Tests that an input can only be driven once.
#[test]
fn double_driven_input_is_rejected() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let b = root.join(StateId::new("BBBBBB"));
    let out_a = machine.add_output_port(&a, "out", TypeName::Int, Value::Int(0)).unwrap();
    let in_b = machine.add_input_port(&b, "in", TypeName::Int, Value::Int(0)).unwrap();
    let sv = machine.add_scoped_variable(&root, "cell", TypeName::Int, Value::Int(0)).unwrap();

    machine
        .add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("BBBBBB"), in_b)
        .unwrap();
    let err = machine
        .add_data_flow(&root, StateId::new("ROOT"), sv, StateId::new("BBBBBB"), in_b)
        .unwrap_err();
    assert!(matches!(err, StructureError::TargetAlreadyDriven { .. }));
    assert_eq!(machine.root().data_flows().len(), 1);
}

/// Tests that incompatible declared types are rejected.
#[test]
fn incompatible_flow_types_are_rejected() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let b = root.join(StateId::new("BBBBBB"));
    let out_a = machine.add_output_port(&a, "out", TypeName::Str, Value::Str(String::new())).unwrap();
    let in_b = machine.add_input_port(&b, "in", TypeName::Int, Value::Int(0)).unwrap();
    let err = machine
        .add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("BBBBBB"), in_b)
        .unwrap_err();
    assert!(matches!(err, StructureError::IncompatibleDataTypes { .. }));

    // Int widens into float.
    let widened = machine.add_output_port(&a, "count", TypeName::Int, Value::Int(0)).unwrap();
    let sink = machine.add_input_port(&b, "ratio", TypeName::Float, Value::Float(0.0)).unwrap();
    machine
        .add_data_flow(&root, StateId::new("AAAAAA"), widened, StateId::new("BBBBBB"), sink)
        .unwrap();
}

/// Tests that re-keying a child repairs every reference.
#[test]
fn change_state_id_repairs_linkage() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let b = root.join(StateId::new("BBBBBB"));
    let out_a = machine.add_output_port(&a, "out", TypeName::Int, Value::Int(0)).unwrap();
    let in_b = machine.add_input_port(&b, "in", TypeName::Int, Value::Int(0)).unwrap();
    machine
        .add_transition(
            &root,
            StateId::new("AAAAAA"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("BBBBBB"),
            None,
        )
        .unwrap();
    machine
        .add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("BBBBBB"), in_b)
        .unwrap();
    machine.set_start_state(&root, Some(StateId::new("AAAAAA"))).unwrap();

    machine.change_state_id(&root, &StateId::new("AAAAAA"), StateId::new("CCCCCC")).unwrap();

    let transition = &machine.root().transitions()[0];
    assert_eq!(transition.from_state, StateId::new("CCCCCC"));
    let flow = &machine.root().data_flows()[0];
    assert_eq!(flow.from_state, StateId::new("CCCCCC"));
    assert_eq!(machine.root().start_state_id(), Some(&StateId::new("CCCCCC")));
    validate_tree(machine.root()).unwrap();
}

/// Tests that a start transition sets the start state and removal clears it.
#[test]
fn start_linkage_tracks_transitions() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    machine.set_start_state(&root, None).unwrap();
    let transition = machine
        .add_transition(&root, StateId::new("ROOT"), None, StateId::new("AAAAAA"), None)
        .unwrap();
    assert_eq!(machine.root().start_state_id(), Some(&StateId::new("AAAAAA")));
    machine.remove_transition(&root, transition).unwrap();
    assert_eq!(machine.root().start_state_id(), None);
}

/// Tests type change preserves linkage and creates the decider.
#[test]
fn type_change_to_barrier_preserves_content() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let b = root.join(StateId::new("BBBBBB"));
    let out_a = machine.add_output_port(&a, "out", TypeName::Int, Value::Int(0)).unwrap();
    let in_b = machine.add_input_port(&b, "in", TypeName::Int, Value::Int(0)).unwrap();
    machine
        .add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("BBBBBB"), in_b)
        .unwrap();
    machine.add_scoped_variable(&root, "cell", TypeName::Int, Value::Int(1)).unwrap();

    machine.change_state_type(&root, StateKind::BarrierConcurrency).unwrap();

    let root_state = machine.root();
    assert_eq!(root_state.kind(), StateKind::BarrierConcurrency);
    assert!(root_state.child(&StateId::new(UNIQUE_DECIDER_STATE_ID)).is_some());
    assert!(root_state.child(&StateId::new("AAAAAA")).is_some());
    assert!(root_state.child(&StateId::new("BBBBBB")).is_some());
    assert_eq!(root_state.data_flows().len(), 1);
    assert_eq!(root_state.scoped_variables().len(), 1);
    validate_tree(root_state).unwrap();

    // Changing back drops the decider again.
    machine.change_state_type(&root, StateKind::Hierarchy).unwrap();
    assert!(machine.root().child(&StateId::new(UNIQUE_DECIDER_STATE_ID)).is_none());
    validate_tree(machine.root()).unwrap();
}

/// Tests that removing a state cascades its linkage.
#[test]
fn remove_state_cascades_linkage() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    machine
        .add_transition(
            &root,
            StateId::new("AAAAAA"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("BBBBBB"),
            None,
        )
        .unwrap();
    machine.remove_state(&root, &StateId::new("BBBBBB")).unwrap();
    assert!(machine.root().transitions().is_empty());
    assert!(machine.root().child(&StateId::new("BBBBBB")).is_none());
    validate_tree(machine.root()).unwrap();
}

/// Tests that the decider child resists direct edits.
#[test]
fn decider_child_is_immutable() {
    let mut root = State::new_barrier(StateId::new("ROOT"), "root");
    let err = root.remove_child_state(&StateId::decider()).unwrap_err();
    assert!(matches!(err, StructureError::DeciderImmutable(_)));
}

/// Tests that failed mutations notify observers with the error.
#[test]
fn failed_mutation_leaves_tree_unchanged() {
    let mut machine = two_state_machine();
    let root = machine.root_path();
    let before = machine.root().clone();
    let err = machine
        .add_transition(
            &root,
            StateId::new("MISSIN"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("BBBBBB"),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StructureError::StateNotFound(_)));
    assert_eq!(*machine.root(), before);
}

/// Tests the dirty flag lifecycle over mutations.
#[test]
fn dirty_flag_tracks_mutations() {
    let mut machine = two_state_machine();
    machine.clear_dirty();
    assert!(!machine.is_dirty());
    let root = machine.root_path();
    machine.rename_state(&root, "renamed").unwrap();
    assert!(machine.is_dirty());
}
