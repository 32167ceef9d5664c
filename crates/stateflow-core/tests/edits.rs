// crates/stateflow-core/tests/edits.rs
// ============================================================================
// Module: Structural Edit Tests
// Description: Tests for clipboard, selection, group/ungroup, substitute.
// ============================================================================
//! ## Overview
//! Validates copy/paste isomorphism with id remapping, smart selection
//! extension, cut removal, group/ungroup round trips, and substitution with
//! by-name linkage matching.

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

use stateflow_core::Clipboard;
use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::Selection;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateKind;
use stateflow_core::StateMachine;
use stateflow_core::TypeName;
use stateflow_core::Value;
use stateflow_core::edit::SelectedElement;
use stateflow_core::group_selection;
use stateflow_core::substitute_state;
use stateflow_core::ungroup_state;
use stateflow_core::validate_tree;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

/// Builds a root hierarchy with a linked subgraph `x -> y` and a feeder `z`.
fn linked_machine() -> StateMachine {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut x = State::new_execution(StateId::new("XXXXXX"), "x");
    let out_x = x.add_output_port("out", TypeName::Int, Value::Int(0)).unwrap();
    let mut y = State::new_execution(StateId::new("YYYYYY"), "y");
    let in_y = y.add_input_port("in", TypeName::Int, Value::Int(0)).unwrap();
    let z = State::new_execution(StateId::new("ZZZZZZ"), "z");
    root.add_child_state(x).unwrap();
    root.add_child_state(y).unwrap();
    root.add_child_state(z).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("XXXXXX"), None).unwrap();
    root.add_transition(
        StateId::new("XXXXXX"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("YYYYYY"),
        None,
    )
    .unwrap();
    root.add_transition(
        StateId::new("YYYYYY"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("ZZZZZZ"),
        None,
    )
    .unwrap();
    root.add_data_flow(StateId::new("XXXXXX"), out_x, StateId::new("YYYYYY"), in_y).unwrap();
    StateMachine::new(root)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests smart extension: enclosed linkage joins, half-covered is dropped.
#[test]
fn smart_extension_closes_the_selection() {
    let machine = linked_machine();
    let root = machine.root_path();
    let mut selection = Selection::new();
    selection.add(SelectedElement::State(root.join(StateId::new("XXXXXX"))));
    selection.add(SelectedElement::State(root.join(StateId::new("YYYYYY"))));
    // A transition leaving the pair is selected but only half covered.
    let leaving = machine
        .root()
        .transitions()
        .iter()
        .find(|transition| transition.to_state == StateId::new("ZZZZZZ"))
        .unwrap()
        .transition_id;
    selection.add(SelectedElement::Transition(root.clone(), leaving));

    let parent = selection.reduce_to_one_parent().unwrap();
    selection.smart_extension(&machine, &parent);

    let transitions = selection.of_kind(stateflow_core::SelectionKind::Transitions);
    assert_eq!(transitions.len(), 1);
    let data_flows = selection.of_kind(stateflow_core::SelectionKind::DataFlows);
    assert_eq!(data_flows.len(), 1);
}

/// Tests copy/paste into the same parent with fresh ids (scenario: a state
/// pasted next to its original).
#[test]
fn paste_into_same_parent_renames_and_rewires() {
    let mut machine = linked_machine();
    let root = machine.root_path();
    let mut selection = Selection::new();
    selection.add(SelectedElement::State(root.join(StateId::new("XXXXXX"))));
    selection.add(SelectedElement::State(root.join(StateId::new("YYYYYY"))));

    let mut clipboard = Clipboard::new();
    clipboard.copy(&machine, &mut selection, true).unwrap();
    let report = clipboard.paste(&mut machine, &root, None, false).unwrap();

    assert_eq!(report.pasted_states.len(), 2);
    assert_eq!(report.pasted_transitions.len(), 1);
    assert_eq!(report.pasted_data_flows.len(), 1);
    assert_eq!(report.dropped, 0);

    // Fresh ids, originals untouched.
    for id in &report.pasted_states {
        assert_ne!(*id, StateId::new("XXXXXX"));
        assert_ne!(*id, StateId::new("YYYYYY"));
    }
    assert!(machine.root().child(&StateId::new("XXXXXX")).is_some());
    assert_eq!(machine.root().children().count(), 5);

    // The pasted linkage references only pasted states.
    let pasted_transition = machine
        .root()
        .transitions()
        .iter()
        .find(|transition| transition.transition_id == report.pasted_transitions[0])
        .unwrap();
    assert!(report.pasted_states.contains(&pasted_transition.from_state));
    assert!(report.pasted_states.contains(&pasted_transition.to_state));
    let pasted_flow = machine
        .root()
        .data_flows()
        .iter()
        .find(|flow| flow.data_flow_id == report.pasted_data_flows[0])
        .unwrap();
    assert!(report.pasted_states.contains(&pasted_flow.from_state));
    assert!(report.pasted_states.contains(&pasted_flow.to_state));
    validate_tree(machine.root()).unwrap();

    // Paste does not consume the clipboard.
    let again = clipboard.paste(&mut machine, &root, None, false).unwrap();
    assert_eq!(again.pasted_states.len(), 2);
    validate_tree(machine.root()).unwrap();
}

/// Tests that cut removes the copied elements from the machine.
#[test]
fn cut_removes_the_selection() {
    let mut machine = linked_machine();
    let root = machine.root_path();
    let mut selection = Selection::new();
    selection.add(SelectedElement::State(root.join(StateId::new("ZZZZZZ"))));

    let mut clipboard = Clipboard::new();
    clipboard.cut(&mut machine, &mut selection, true).unwrap();
    assert!(machine.root().child(&StateId::new("ZZZZZZ")).is_none());
    validate_tree(machine.root()).unwrap();

    let report = clipboard.paste(&mut machine, &root, None, false).unwrap();
    assert_eq!(report.pasted_states.len(), 1);
    validate_tree(machine.root()).unwrap();
}

/// Tests grouping and ungrouping as a structural round trip.
#[test]
fn group_then_ungroup_restores_the_structure() {
    let mut machine = linked_machine();
    let root = machine.root_path();

    let count_before = machine.root().children().count();
    let transitions_before = machine.root().transitions().len();
    let flows_before = machine.root().data_flows().len();

    let mut selection = Selection::new();
    selection.add(SelectedElement::State(root.join(StateId::new("XXXXXX"))));
    selection.add(SelectedElement::State(root.join(StateId::new("YYYYYY"))));
    let group_id = group_selection(&mut machine, &mut selection).unwrap();

    // The group swallowed two children and the enclosed linkage; the
    // boundary linkage was split at the group surface.
    let group_path = root.join(group_id.clone());
    let group = machine.state_at(&group_path).unwrap();
    assert_eq!(group.kind(), StateKind::Hierarchy);
    assert_eq!(group.children().count(), 2);
    assert_eq!(group.transitions().len(), 2);
    assert_eq!(group.data_flows().len(), 1);
    assert_eq!(group.start_state_id(), Some(&StateId::new("XXXXXX")));
    assert_eq!(machine.root().children().count(), count_before - 1);
    assert_eq!(machine.root().start_state_id(), Some(&group_id));
    validate_tree(machine.root()).unwrap();

    let moved = ungroup_state(&mut machine, &group_path).unwrap();
    assert_eq!(moved.len(), 2);
    assert_eq!(machine.root().children().count(), count_before);
    assert_eq!(machine.root().transitions().len(), transitions_before);
    assert_eq!(machine.root().data_flows().len(), flows_before);
    assert_eq!(machine.root().start_state_id(), Some(&StateId::new("XXXXXX")));
    validate_tree(machine.root()).unwrap();
}

/// Tests substitution with by-name matching and kept name.
#[test]
fn substitute_preserves_linkage_by_name() {
    let mut machine = linked_machine();
    let root = machine.root_path();
    let y_path = root.join(StateId::new("YYYYYY"));

    let mut replacement = State::new_execution(StateId::new("NEWNEW"), "fresh");
    replacement.add_input_port("in", TypeName::Int, Value::Int(0)).unwrap();
    let id = substitute_state(&mut machine, &y_path, replacement, false, true, None).unwrap();

    // Same sibling slot, old name kept, linkage rewired by name.
    assert_eq!(id, StateId::new("YYYYYY"));
    let substituted = machine.root().child(&id).unwrap();
    assert_eq!(substituted.name(), "y");
    assert!(machine
        .root()
        .transitions()
        .iter()
        .any(|transition| transition.to_state == id && transition.from_state == StateId::new("XXXXXX")));
    assert!(machine.root().data_flows().iter().any(|flow| flow.to_state == id));
    validate_tree(machine.root()).unwrap();
}

/// Tests that linkage without a matching port is dropped on substitution.
#[test]
fn substitute_drops_unmatched_linkage() {
    let mut machine = linked_machine();
    let root = machine.root_path();
    let y_path = root.join(StateId::new("YYYYYY"));

    // No input port at all: the feeding data flow has nowhere to land.
    let replacement = State::new_execution(StateId::new("NEWNEW"), "fresh");
    substitute_state(&mut machine, &y_path, replacement, false, false, None).unwrap();
    assert!(machine.root().data_flows().is_empty());
    validate_tree(machine.root()).unwrap();
}
