// crates/stateflow-core/tests/proptest_structure.rs
// ============================================================================
// Module: Structure Property-Based Tests
// Description: Property tests for structural invariants under mutation.
// ============================================================================
//! Property-based tests: arbitrary accepted mutation sequences keep the
//! tree valid, and the paste law yields isomorphic subtrees.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use stateflow_core::Clipboard;
use stateflow_core::Selection;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::TypeName;
use stateflow_core::Value;
use stateflow_core::edit::SelectedElement;
use stateflow_core::validate_tree;

// ============================================================================
// SECTION: Strategies
// ============================================================================

/// One structural mutation step over a flat hierarchy of `n` children.
#[derive(Debug, Clone)]
enum Step {
    /// Connect `success` of one child to another child.
    Wire(usize, usize),
    /// Add an output port to one child.
    OutPort(usize, String),
    /// Add an input port to one child.
    InPort(usize, String),
    /// Connect an existing output to an existing input.
    Flow(usize, usize),
    /// Remove one child.
    Drop(usize),
}

fn step_strategy(children: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0 .. children, 0 .. children).prop_map(|(a, b)| Step::Wire(a, b)),
        (0 .. children, "[a-z]{1,6}").prop_map(|(a, name)| Step::OutPort(a, name)),
        (0 .. children, "[a-z]{1,6}").prop_map(|(a, name)| Step::InPort(a, name)),
        (0 .. children, 0 .. children).prop_map(|(a, b)| Step::Flow(a, b)),
        (0 .. children).prop_map(Step::Drop),
    ]
}

fn child_id(index: usize) -> StateId {
    StateId::new(format!("CHLD{index:02}"))
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Accepted mutation sequences never leave the tree invalid.
    #[test]
    fn accepted_mutations_keep_the_tree_valid(
        steps in prop::collection::vec(step_strategy(6), 0 .. 40)
    ) {
        let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
        for index in 0 .. 6 {
            root.add_child_state(State::new_execution(child_id(index), format!("c{index}")))
                .unwrap();
        }
        let mut machine = StateMachine::new(root);
        let root_path = machine.root_path();

        for step in steps {
            // Rejected mutations are fine; accepted ones must stay valid.
            match step {
                Step::Wire(a, b) => {
                    let _ = machine.add_transition(
                        &root_path,
                        child_id(a),
                        Some(stateflow_core::SUCCESS_OUTCOME_ID),
                        child_id(b),
                        None,
                    );
                }
                Step::OutPort(a, name) => {
                    let _ = machine.add_output_port(
                        &root_path.join(child_id(a)),
                        name,
                        TypeName::Int,
                        Value::Int(0),
                    );
                }
                Step::InPort(a, name) => {
                    let _ = machine.add_input_port(
                        &root_path.join(child_id(a)),
                        name,
                        TypeName::Int,
                        Value::Int(0),
                    );
                }
                Step::Flow(a, b) => {
                    let from = machine
                        .state_at(&root_path.join(child_id(a)))
                        .and_then(|state| state.output_ports().first().map(|port| port.data_port_id));
                    let to = machine
                        .state_at(&root_path.join(child_id(b)))
                        .and_then(|state| state.input_ports().first().map(|port| port.data_port_id));
                    if let (Some(from_key), Some(to_key)) = (from, to) {
                        let _ = machine.add_data_flow(
                            &root_path,
                            child_id(a),
                            from_key,
                            child_id(b),
                            to_key,
                        );
                    }
                }
                Step::Drop(a) => {
                    let _ = machine.remove_state(&root_path, &child_id(a));
                }
            }
            prop_assert!(validate_tree(machine.root()).is_ok());
        }
    }

    /// Pasting a copied subtree into a fresh target yields an isomorphic
    /// subtree up to id renaming.
    #[test]
    fn paste_into_fresh_target_is_isomorphic(extra_ports in 0_usize .. 4) {
        let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
        let mut subject = State::new_hierarchy(StateId::new("SUBJCT"), "subject");
        let mut leaf = State::new_execution(StateId::new("LEAFST"), "leaf");
        for index in 0 .. extra_ports {
            leaf.add_output_port(format!("p{index}"), TypeName::Int, Value::Int(0)).unwrap();
        }
        subject.add_child_state(leaf).unwrap();
        subject
            .add_transition(StateId::new("SUBJCT"), None, StateId::new("LEAFST"), None)
            .unwrap();
        root.add_child_state(subject).unwrap();
        root.add_child_state(State::new_hierarchy(StateId::new("TARGET"), "target")).unwrap();
        let mut machine = StateMachine::new(root);
        let root_path = machine.root_path();

        let mut selection = Selection::new();
        selection.add(SelectedElement::State(root_path.join(StateId::new("SUBJCT"))));
        let mut clipboard = Clipboard::new();
        clipboard.copy(&machine, &mut selection, true).unwrap();

        let target_path = root_path.join(StateId::new("TARGET"));
        let report = clipboard.paste(&mut machine, &target_path, None, false).unwrap();
        prop_assert_eq!(report.pasted_states.len(), 1);
        prop_assert_eq!(report.dropped, 0);

        let pasted_id = report.pasted_states[0].clone();
        let pasted = machine.state_at(&target_path.join(pasted_id)).unwrap();
        let original = machine.state_at(&root_path.join(StateId::new("SUBJCT"))).unwrap();
        prop_assert_eq!(pasted.children().count(), original.children().count());
        prop_assert_eq!(pasted.transitions().len(), original.transitions().len());
        let pasted_leaf = pasted.child(&StateId::new("LEAFST")).unwrap();
        prop_assert_eq!(pasted_leaf.output_ports().len(), extra_ports);
        prop_assert!(validate_tree(machine.root()).is_ok());
    }
}
