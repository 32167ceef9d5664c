// crates/stateflow-core/tests/execution.rs
// ============================================================================
// Module: Execution Tests
// Description: Tests for hierarchy execution, outcomes, and data routing.
// ============================================================================
//! ## Overview
//! Validates the hierarchy driver: boundary item order, unhandled outcomes,
//! data-flow routing, fault reification, and run determinism under a logical
//! clock.

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

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use stateflow_core::ABORTED_OUTCOME_ID;
use stateflow_core::ExecutionEngine;
use stateflow_core::LogicalClock;
use stateflow_core::OutcomeId;
use stateflow_core::RoutineScriptHost;
use stateflow_core::ScriptError;
use stateflow_core::ScriptResult;
use stateflow_core::ScriptSource;
use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::TypeName;
use stateflow_core::Value;
use stateflow_core::runtime::CallType;
use stateflow_core::runtime::HistoryItem;
use stateflow_core::runtime::HistoryItemKind;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn sequence_machine() -> StateMachine {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("emit")).unwrap();
    let mut b = State::new_execution(StateId::new("BBBBBB"), "b");
    b.set_script(ScriptSource::new("echo")).unwrap();
    root.add_child_state(a).unwrap();
    root.add_child_state(b).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    root.add_transition(
        StateId::new("AAAAAA"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("BBBBBB"),
        None,
    )
    .unwrap();
    root.add_transition(
        StateId::new("BBBBBB"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("ROOT"),
        Some(SUCCESS_OUTCOME_ID),
    )
    .unwrap();
    StateMachine::new(root)
}

fn host_with_defaults() -> RoutineScriptHost {
    RoutineScriptHost::new()
        .with_routine("emit", |_ctx| {
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: BTreeMap::new(),
            })
        })
        .with_routine("echo", |ctx| {
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: ctx.inputs.clone(),
            })
        })
}

fn boundary_trace(items: &[HistoryItem]) -> Vec<(HistoryItemKind, Option<CallType>, String)> {
    items.iter().map(|item| (item.kind, item.call_type, item.state_name.clone())).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests the trivial two-state sequence and its boundary item order.
#[test]
fn trivial_sequence_produces_ordered_history() {
    let engine = ExecutionEngine::new(Arc::new(host_with_defaults()))
        .with_clock(Arc::new(LogicalClock::new()));
    let machine = Arc::new(RwLock::new(sequence_machine()));
    let report = engine.run_to_completion(machine).unwrap();

    assert_eq!(report.outcome.outcome_id, SUCCESS_OUTCOME_ID);
    let items = report.history.items();
    let trace = boundary_trace(&items);
    let expected = [
        (HistoryItemKind::StateMachineStart, Some(CallType::Execute), "root".to_string()),
        (HistoryItemKind::Call, Some(CallType::Container), "root".to_string()),
        (HistoryItemKind::Call, Some(CallType::Execute), "root".to_string()),
        (HistoryItemKind::Call, Some(CallType::Container), "a".to_string()),
        (HistoryItemKind::Call, Some(CallType::Execute), "a".to_string()),
        (HistoryItemKind::Return, Some(CallType::Execute), "a".to_string()),
        (HistoryItemKind::Return, Some(CallType::Container), "a".to_string()),
        (HistoryItemKind::Call, Some(CallType::Container), "b".to_string()),
        (HistoryItemKind::Call, Some(CallType::Execute), "b".to_string()),
        (HistoryItemKind::Return, Some(CallType::Execute), "b".to_string()),
        (HistoryItemKind::Return, Some(CallType::Container), "b".to_string()),
        (HistoryItemKind::Return, Some(CallType::Execute), "root".to_string()),
        (HistoryItemKind::Return, Some(CallType::Container), "root".to_string()),
    ];
    assert_eq!(trace, expected);

    // Every call item pairs with a return item of the same run.
    for item in &items {
        if item.kind == HistoryItemKind::Call {
            assert!(items.iter().any(|other| {
                other.kind == HistoryItemKind::Return
                    && other.run_id == item.run_id
                    && other.call_type == item.call_type
            }));
        }
    }
}

/// Tests that an unhandled outcome aborts the container.
#[test]
fn unhandled_outcome_aborts_container() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.add_outcome("sidetrack").unwrap();
    a.set_script(ScriptSource::new("sidetrack")).unwrap();
    let sidetrack = a.outcome_by_name("sidetrack").unwrap().outcome_id;
    root.add_child_state(a).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    let machine = StateMachine::new(root);

    let host = RoutineScriptHost::new().with_routine("sidetrack", move |_ctx| {
        Ok(ScriptResult {
            outcome: sidetrack,
            outputs: BTreeMap::new(),
        })
    });
    let engine = ExecutionEngine::new(Arc::new(host));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();
    assert_eq!(report.outcome.outcome_id, ABORTED_OUTCOME_ID);
}

/// Tests data-flow routing between siblings.
#[test]
fn data_flow_routes_sibling_output_to_input() {
    let mut machine = sequence_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let b = root.join(StateId::new("BBBBBB"));
    let out_a = machine.add_output_port(&a, "answer", TypeName::Int, Value::Int(0)).unwrap();
    let in_b = machine.add_input_port(&b, "answer", TypeName::Int, Value::Int(-1)).unwrap();
    machine
        .add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("BBBBBB"), in_b)
        .unwrap();

    let host = RoutineScriptHost::new()
        .with_routine("emit", |_ctx| {
            let mut outputs = BTreeMap::new();
            outputs.insert("answer".to_string(), Value::Int(42));
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs,
            })
        })
        .with_routine("echo", |ctx| {
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: ctx.inputs.clone(),
            })
        });
    let engine = ExecutionEngine::new(Arc::new(host)).with_clock(Arc::new(LogicalClock::new()));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();

    // The call boundary of `b` carries the routed value.
    let items = report.history.items();
    let call_b = items
        .iter()
        .find(|item| {
            item.state_name == "b"
                && item.kind == HistoryItemKind::Call
                && item.call_type == Some(CallType::Execute)
        })
        .unwrap();
    let routed = call_b
        .input_output_data
        .get("answer")
        .and_then(|entry| entry.get("value"))
        .and_then(serde_json::Value::as_i64);
    assert_eq!(routed, Some(42));
}

/// Tests that scoped variables capture child outputs and feed the parent.
#[test]
fn scoped_variable_receives_child_output() {
    let mut machine = sequence_machine();
    let root = machine.root_path();
    let a = root.join(StateId::new("AAAAAA"));
    let out_a = machine.add_output_port(&a, "answer", TypeName::Int, Value::Int(0)).unwrap();
    let cell = machine.add_scoped_variable(&root, "cell", TypeName::Int, Value::Int(0)).unwrap();
    let root_out = machine.add_output_port(&root, "total", TypeName::Int, Value::Int(0)).unwrap();
    machine.add_data_flow(&root, StateId::new("AAAAAA"), out_a, StateId::new("ROOT"), cell).unwrap();
    machine.add_data_flow(&root, StateId::new("ROOT"), cell, StateId::new("ROOT"), root_out).unwrap();

    let host = RoutineScriptHost::new()
        .with_routine("emit", |_ctx| {
            let mut outputs = BTreeMap::new();
            outputs.insert("answer".to_string(), Value::Int(7));
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs,
            })
        })
        .with_routine("echo", |ctx| {
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: ctx.inputs.clone(),
            })
        });
    let engine = ExecutionEngine::new(Arc::new(host));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();
    assert_eq!(report.outputs.get("total"), Some(&Value::Int(7)));
}

/// Tests that script faults reify as `aborted` with an error output.
#[test]
fn script_fault_reifies_as_aborted() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("blow-up")).unwrap();
    root.add_child_state(a).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    let machine = StateMachine::new(root);

    let host = RoutineScriptHost::new().with_routine("blow-up", |_ctx| {
        Err(ScriptError::Fault {
            error_type: "ValueError".to_string(),
            error_message: "boom".to_string(),
        })
    });
    let engine = ExecutionEngine::new(Arc::new(host)).with_clock(Arc::new(LogicalClock::new()));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();

    assert_eq!(report.outcome.outcome_id, ABORTED_OUTCOME_ID);
    let items = report.history.items();
    let return_a = items
        .iter()
        .find(|item| item.state_name == "a" && item.kind == HistoryItemKind::Return)
        .unwrap();
    let error_type = return_a
        .input_output_data
        .get("error")
        .and_then(|entry| entry.get("value"))
        .and_then(|value| value.get("error_type"))
        .and_then(|value| value.get("value"))
        .and_then(serde_json::Value::as_str);
    assert_eq!(error_type, Some("ValueError"));
}

/// Tests that a script selecting an unknown outcome aborts the state.
#[test]
fn unknown_script_outcome_aborts_state() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("wild")).unwrap();
    root.add_child_state(a).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    let machine = StateMachine::new(root);

    let host = RoutineScriptHost::new().with_routine("wild", |_ctx| {
        Ok(ScriptResult {
            outcome: OutcomeId::from_raw(99),
            outputs: BTreeMap::new(),
        })
    });
    let engine = ExecutionEngine::new(Arc::new(host));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();
    assert_eq!(report.outcome.outcome_id, ABORTED_OUTCOME_ID);
}

/// Tests that identical runs produce identical boundary traces.
#[test]
fn hierarchy_runs_are_deterministic() {
    let run = || {
        let engine = ExecutionEngine::new(Arc::new(host_with_defaults()))
            .with_clock(Arc::new(LogicalClock::new()));
        let report = engine.run_to_completion(Arc::new(RwLock::new(sequence_machine()))).unwrap();
        report
            .history
            .items()
            .iter()
            .map(|item| (item.kind, item.call_type, item.path.to_string(), item.outcome_id))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}
