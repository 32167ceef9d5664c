// crates/stateflow-core/tests/history_log.rs
// ============================================================================
// Module: History Log Tests
// Description: Tests for persisted records and the collapse derivations.
// ============================================================================
//! ## Overview
//! Validates the keyed record shape, the raw link reconstruction, the
//! collapse into per-state records with their relations, and the string
//! fallback for unserialisable payloads.

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

use stateflow_core::ExecutionEngine;
use stateflow_core::InMemoryHistoryStore;
use stateflow_core::LogicalClock;
use stateflow_core::RoutineScriptHost;
use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::ScriptResult;
use stateflow_core::ScriptSource;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::TypeName;
use stateflow_core::Value;
use stateflow_core::runtime::HistoryItemKind;
use stateflow_core::runtime::StateType;
use stateflow_core::runtime::collapsed_structure;
use stateflow_core::runtime::parse_records;
use stateflow_core::runtime::raw_structure;
use stateflow_core::runtime::render_payload;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn run_sequence_machine() -> InMemoryHistoryStore {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("emit")).unwrap();
    let b = State::new_execution(StateId::new("BBBBBB"), "b");
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
    let mut machine = StateMachine::new(root);
    let root_path = machine.root_path();
    let a_path = root_path.join(StateId::new("AAAAAA"));
    let out_a = machine.add_output_port(&a_path, "answer", TypeName::Int, Value::Int(0)).unwrap();
    let cell =
        machine.add_scoped_variable(&root_path, "cell", TypeName::Int, Value::Int(0)).unwrap();
    machine
        .add_data_flow(&root_path, StateId::new("AAAAAA"), out_a, StateId::new("ROOT"), cell)
        .unwrap();

    let host = RoutineScriptHost::new().with_routine("emit", |_ctx| {
        let mut outputs = BTreeMap::new();
        outputs.insert("answer".to_string(), Value::Int(42));
        Ok(ScriptResult {
            outcome: SUCCESS_OUTCOME_ID,
            outputs,
        })
    });
    let store = InMemoryHistoryStore::new();
    let engine = ExecutionEngine::new(Arc::new(host))
        .with_clock(Arc::new(LogicalClock::new()))
        .with_store(Arc::new(store.clone()));
    engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();
    store
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests that persisted records carry the self-describing field set.
#[test]
fn records_are_self_describing() {
    let store = run_sequence_machine();
    let records = store.records().unwrap();
    assert!(!records.is_empty());
    for record in records.values() {
        for field in [
            "item_type",
            "state_name",
            "state_type",
            "path",
            "path_by_name",
            "timestamp",
            "run_id",
            "history_item_id",
        ] {
            assert!(record.get(field).is_some(), "missing field {field}");
        }
    }
}

/// Tests the raw link reconstruction over a persisted log.
#[test]
fn raw_structure_reconstructs_prev_chain() {
    let store = run_sequence_machine();
    let items = parse_records(&store.records().unwrap()).unwrap();
    let raw = raw_structure(&items);

    assert!(raw.start_item.is_some());
    // Every non-start item is linked to a known predecessor.
    let linked = raw.previous.len();
    assert_eq!(linked, items.len() - 1);
    // The next relation forms one chain without concurrency forks.
    assert_eq!(raw.next.len(), items.len() - 1);
    assert!(raw.concurrent.is_empty());
}

/// Tests the collapse into per-state records and their relations.
#[test]
fn collapse_groups_runs_into_records() {
    let store = run_sequence_machine();
    let items = parse_records(&store.records().unwrap()).unwrap();
    let collapsed = collapsed_structure(&items, false);

    assert_eq!(collapsed.records.len(), 3);
    let by_name: BTreeMap<&str, _> = collapsed
        .records
        .values()
        .map(|record| (record.state_name.as_str(), record))
        .collect();
    let root = by_name["root"];
    let a = by_name["a"];
    let b = by_name["b"];

    assert_eq!(root.state_type, StateType::Hierarchy);
    assert_eq!(a.outcome_id, Some(SUCCESS_OUTCOME_ID));
    assert!(a.timestamp_call < a.timestamp_return);

    // Hierarchy: the first run inside root is a; next on the level: a -> b.
    assert_eq!(collapsed.hierarchy.get(&root.run_id), Some(&a.run_id));
    assert_eq!(collapsed.next.get(&a.run_id), Some(&b.run_id));
    // The level ends at b; without full_next there is no next relation.
    assert!(collapsed.next.get(&b.run_id).is_none());

    // The start group points at the root run.
    let start = collapsed.start_item.as_ref().unwrap();
    assert_eq!(collapsed.next.get(&start.run_id), Some(&root.run_id));

    // Data captured at the boundaries.
    let emitted = a
        .data_outs
        .get("answer")
        .and_then(|entry| entry.get("value"))
        .and_then(serde_json::Value::as_i64);
    assert_eq!(emitted, Some(42));
    // The scoped variable shows up in the return-side scoped data of a,
    // which snapshots the enclosing container's plane.
    let cell = a.scoped_out.get("cell").and_then(|entry| entry.get("value"));
    assert_eq!(cell.and_then(serde_json::Value::as_i64), Some(42));
}

/// Tests that full next keeps relations crossing container exits.
#[test]
fn full_next_keeps_container_exit_relations() {
    let store = run_sequence_machine();
    let items = parse_records(&store.records().unwrap()).unwrap();
    let collapsed = collapsed_structure(&items, true);
    let b = collapsed.records.values().find(|record| record.state_name == "b").unwrap();
    let root = collapsed.records.values().find(|record| record.state_name == "root").unwrap();
    assert_eq!(collapsed.next.get(&b.run_id), Some(&root.run_id));
}

/// Tests that every call item has a matching return item.
#[test]
fn calls_pair_with_returns() {
    let store = run_sequence_machine();
    let items = parse_records(&store.records().unwrap()).unwrap();
    for item in items.values() {
        if item.kind == HistoryItemKind::Call {
            assert!(items.values().any(|other| {
                other.kind == HistoryItemKind::Return
                    && other.run_id == item.run_id
                    && other.call_type == item.call_type
            }));
        }
    }
}

/// Tests the string fallback for unserialisable payloads.
#[test]
fn unserialisable_payload_degrades_to_rendering() {
    // JSON object keys must be strings; a tuple-keyed map cannot serialize.
    let mut weird: BTreeMap<(u8, u8), i64> = BTreeMap::new();
    weird.insert((1, 2), 3);
    let rendered = render_payload(&weird);
    assert!(rendered.get("error_type").is_some());
    assert!(rendered.get("rendering").and_then(serde_json::Value::as_str).is_some());

    // Well-formed payloads stay typed.
    let mut plain: BTreeMap<String, i64> = BTreeMap::new();
    plain.insert("x".to_string(), 1);
    let rendered = render_payload(&plain);
    assert_eq!(rendered.get("x").and_then(serde_json::Value::as_i64), Some(1));
}
