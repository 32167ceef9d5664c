// crates/stateflow-core/tests/concurrency.rs
// ============================================================================
// Module: Concurrency Tests
// Description: Tests for barrier and preemptive concurrency semantics.
// ============================================================================
//! ## Overview
//! Validates barrier joins with the decider, preemptive cancellation with
//! winner propagation, engine stop behavior, and backward stepping through
//! a paused hierarchy.

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
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use stateflow_core::ExecutionEngine;
use stateflow_core::InMemoryHistoryStore;
use stateflow_core::PREEMPTED_OUTCOME_ID;
use stateflow_core::RoutineScriptHost;
use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::ScriptResult;
use stateflow_core::ScriptSource;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::runtime::CallType;
use stateflow_core::runtime::HistoryItemKind;
use stateflow_core::runtime::collapsed_structure;
use stateflow_core::runtime::parse_records;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn sleeping_routine(millis: u64) -> impl Fn(&stateflow_core::ScriptContext<'_>) -> Result<ScriptResult, stateflow_core::ScriptError> + Send + Sync {
    move |_ctx| {
        thread::sleep(Duration::from_millis(millis));
        Ok(ScriptResult {
            outcome: SUCCESS_OUTCOME_ID,
            outputs: BTreeMap::new(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests barrier concurrency: both children finish before the decider runs.
#[test]
fn barrier_waits_for_all_children_before_decider() {
    let mut root = State::new_barrier(StateId::new("ROOT"), "root");
    let mut fast = State::new_execution(StateId::new("FASTST"), "fast");
    fast.set_script(ScriptSource::new("sleep-short")).unwrap();
    let mut slow = State::new_execution(StateId::new("SLOWST"), "slow");
    slow.set_script(ScriptSource::new("sleep-long")).unwrap();
    root.add_child_state(fast).unwrap();
    root.add_child_state(slow).unwrap();
    let machine = StateMachine::new(root);

    let host = RoutineScriptHost::new()
        .with_routine("sleep-short", sleeping_routine(10))
        .with_routine("sleep-long", sleeping_routine(40));
    let store = InMemoryHistoryStore::new();
    let engine =
        ExecutionEngine::new(Arc::new(host)).with_store(Arc::new(store.clone()));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();

    // The default decider reports success once every branch succeeded.
    assert_eq!(report.outcome.outcome_id, SUCCESS_OUTCOME_ID);

    let items = parse_records(&store.records().unwrap()).unwrap();
    let decider_call = items
        .values()
        .find(|item| {
            item.state_name == "decider"
                && item.kind == HistoryItemKind::Call
                && item.call_type == Some(CallType::Execute)
        })
        .unwrap();
    for name in ["fast", "slow"] {
        let branch_return = items
            .values()
            .find(|item| {
                item.state_name == name
                    && item.kind == HistoryItemKind::Return
                    && item.call_type == Some(CallType::Execute)
            })
            .unwrap();
        assert!(branch_return.timestamp <= decider_call.timestamp);
    }
}

/// Tests preemptive concurrency: the loser exits via `preempted`.
#[test]
fn preemptive_winner_cancels_losers() {
    let mut root = State::new_preemptive(StateId::new("ROOT"), "root");
    let mut fast = State::new_execution(StateId::new("FASTST"), "fast");
    fast.set_script(ScriptSource::new("sleep-short")).unwrap();
    let mut slow = State::new_execution(StateId::new("SLOWST"), "slow");
    slow.set_script(ScriptSource::new("sleep-long")).unwrap();
    root.add_child_state(fast).unwrap();
    root.add_child_state(slow).unwrap();
    root.add_transition(
        StateId::new("FASTST"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("ROOT"),
        Some(SUCCESS_OUTCOME_ID),
    )
    .unwrap();
    let machine = StateMachine::new(root);

    let host = RoutineScriptHost::new()
        .with_routine("sleep-short", sleeping_routine(10))
        .with_routine("sleep-long", sleeping_routine(100));
    let store = InMemoryHistoryStore::new();
    let engine = ExecutionEngine::new(Arc::new(host)).with_store(Arc::new(store.clone()));
    let report = engine.run_to_completion(Arc::new(RwLock::new(machine))).unwrap();

    assert_eq!(report.outcome.outcome_id, SUCCESS_OUTCOME_ID);

    let items = parse_records(&store.records().unwrap()).unwrap();
    let collapsed = collapsed_structure(&items, false);
    let slow_record = collapsed
        .records
        .values()
        .find(|record| record.state_name == "slow")
        .unwrap();
    assert_eq!(slow_record.outcome_id, Some(PREEMPTED_OUTCOME_ID));
    let fast_record = collapsed
        .records
        .values()
        .find(|record| record.state_name == "fast")
        .unwrap();
    assert_eq!(fast_record.outcome_id, Some(SUCCESS_OUTCOME_ID));
    assert!(fast_record.timestamp_return <= slow_record.timestamp_return);

    // Branch roots hang off the concurrency fork.
    let root_record = collapsed
        .records
        .values()
        .find(|record| record.state_name == "root")
        .unwrap();
    let branches = collapsed.concurrent.get(&root_record.run_id).unwrap();
    assert_eq!(branches.len(), 2);
}

/// Tests that stop cancels a looping machine via `preempted`.
#[test]
fn stop_preempts_a_running_machine() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("spin")).unwrap();
    root.add_child_state(a).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    // Self loop; only stop can end the run.
    root.add_transition(
        StateId::new("AAAAAA"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("AAAAAA"),
        None,
    )
    .unwrap();
    let machine = Arc::new(RwLock::new(StateMachine::new(root)));

    let host = RoutineScriptHost::new().with_routine("spin", sleeping_routine(1));
    let engine = ExecutionEngine::new(Arc::new(host));
    engine.start(Arc::clone(&machine)).unwrap();
    assert!(machine.read().unwrap().is_executing());

    thread::sleep(Duration::from_millis(30));
    engine.stop();
    let report = engine.join().unwrap();
    assert_eq!(report.outcome.outcome_id, PREEMPTED_OUTCOME_ID);
    assert!(engine.finished_or_stopped());
    assert!(!machine.read().unwrap().is_executing());
}

/// Tests pause, backward step, and resume through a hierarchy.
#[test]
fn backward_step_replays_the_previous_child() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("count-a")).unwrap();
    let mut b = State::new_execution(StateId::new("BBBBBB"), "b");
    b.set_script(ScriptSource::new("gate-b")).unwrap();
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
    let machine = Arc::new(RwLock::new(StateMachine::new(root)));

    let b_runs = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let gate_rx = Mutex::new(gate_rx);
    let counter = Arc::clone(&b_runs);
    let host = RoutineScriptHost::new()
        .with_routine("count-a", |_ctx| {
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: BTreeMap::new(),
            })
        })
        .with_routine("gate-b", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            let guard = gate_rx.lock().unwrap();
            guard.recv().ok();
            Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: BTreeMap::new(),
            })
        });

    let engine = ExecutionEngine::new(Arc::new(host));
    engine.start(Arc::clone(&machine)).unwrap();

    // Pause while `b` blocks inside its atomic body, then let it finish; the
    // engine parks at the next hierarchy boundary.
    thread::sleep(Duration::from_millis(30));
    engine.pause();
    gate_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(30));

    // One step back re-arms `b`; resume replays it.
    engine.step_backward();
    thread::sleep(Duration::from_millis(30));
    engine.resume();
    gate_tx.send(()).unwrap();

    let report = engine.join().unwrap();
    assert_eq!(report.outcome.outcome_id, SUCCESS_OUTCOME_ID);
    assert_eq!(b_runs.load(Ordering::SeqCst), 2);
}

/// Tests that step directives advance a paused run one boundary at a time.
#[test]
fn step_into_advances_one_boundary() {
    let mut root = State::new_hierarchy(StateId::new("ROOT"), "root");
    let mut a = State::new_execution(StateId::new("AAAAAA"), "a");
    a.set_script(ScriptSource::new("tick")).unwrap();
    root.add_child_state(a).unwrap();
    root.add_transition(StateId::new("ROOT"), None, StateId::new("AAAAAA"), None).unwrap();
    root.add_transition(
        StateId::new("AAAAAA"),
        Some(SUCCESS_OUTCOME_ID),
        StateId::new("ROOT"),
        Some(SUCCESS_OUTCOME_ID),
    )
    .unwrap();
    let machine = Arc::new(RwLock::new(StateMachine::new(root)));

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let gate_rx = Mutex::new(gate_rx);
    let host = RoutineScriptHost::new().with_routine("tick", move |_ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        entered_tx.send(()).ok();
        let guard = gate_rx.lock().unwrap();
        guard.recv().ok();
        Ok(ScriptResult {
            outcome: SUCCESS_OUTCOME_ID,
            outputs: BTreeMap::new(),
        })
    });

    let engine = ExecutionEngine::new(Arc::new(host));
    engine.start(Arc::clone(&machine)).unwrap();

    // Pause while the body blocks; the engine parks at the exit boundary.
    entered_rx.recv().unwrap();
    engine.pause();
    gate_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(!engine.finished_or_stopped());

    // One step releases the parked exit boundary and finishes the run.
    engine.step_into();
    let report = engine.join().unwrap();
    assert_eq!(report.outcome.outcome_id, SUCCESS_OUTCOME_ID);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
