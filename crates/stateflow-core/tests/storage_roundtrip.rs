// crates/stateflow-core/tests/storage_roundtrip.rs
// ============================================================================
// Module: Storage Round-Trip Tests
// Description: Tests for the on-disk machine layout.
// ============================================================================
//! ## Overview
//! Validates that a saved machine loads back structurally identical and that
//! malformed layouts fail closed.

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

use stateflow_core::SUCCESS_OUTCOME_ID;
use stateflow_core::ScriptSource;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::StorageError;
use stateflow_core::TypeName;
use stateflow_core::Value;
use stateflow_core::load_state_machine;
use stateflow_core::save_state_machine;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

fn nested_machine() -> StateMachine {
    let mut inner = State::new_hierarchy(StateId::new("INNERH"), "inner");
    let mut leaf = State::new_execution(StateId::new("LEAFST"), "leaf");
    leaf.set_script(ScriptSource::new("emit")).unwrap();
    leaf.add_output_port("out", TypeName::Int, Value::Int(3)).unwrap();
    inner.add_child_state(leaf).unwrap();
    inner.add_transition(StateId::new("INNERH"), None, StateId::new("LEAFST"), None).unwrap();
    inner
        .add_transition(
            StateId::new("LEAFST"),
            Some(SUCCESS_OUTCOME_ID),
            StateId::new("INNERH"),
            Some(SUCCESS_OUTCOME_ID),
        )
        .unwrap();

    let mut root = State::new_barrier(StateId::new("ROOT"), "root");
    root.add_scoped_variable("cell", TypeName::Map, Value::Map(std::collections::BTreeMap::new()))
        .unwrap();
    root.add_child_state(inner).unwrap();
    root.add_child_state(State::new_library(StateId::new("LIBSTA"), "lib", "common/util"))
        .unwrap();
    StateMachine::new(root)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests that load(save(m)) preserves the structure.
#[test]
fn save_then_load_is_identity_on_structure() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = nested_machine();
    let before = machine.root().clone();
    save_state_machine(&mut machine, dir.path()).unwrap();
    assert!(!machine.is_dirty());
    assert_eq!(machine.file_system_path(), Some(&dir.path().to_path_buf()));

    let loaded = load_state_machine(dir.path()).unwrap();
    assert_eq!(*loaded.root(), before);
    assert_eq!(loaded.machine_id(), machine.machine_id());
}

/// Tests the expected folder layout.
#[test]
fn layout_places_states_in_id_folders() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = nested_machine();
    save_state_machine(&mut machine, dir.path()).unwrap();

    assert!(dir.path().join("statemachine.json").is_file());
    let root_dir = dir.path().join("ROOT");
    assert!(root_dir.join("core_data.json").is_file());
    assert!(root_dir.join("INNERH").join("core_data.json").is_file());
    let leaf_dir = root_dir.join("INNERH").join("LEAFST");
    assert!(leaf_dir.join("core_data.json").is_file());
    // Scripts are stored for execution states only.
    assert!(leaf_dir.join("script.json").is_file());
    assert!(!root_dir.join("script.json").exists());
    // The implicit decider is persisted like any child.
    assert!(root_dir.join("DECIDER").join("core_data.json").is_file());
}

/// Tests that a directory without machine metadata fails closed.
#[test]
fn missing_metadata_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_state_machine(dir.path()).unwrap_err();
    assert!(matches!(err, StorageError::NotAStateMachine { .. }));
}

/// Tests that corrupted core data fails closed.
#[test]
fn corrupt_core_data_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = nested_machine();
    save_state_machine(&mut machine, dir.path()).unwrap();
    std::fs::write(dir.path().join("ROOT").join("core_data.json"), "{not json").unwrap();
    let err = load_state_machine(dir.path()).unwrap_err();
    assert!(matches!(err, StorageError::Parse { .. }));
}
