// crates/stateflow-config/tests/config.rs
// ============================================================================
// Module: Config Tests
// Description: Tests for configuration parsing and library resolution.
// ============================================================================
//! ## Overview
//! Validates TOML parsing with defaults, fail-closed validation, and the
//! file-based library provider.

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

use std::fs;

use stateflow_config::ConfigError;
use stateflow_config::FileLibraryProvider;
use stateflow_config::StateflowConfig;
use stateflow_core::LibraryProvider;
use stateflow_core::State;
use stateflow_core::StateId;
use stateflow_core::StateMachine;
use stateflow_core::save_state_machine;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests that a full config file parses into typed sections.
#[test]
fn config_file_parses_into_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stateflow.toml");
    fs::write(
        &path,
        r#"
[history]
log_path = "run/history.db"
busy_timeout_ms = 2500
journal_mode = "wal"
sync_mode = "normal"

[libraries]
search_paths = ["libs", "shared/libs"]

[engine]
logical_clock = true
"#,
    )
    .unwrap();

    let config = StateflowConfig::load(Some(&path)).unwrap();
    assert_eq!(config.history.busy_timeout_ms, 2_500);
    assert!(config.history.log_path.is_some());
    assert_eq!(config.libraries.search_paths.len(), 2);
    assert!(config.engine.logical_clock);
}

/// Tests that an explicit but missing config path fails closed.
#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = StateflowConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

/// Tests that unknown keys are rejected.
#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stateflow.toml");
    fs::write(&path, "[history]\nunexpected = 1\n").unwrap();
    let err = StateflowConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

/// Tests that a zero busy timeout is rejected.
#[test]
fn zero_busy_timeout_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stateflow.toml");
    fs::write(&path, "[history]\nbusy_timeout_ms = 0\n").unwrap();
    let err = StateflowConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue(_)));
}

/// Tests library resolution against search paths.
#[test]
fn library_provider_resolves_saved_machines() {
    let dir = tempfile::tempdir().unwrap();
    let library_dir = dir.path().join("common").join("util");
    let mut machine = StateMachine::new(State::new_execution(StateId::new("LIBROO"), "util"));
    save_state_machine(&mut machine, &library_dir).unwrap();

    let provider = FileLibraryProvider::new(vec![dir.path().to_path_buf()]);
    let loaded = provider.load("common/util").unwrap();
    assert_eq!(loaded.state_id(), &StateId::new("LIBROO"));

    // Unknown references and traversal attempts are refused.
    assert!(provider.load("common/missing").is_err());
    assert!(provider.load("../escape").is_err());
}
