// crates/stateflow-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Tests for the durable keyed history store.
// ============================================================================
//! ## Overview
//! Validates create-if-missing opening, record round trips, read-only
//! handles, and fail-closed behavior after close.

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

use serde_json::json;
use stateflow_core::HistoryItemId;
use stateflow_core::HistoryStore;
use stateflow_core::StoreError;
use stateflow_store_sqlite::SqliteHistoryStore;
use stateflow_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests that records round trip through the database.
#[test]
fn put_then_records_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("log.db"));
    let store = SqliteHistoryStore::open(&config).unwrap();

    let key = HistoryItemId::new("item-1");
    let record = json!({"item_type": "call", "state_name": "a", "run_id": "r-1"});
    store.put(&key, &record).unwrap();
    store.flush().unwrap();

    let records = store.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records.get("item-1"), Some(&record));
}

/// Tests that a second open sees previously written records.
#[test]
fn reopen_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.db");
    let config = SqliteStoreConfig::new(path.clone());
    {
        let store = SqliteHistoryStore::open(&config).unwrap();
        store.put(&HistoryItemId::new("item-1"), &json!({"run_id": "r-1"})).unwrap();
        store.close().unwrap();
    }
    let reopened = SqliteHistoryStore::open(&config).unwrap();
    assert_eq!(reopened.records().unwrap().len(), 1);
}

/// Tests the read-only analysis handle.
#[test]
fn read_only_handle_reads_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.db");
    let config = SqliteStoreConfig::new(path.clone());
    let writer = SqliteHistoryStore::open(&config).unwrap();
    writer.put(&HistoryItemId::new("item-1"), &json!({"run_id": "r-1"})).unwrap();
    writer.flush().unwrap();

    let reader = SqliteHistoryStore::open_read_only(&path).unwrap();
    assert_eq!(reader.records().unwrap().len(), 1);
}

/// Tests that writes after close fail closed.
#[test]
fn put_after_close_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("log.db"));
    let store = SqliteHistoryStore::open(&config).unwrap();
    store.close().unwrap();
    let err = store.put(&HistoryItemId::new("item-1"), &json!({})).unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

/// Tests that a missing database path rejects read-only opening.
#[test]
fn read_only_requires_an_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    assert!(SqliteHistoryStore::open_read_only(&dir.path().join("absent.db")).is_err());
}
