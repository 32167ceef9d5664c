// stateflow-store-sqlite/src/lib.rs
// ============================================================================
// Module: Stateflow SQLite Store Library
// Description: Public API surface for the durable history store.
// Purpose: Expose the SQLite-backed keyed execution log.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate provides the durable [`stateflow_core::HistoryStore`]
//! implementation backed by `SQLite`. Writers serialize through one
//! exclusive connection; analysis tools open separate read-only handles.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteHistoryStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
