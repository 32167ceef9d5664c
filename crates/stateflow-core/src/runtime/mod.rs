// stateflow-core/src/runtime/mod.rs
// ============================================================================
// Module: Stateflow Runtime
// Description: Execution engine, scoped data, history, and log derivations.
// Purpose: Group the runtime surfaces and re-export the public API.
// Dependencies: crate::runtime::*
// ============================================================================

//! ## Overview
//! The runtime drives state trees: the engine and its boundary control, the
//! scoped data plane, per-thread execution histories with keyed persistence,
//! the log derivations, clocks, and the routine script host.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clock;
pub mod control;
pub mod engine;
pub mod history;
pub mod log;
pub mod scoped_data;
pub mod script;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::LogicalClock;
pub use clock::WallClock;
pub use control::EngineMode;
pub use control::EngineStatus;
pub use control::ExecutionControl;
pub use control::Passage;
pub use control::StepMode;
pub use engine::EngineError;
pub use engine::ExecutionEngine;
pub use engine::RunReport;
pub use history::CallType;
pub use history::ExecutionHistory;
pub use history::HistoryItem;
pub use history::HistoryItemKind;
pub use history::ItemContext;
pub use history::MachineStartInfo;
pub use history::StateType;
pub use history::render_payload;
pub use log::CollapsedRecord;
pub use log::CollapsedStructure;
pub use log::LogError;
pub use log::RawStructure;
pub use log::collapsed_structure;
pub use log::parse_records;
pub use log::raw_structure;
pub use scoped_data::ScopedData;
pub use scoped_data::ScopedDataItem;
pub use scoped_data::ScopedDataSnapshot;
pub use scoped_data::ScopedKey;
pub use script::RoutineScriptHost;
pub use store::InMemoryHistoryStore;
pub use store::SharedHistoryStore;
