// stateflow-core/src/interfaces/mod.rs
// ============================================================================
// Module: Stateflow Interfaces
// Description: Backend-agnostic interfaces for scripts, history, and libraries.
// Purpose: Define the contract surfaces used by the Stateflow runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Stateflow integrates with hosts without embedding
//! backend-specific details: script execution, history persistence, clocks,
//! library resolution, and model-change observation. Implementations must be
//! deterministic where the engine depends on replay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::HistoryItemId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::StateId;
use crate::core::outcomes::Outcome;
use crate::core::path::StatePath;
use crate::core::state::ScriptSource;
use crate::core::state::State;
use crate::core::time::Timestamp;
use crate::core::validate::StructureError;
use crate::core::value::Value;

// ============================================================================
// SECTION: Script Host
// ============================================================================

/// Context passed to a script invocation.
#[derive(Debug)]
pub struct ScriptContext<'a> {
    /// Path of the executing state.
    pub state_path: &'a StatePath,
    /// Name of the executing state.
    pub state_name: &'a str,
    /// Resolved input values by port name.
    pub inputs: &'a BTreeMap<String, Value>,
    /// Child outcomes, present only for decider invocations.
    pub branch_outcomes: Option<&'a [(StateId, Outcome)]>,
}

/// Result of a successful script invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Outcome selected by the script.
    pub outcome: OutcomeId,
    /// Output values by port name.
    pub outputs: BTreeMap<String, Value>,
}

/// Script execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The script body raised an execution fault.
    #[error("script fault ({error_type}): {error_message}")]
    Fault {
        /// Fault type label stored with the `error` output.
        error_type: String,
        /// Fault message.
        error_message: String,
    },
    /// The script source names no registered routine.
    #[error("unknown routine: {0}")]
    UnknownRoutine(String),
}

/// Backend-agnostic script execution host.
///
/// Script bodies are atomic from the engine's point of view; cancellation is
/// observed only at the next state boundary.
pub trait ScriptHost: Send + Sync {
    /// Runs a script and returns its outcome and outputs.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] when the body faults; the engine reifies the
    /// fault as the `aborted` outcome.
    fn call(&self, script: &ScriptSource, ctx: &ScriptContext<'_>)
    -> Result<ScriptResult, ScriptError>;
}

// ============================================================================
// SECTION: History Store
// ============================================================================

/// History store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("history store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("history store corruption: {0}")]
    Corrupt(String),
    /// The store was closed.
    #[error("history store is closed")]
    Closed,
    /// Store reported an error.
    #[error("history store error: {0}")]
    Store(String),
}

/// Keyed append log for serialized history items.
///
/// Writers from concurrent branches serialize through the same handle; the
/// log itself is append-only.
pub trait HistoryStore: Send + Sync {
    /// Persists one serialized history record under its item id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put(&self, key: &HistoryItemId, record: &serde_json::Value) -> Result<(), StoreError>;

    /// Persists buffered records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the flush fails.
    fn flush(&self) -> Result<(), StoreError>;

    /// Persists buffered records and releases the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when closing fails.
    fn close(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Timestamp source for history items.
pub trait Clock: Send + Sync {
    /// Returns the current timestamp.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Library Provider
// ============================================================================

/// Library resolution errors.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The referenced library cannot be resolved.
    #[error("library not found: {0}")]
    NotFound(String),
    /// The referenced library failed to load.
    #[error("library load failed for {path}: {reason}")]
    LoadFailed {
        /// Library path being loaded.
        path: String,
        /// Failure description.
        reason: String,
    },
}

/// Resolver for library states referencing persisted machines.
pub trait LibraryProvider: Send + Sync {
    /// Loads the root state of the referenced library machine.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError`] when the reference cannot be resolved.
    fn load(&self, library_path: &str) -> Result<State, LibraryError>;
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Cause classification attached to model-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// A child state was added, removed, or re-keyed.
    StateChange,
    /// A transition was added or removed.
    TransitionChange,
    /// A data flow was added or removed.
    DataFlowChange,
    /// A scoped variable was added or removed.
    ScopedVariableChange,
    /// A port was added or removed.
    PortChange,
    /// An outcome was added or removed.
    OutcomeChange,
    /// A state was rebuilt as another variant.
    TypeChange,
    /// A state was renamed.
    Rename,
    /// The start state changed.
    StartStateChange,
    /// A structural edit (paste, group, ungroup, substitute) committed.
    StructuralEdit,
}

/// Model-change notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEvent {
    /// Path of the state the operation applies to.
    pub path: StatePath,
    /// Operation name, e.g. `add_transition`.
    pub operation: &'static str,
    /// Cause classification.
    pub cause: ChangeCause,
}

/// Observer of model changes.
///
/// Registries hold observers weakly; dropping the observer unsubscribes it.
pub trait Observer: Send + Sync {
    /// Called before a mutation is attempted.
    fn on_before(&self, event: &ModelEvent) {
        let _ = event;
    }

    /// Called after a mutation with its result; `error` is `None` on
    /// success.
    fn on_after(&self, event: &ModelEvent, error: Option<&StructureError>) {
        let _ = event;
        let _ = error;
    }
}
