// stateflow-core/src/runtime/history.rs
// ============================================================================
// Module: Stateflow Execution History
// Description: Doubly linked history items with keyed persistence.
// Purpose: Record every call/return boundary of a run for replay and logs.
// Dependencies: crate::core, crate::interfaces, log, serde, serde_json
// ============================================================================

//! ## Overview
//! Every thread of a run owns one execution history: an append-only list of
//! history items linked through `prev` ids. Concurrency items fork one
//! sub-history per branch, linked to the fork as their initial predecessor.
//! Items are persisted to the configured keyed store as self-describing
//! records at push time; persistence faults are logged and the run continues
//! with the in-memory history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::HistoryItemId;
use crate::core::identifiers::MachineId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StateId;
use crate::core::outcomes::Outcome;
use crate::core::path::StatePath;
use crate::core::state::StateKind;
use crate::core::time::Timestamp;
use crate::interfaces::HistoryStore;

// ============================================================================
// SECTION: Item Vocabulary
// ============================================================================

/// Kind of a history item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryItemKind {
    /// First item of a run, carrying the machine snapshot.
    StateMachineStart,
    /// A state is about to run.
    Call,
    /// A state finished running.
    Return,
    /// A concurrency state spawned branches.
    Concurrency,
}

/// Call layer of a call or return item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    /// Inner body layer.
    Execute,
    /// Outer state-entry layer.
    Container,
}

/// State classification recorded with each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    /// Synthetic type of the machine-start item.
    Machine,
    /// Execution state.
    Execution,
    /// Hierarchy state.
    Hierarchy,
    /// Barrier-concurrency state.
    BarrierConcurrency,
    /// Preemptive-concurrency state.
    PreemptiveConcurrency,
    /// Library state.
    Library,
}

impl StateType {
    /// Returns true for container state types.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Hierarchy | Self::BarrierConcurrency | Self::PreemptiveConcurrency)
    }

    /// Returns true for concurrency state types.
    #[must_use]
    pub const fn is_concurrency(self) -> bool {
        matches!(self, Self::BarrierConcurrency | Self::PreemptiveConcurrency)
    }
}

impl From<StateKind> for StateType {
    fn from(kind: StateKind) -> Self {
        match kind {
            StateKind::Execution => Self::Execution,
            StateKind::Hierarchy => Self::Hierarchy,
            StateKind::BarrierConcurrency => Self::BarrierConcurrency,
            StateKind::PreemptiveConcurrency => Self::PreemptiveConcurrency,
            StateKind::Library => Self::Library,
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Machine => "machine",
            Self::Execution => "execution",
            Self::Hierarchy => "hierarchy",
            Self::BarrierConcurrency => "barrier_concurrency",
            Self::PreemptiveConcurrency => "preemptive_concurrency",
            Self::Library => "library",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: History Item
// ============================================================================

/// Machine metadata recorded with the start item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStartInfo {
    /// Machine identifier.
    pub machine_id: MachineId,
    /// Runtime version that created the machine.
    pub version: String,
    /// Machine creation timestamp.
    pub creation_time: Timestamp,
    /// Storage id of the root state.
    pub root_state_storage_id: StateId,
}

/// One record of the execution log.
///
/// The serialized form is the self-describing record written to the keyed
/// store; fields that could not be serialized are replaced by a string
/// rendering plus an `error_type` marker inside the payload columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Item kind.
    #[serde(rename = "item_type")]
    pub kind: HistoryItemKind,
    /// Item identifier.
    pub history_item_id: HistoryItemId,
    /// Identifier of the predecessor item, if any.
    pub prev_history_item_id: Option<HistoryItemId>,
    /// Run identifier shared by the items of one state execution.
    pub run_id: RunId,
    /// Name of the recorded state.
    pub state_name: String,
    /// Classification of the recorded state.
    pub state_type: StateType,
    /// Path of the recorded state.
    pub path: StatePath,
    /// Path of the recorded state rendered by names.
    pub path_by_name: String,
    /// Timestamp of the boundary.
    pub timestamp: Timestamp,
    /// Call layer for call/return items.
    pub call_type: Option<CallType>,
    /// Outcome name for return items.
    pub outcome_name: Option<String>,
    /// Outcome id for return items.
    pub outcome_id: Option<OutcomeId>,
    /// Child input or output data at the boundary.
    pub input_output_data: serde_json::Value,
    /// Scoped data snapshot at the boundary.
    pub scoped_data: serde_json::Value,
    /// Scoped variable declarations of the recorded container.
    pub scoped_variables: serde_json::Value,
    /// Machine metadata, present on start items only.
    pub machine: Option<MachineStartInfo>,
    /// Number of forked branches, present on concurrency items only.
    pub branch_count: Option<usize>,
}

/// Boundary context shared by the items of one state execution.
#[derive(Debug, Clone)]
pub struct ItemContext {
    /// Path of the recorded state.
    pub path: StatePath,
    /// Path rendered by names.
    pub path_by_name: String,
    /// Name of the recorded state.
    pub state_name: String,
    /// Classification of the recorded state.
    pub state_type: StateType,
    /// Run identifier of the state execution.
    pub run_id: RunId,
}

// ============================================================================
// SECTION: Fallback Serialization
// ============================================================================

/// Serializes a payload, degrading to its string rendering plus an
/// `error_type` marker when serialization fails.
pub fn render_payload<T: Serialize + fmt::Debug>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        serde_json::json!({
            "rendering": format!("{value:?}"),
            "error_type": err.to_string(),
        })
    })
}

// ============================================================================
// SECTION: Execution History
// ============================================================================

/// Shared inner state of a per-thread history.
struct HistoryInner {
    /// Items in program order.
    items: Mutex<Vec<HistoryItem>>,
    /// Predecessor of the first item, set for concurrency branches.
    initial_prev: Option<HistoryItemId>,
    /// Keyed store the items are persisted to.
    store: Option<Arc<dyn HistoryStore>>,
}

/// Append-only history of one execution thread.
#[derive(Clone)]
pub struct ExecutionHistory {
    /// Shared inner state.
    inner: Arc<HistoryInner>,
}

impl ExecutionHistory {
    /// Creates an empty history persisting to the given store.
    #[must_use]
    pub fn new(store: Option<Arc<dyn HistoryStore>>) -> Self {
        Self {
            inner: Arc::new(HistoryInner {
                items: Mutex::new(Vec::new()),
                initial_prev: None,
                store,
            }),
        }
    }

    /// Creates one branch history per concurrent thread, linked to the
    /// forking item.
    #[must_use]
    fn fork(&self, count: usize, initial_prev: HistoryItemId) -> Vec<Self> {
        (0 .. count)
            .map(|_| Self {
                inner: Arc::new(HistoryInner {
                    items: Mutex::new(Vec::new()),
                    initial_prev: Some(initial_prev.clone()),
                    store: self.inner.store.clone(),
                }),
            })
            .collect()
    }

    /// Returns the number of recorded items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no item was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the recorded items.
    #[must_use]
    pub fn items(&self) -> Vec<HistoryItem> {
        self.lock().clone()
    }

    /// Removes items past `len` from the live list; the persistent log is
    /// append-only and keeps them.
    pub fn truncate(&self, len: usize) {
        self.lock().truncate(len);
    }

    /// Records the machine-start item of a run.
    pub fn push_machine_start(&self, ctx: &ItemContext, timestamp: Timestamp, info: MachineStartInfo) -> HistoryItemId {
        self.push(HistoryItem {
            kind: HistoryItemKind::StateMachineStart,
            history_item_id: HistoryItemId::generate(),
            prev_history_item_id: None,
            run_id: ctx.run_id.clone(),
            state_name: ctx.state_name.clone(),
            state_type: StateType::Machine,
            path: ctx.path.clone(),
            path_by_name: ctx.path_by_name.clone(),
            timestamp,
            call_type: Some(CallType::Execute),
            outcome_name: None,
            outcome_id: None,
            input_output_data: serde_json::Value::Null,
            scoped_data: serde_json::Value::Null,
            scoped_variables: serde_json::Value::Null,
            machine: Some(info),
            branch_count: None,
        })
    }

    /// Records a call item.
    pub fn push_call(
        &self,
        ctx: &ItemContext,
        timestamp: Timestamp,
        call_type: CallType,
        input_data: serde_json::Value,
        scoped_data: serde_json::Value,
        scoped_variables: serde_json::Value,
    ) -> HistoryItemId {
        self.push(HistoryItem {
            kind: HistoryItemKind::Call,
            history_item_id: HistoryItemId::generate(),
            prev_history_item_id: None,
            run_id: ctx.run_id.clone(),
            state_name: ctx.state_name.clone(),
            state_type: ctx.state_type,
            path: ctx.path.clone(),
            path_by_name: ctx.path_by_name.clone(),
            timestamp,
            call_type: Some(call_type),
            outcome_name: None,
            outcome_id: None,
            input_output_data: input_data,
            scoped_data,
            scoped_variables,
            machine: None,
            branch_count: None,
        })
    }

    /// Records a return item.
    #[allow(
        clippy::too_many_arguments,
        reason = "Return items carry the full boundary payload."
    )]
    pub fn push_return(
        &self,
        ctx: &ItemContext,
        timestamp: Timestamp,
        call_type: CallType,
        output_data: serde_json::Value,
        scoped_data: serde_json::Value,
        scoped_variables: serde_json::Value,
        outcome: &Outcome,
    ) -> HistoryItemId {
        self.push(HistoryItem {
            kind: HistoryItemKind::Return,
            history_item_id: HistoryItemId::generate(),
            prev_history_item_id: None,
            run_id: ctx.run_id.clone(),
            state_name: ctx.state_name.clone(),
            state_type: ctx.state_type,
            path: ctx.path.clone(),
            path_by_name: ctx.path_by_name.clone(),
            timestamp,
            call_type: Some(call_type),
            outcome_name: Some(outcome.name.clone()),
            outcome_id: Some(outcome.outcome_id),
            input_output_data: output_data,
            scoped_data,
            scoped_variables,
            machine: None,
            branch_count: None,
        })
    }

    /// Records a concurrency item and forks one branch history per thread.
    pub fn push_concurrency(
        &self,
        ctx: &ItemContext,
        timestamp: Timestamp,
        branch_count: usize,
    ) -> (HistoryItemId, Vec<Self>) {
        let id = self.push(HistoryItem {
            kind: HistoryItemKind::Concurrency,
            history_item_id: HistoryItemId::generate(),
            prev_history_item_id: None,
            run_id: ctx.run_id.clone(),
            state_name: ctx.state_name.clone(),
            state_type: ctx.state_type,
            path: ctx.path.clone(),
            path_by_name: ctx.path_by_name.clone(),
            timestamp,
            call_type: Some(CallType::Container),
            outcome_name: None,
            outcome_id: None,
            input_output_data: serde_json::Value::Null,
            scoped_data: serde_json::Value::Null,
            scoped_variables: serde_json::Value::Null,
            machine: None,
            branch_count: Some(branch_count),
        });
        let branches = self.fork(branch_count, id.clone());
        (id, branches)
    }

    /// Links, persists, and appends one item.
    fn push(&self, mut item: HistoryItem) -> HistoryItemId {
        let mut items = self.lock();
        item.prev_history_item_id = items
            .last()
            .map(|last| last.history_item_id.clone())
            .or_else(|| self.inner.initial_prev.clone());
        let id = item.history_item_id.clone();
        if let Some(store) = &self.inner.store {
            match serde_json::to_value(&item) {
                Ok(record) => {
                    if let Err(err) = store.put(&id, &record) {
                        log::warn!("history item {id} not persisted: {err}");
                    }
                }
                Err(err) => log::warn!("history item {id} not serializable: {err}"),
            }
        }
        items.push(item);
        id
    }

    /// Locks the item list, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<HistoryItem>> {
        match self.inner.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
