// stateflow-core/src/runtime/log.rs
// ============================================================================
// Module: Stateflow Log Derivations
// Description: Raw and collapsed structures over persisted execution logs.
// Purpose: Rebuild causality and per-state records from a keyed log.
// Dependencies: crate::core, crate::runtime::history, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A persisted log is a keyed set of history records. The raw derivation
//! reconstructs the `previous`, `next`, and `concurrent` relations from the
//! `prev` links; the collapsed derivation groups items by run id and merges
//! each group into one per-state execution record, pairing the innermost
//! `EXECUTE` call with its return and falling back to the `CONTAINER` layer.
//! Runs without a return item (hard cancellations) are skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::HistoryItemId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::RunId;
use crate::core::path::StatePath;
use crate::core::time::Timestamp;
use crate::runtime::history::CallType;
use crate::runtime::history::HistoryItem;
use crate::runtime::history::HistoryItemKind;
use crate::runtime::history::StateType;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Log parsing errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// A stored record does not deserialize into a history item.
    #[error("history record {key} is not parseable: {reason}")]
    Parse {
        /// Store key of the offending record.
        key: String,
        /// Deserialization failure description.
        reason: String,
    },
}

/// Parses raw store records into history items keyed by item id.
///
/// # Errors
///
/// Returns [`LogError::Parse`] for records that do not deserialize.
pub fn parse_records(
    raw: &BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<HistoryItemId, HistoryItem>, LogError> {
    let mut items = BTreeMap::new();
    for (key, record) in raw {
        let item: HistoryItem =
            serde_json::from_value(record.clone()).map_err(|err| LogError::Parse {
                key: key.clone(),
                reason: err.to_string(),
            })?;
        items.insert(item.history_item_id.clone(), item);
    }
    Ok(items)
}

// ============================================================================
// SECTION: Raw Structure
// ============================================================================

/// Link relations reconstructed from a raw log.
#[derive(Debug, Default)]
pub struct RawStructure {
    /// Machine-start item of the log, if present.
    pub start_item: Option<HistoryItem>,
    /// Predecessor relation by item id.
    pub previous: BTreeMap<HistoryItemId, HistoryItemId>,
    /// Successor relation by item id, skipping concurrency forks.
    pub next: BTreeMap<HistoryItemId, HistoryItemId>,
    /// Branch entry items per concurrency item.
    pub concurrent: BTreeMap<HistoryItemId, Vec<HistoryItemId>>,
    /// Items grouped by run id.
    pub grouped: BTreeMap<RunId, Vec<HistoryItem>>,
}

/// Reconstructs the raw link structure of a log.
#[must_use]
pub fn raw_structure(items: &BTreeMap<HistoryItemId, HistoryItem>) -> RawStructure {
    let mut structure = RawStructure::default();
    for (key, item) in items {
        if item.kind == HistoryItemKind::StateMachineStart {
            structure.start_item = Some(item.clone());
        } else if let Some(prev_id) = &item.prev_history_item_id {
            structure.previous.insert(key.clone(), prev_id.clone());
            match items.get(prev_id) {
                Some(prev_item)
                    if prev_item.kind == HistoryItemKind::Concurrency
                        && item.kind != HistoryItemKind::Return =>
                {
                    structure.concurrent.entry(prev_id.clone()).or_default().push(key.clone());
                }
                Some(_) => {
                    structure.next.insert(prev_id.clone(), key.clone());
                }
                None => {
                    // Predecessor missing from a partial log; leave unlinked.
                }
            }
        }
        structure.grouped.entry(item.run_id.clone()).or_default().push(item.clone());
    }
    structure
}

// ============================================================================
// SECTION: Collapsed Structure
// ============================================================================

/// One per-state execution merged from the items of a run id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapsedRecord {
    /// Path of the executed state.
    pub path: StatePath,
    /// Name of the executed state.
    pub state_name: String,
    /// Classification of the executed state.
    pub state_type: StateType,
    /// Run identifier of the execution.
    pub run_id: RunId,
    /// Final outcome name.
    pub outcome_name: Option<String>,
    /// Final outcome id.
    pub outcome_id: Option<OutcomeId>,
    /// Timestamp of the paired call item.
    pub timestamp_call: Timestamp,
    /// Timestamp of the paired return item.
    pub timestamp_return: Timestamp,
    /// Input data at the call boundary.
    pub data_ins: serde_json::Value,
    /// Output data at the return boundary.
    pub data_outs: serde_json::Value,
    /// Scoped data by name at the call boundary.
    pub scoped_in: BTreeMap<String, serde_json::Value>,
    /// Scoped data by name at the return boundary.
    pub scoped_out: BTreeMap<String, serde_json::Value>,
}

/// Collapsed view of a log: per-state records plus their relations.
#[derive(Debug, Default)]
pub struct CollapsedStructure {
    /// Machine-start item of the log, if present.
    pub start_item: Option<HistoryItem>,
    /// Run executed after each run on the same hierarchy level.
    pub next: BTreeMap<RunId, RunId>,
    /// Branch runs launched by each concurrency run.
    pub concurrent: BTreeMap<RunId, Vec<RunId>>,
    /// First run executed inside each container run.
    pub hierarchy: BTreeMap<RunId, RunId>,
    /// Collapsed records by run id.
    pub records: BTreeMap<RunId, CollapsedRecord>,
}

/// Collapses a log into per-state execution records.
///
/// With `full_next` set, next relations crossing a container exit are kept;
/// otherwise they are suppressed, matching the per-level reading.
#[must_use]
pub fn collapsed_structure(
    items: &BTreeMap<HistoryItemId, HistoryItem>,
    full_next: bool,
) -> CollapsedStructure {
    let raw = raw_structure(items);
    let mut collapsed = CollapsedStructure {
        start_item: raw.start_item.clone(),
        ..CollapsedStructure::default()
    };

    for (run_id, group) in &raw.grouped {
        if group.iter().any(|item| item.kind == HistoryItemKind::StateMachineStart) {
            if let Some(start) = group.first()
                && let Some(next_id) = raw.next.get(&start.history_item_id)
                && let Some(next_item) = items.get(next_id)
            {
                collapsed.next.insert(run_id.clone(), next_item.run_id.clone());
            }
            continue;
        }
        if group.iter().all(|item| item.kind == HistoryItemKind::Concurrency) {
            continue;
        }

        let Some(call_inner) = pick(group, HistoryItemKind::Call, CallType::Execute) else {
            continue;
        };
        let Some(return_inner) = pick(group, HistoryItemKind::Return, CallType::Execute) else {
            log::debug!("run {run_id} has no return item; skipping collapse");
            continue;
        };
        let call_outer =
            pick(group, HistoryItemKind::Call, CallType::Container).unwrap_or(call_inner);
        let return_outer =
            pick(group, HistoryItemKind::Return, CallType::Container).unwrap_or(return_inner);

        // Next relation on the same hierarchy level follows the outer return.
        if let Some(next_id) = raw.next.get(&return_outer.history_item_id)
            && let Some(next_item) = items.get(next_id)
        {
            if next_item.kind == HistoryItemKind::Return {
                if full_next {
                    collapsed.next.insert(run_id.clone(), next_item.run_id.clone());
                }
            } else {
                collapsed.next.insert(run_id.clone(), next_item.run_id.clone());
            }
        }

        // A call item directly preceding the outer call marks nesting; a
        // concurrency item marks a branch entry.
        if let Some(prev_id) = raw.previous.get(&call_outer.history_item_id)
            && let Some(prev_item) = items.get(prev_id)
        {
            if prev_item.kind == HistoryItemKind::Call && prev_item.run_id != *run_id {
                collapsed.hierarchy.insert(prev_item.run_id.clone(), run_id.clone());
            }
            if prev_item.kind == HistoryItemKind::Concurrency {
                collapsed
                    .concurrent
                    .entry(prev_item.run_id.clone())
                    .or_default()
                    .push(run_id.clone());
            }
        }

        collapsed.records.insert(run_id.clone(), CollapsedRecord {
            path: call_inner.path.clone(),
            state_name: call_inner.state_name.clone(),
            state_type: call_inner.state_type,
            run_id: run_id.clone(),
            outcome_name: return_inner.outcome_name.clone(),
            outcome_id: return_inner.outcome_id,
            timestamp_call: call_inner.timestamp,
            timestamp_return: return_inner.timestamp,
            data_ins: call_inner.input_output_data.clone(),
            data_outs: return_inner.input_output_data.clone(),
            scoped_in: scoped_by_name(&call_inner.scoped_data),
            scoped_out: scoped_by_name(&return_inner.scoped_data),
        });
    }
    collapsed
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Picks the first item of a group with the given kind and call layer.
fn pick(group: &[HistoryItem], kind: HistoryItemKind, call_type: CallType) -> Option<&HistoryItem> {
    group.iter().find(|item| item.kind == kind && item.call_type == Some(call_type))
}

/// Re-keys a scoped data snapshot by entry name; the string fallback of
/// unserialisable snapshots collapses to an empty map.
fn scoped_by_name(scoped: &serde_json::Value) -> BTreeMap<String, serde_json::Value> {
    let mut by_name = BTreeMap::new();
    if let serde_json::Value::Object(entries) = scoped {
        for item in entries.values() {
            if let (Some(name), Some(value)) = (
                item.get("name").and_then(serde_json::Value::as_str),
                item.get("value"),
            ) {
                by_name.insert(name.to_string(), value.clone());
            }
        }
    }
    by_name
}
