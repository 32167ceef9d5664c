// stateflow-core/src/edit/substitute.rs
// ============================================================================
// Module: Stateflow Substitute
// Description: Replace a state in its sibling slot, preserving linkage.
// Purpose: Rewire parent linkage onto a replacement by name or position.
// Dependencies: crate::core, crate::edit::{clipboard, selection}, log
// ============================================================================

//! ## Overview
//! Substitution replaces the state at a path with another state in the same
//! sibling slot. Parent-side transitions and data flows are re-attached by
//! matching outcomes and ports by name first and by positional order second;
//! unmatched linkage is dropped with a warning. With `as_template`, a
//! library replacement is expanded into a copy of its loaded root first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::machine::StateMachine;
use crate::core::path::StatePath;
use crate::core::ports::DataPort;
use crate::core::state::State;
use crate::core::validate::StructureError;
use crate::edit::clipboard::EditError;
use crate::edit::selection::inside_library;
use crate::interfaces::ChangeCause;
use crate::interfaces::LibraryProvider;

// ============================================================================
// SECTION: Substitute
// ============================================================================

/// Replaces the state at `path` with `replacement` and returns the id the
/// replacement occupies.
///
/// With `as_template` set and a library replacement, the referenced machine
/// is loaded through `provider` and its root takes the slot instead of the
/// wrapper. With `keep_name` set, the replacement takes over the old name.
///
/// # Errors
///
/// Returns [`EditError`] when the path names the root or does not resolve,
/// or when a template expansion has no provider.
pub fn substitute_state(
    machine: &mut StateMachine,
    path: &StatePath,
    replacement: State,
    as_template: bool,
    keep_name: bool,
    provider: Option<&dyn LibraryProvider>,
) -> Result<StateId, EditError> {
    let Some(parent_path) = path.parent() else {
        return Err(EditError::RootState);
    };
    let Some(target_id) = path.leaf().cloned() else {
        return Err(EditError::TargetNotFound(path.to_string()));
    };
    if inside_library(machine, &parent_path) {
        return Err(EditError::InsideLibrary);
    }

    let replacement = if as_template
        && let Some(reference) = replacement.library_reference()
    {
        let Some(provider) = provider else {
            return Err(EditError::TargetNotFound(reference.library_path.clone()));
        };
        let mut template = provider
            .load(&reference.library_path)
            .map_err(|err| EditError::TargetNotFound(err.to_string()))?;
        template.set_name(replacement.name().to_string());
        template
    } else {
        replacement
    };

    machine
        .with_state(&parent_path, "substitute_state", ChangeCause::StructuralEdit, move |parent| {
            substitute_in_parent(parent, &target_id, replacement, keep_name)
        })
        .map_err(EditError::from)
}

/// Performs the substitution inside the parent container.
fn substitute_in_parent(
    parent: &mut State,
    target_id: &StateId,
    mut replacement: State,
    keep_name: bool,
) -> Result<StateId, StructureError> {
    let ingoing: Vec<Transition> = parent
        .transitions()
        .iter()
        .filter(|transition| transition.to_state == *target_id)
        .cloned()
        .collect();
    let outgoing: Vec<Transition> = parent
        .transitions()
        .iter()
        .filter(|transition| transition.from_state == *target_id)
        .cloned()
        .collect();
    let in_flows: Vec<DataFlow> =
        parent.data_flows().iter().filter(|flow| flow.to_state == *target_id).cloned().collect();
    let out_flows: Vec<DataFlow> =
        parent.data_flows().iter().filter(|flow| flow.from_state == *target_id).cloned().collect();
    let was_start = parent.start_state_id() == Some(target_id);

    let old = parent.remove_child_state(target_id)?;
    if keep_name {
        replacement.set_name(old.name().to_string());
    }

    // The replacement takes over the sibling slot, including the id.
    replacement.change_own_id(target_id.clone());
    let outcome_map = match_outcomes(&old, &replacement);
    let input_map = match_ports(old.input_ports(), replacement.input_ports());
    let output_map = match_ports(old.output_ports(), replacement.output_ports());
    parent.add_child_state(replacement)?;

    for transition in ingoing {
        if let Err(err) = parent.add_transition(
            transition.from_state.clone(),
            transition.from_outcome,
            target_id.clone(),
            None,
        ) {
            log::warn!("transition into substituted state dropped: {err}");
        }
    }
    for transition in outgoing {
        let Some(outcome) = transition.from_outcome.and_then(|outcome| outcome_map.get(&outcome))
        else {
            log::warn!(
                "transition from outcome {:?} dropped: no matching outcome on replacement",
                transition.from_outcome
            );
            continue;
        };
        if let Err(err) = parent.add_transition(
            target_id.clone(),
            Some(*outcome),
            transition.to_state.clone(),
            transition.to_outcome,
        ) {
            log::warn!("transition from substituted state dropped: {err}");
        }
    }
    for flow in in_flows {
        let Some(port) = input_map.get(&flow.to_key) else {
            log::warn!("data flow into port {} dropped: no matching input", flow.to_key);
            continue;
        };
        if let Err(err) =
            parent.add_data_flow(flow.from_state.clone(), flow.from_key, target_id.clone(), *port)
        {
            log::warn!("data flow into substituted state dropped: {err}");
        }
    }
    for flow in out_flows {
        let Some(port) = output_map.get(&flow.from_key) else {
            log::warn!("data flow from port {} dropped: no matching output", flow.from_key);
            continue;
        };
        if let Err(err) =
            parent.add_data_flow(target_id.clone(), *port, flow.to_state.clone(), flow.to_key)
        {
            log::warn!("data flow from substituted state dropped: {err}");
        }
    }
    if was_start {
        parent.set_start_state(Some(target_id.clone()))?;
    }
    Ok(target_id.clone())
}

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Matches old outcomes to replacement outcomes by name, then by position.
fn match_outcomes(old: &State, new: &State) -> BTreeMap<OutcomeId, OutcomeId> {
    let mut map = BTreeMap::new();
    for (index, outcome) in old.outcomes().iter().enumerate() {
        let matched = new
            .outcome_by_name(&outcome.name)
            .or_else(|| new.outcomes().get(index))
            .map(|matched| matched.outcome_id);
        if let Some(matched) = matched {
            map.insert(outcome.outcome_id, matched);
        }
    }
    map
}

/// Matches old ports to replacement ports by name, then by position.
fn match_ports(old: &[DataPort], new: &[DataPort]) -> BTreeMap<PortId, PortId> {
    let mut map = BTreeMap::new();
    for (index, port) in old.iter().enumerate() {
        let matched = new
            .iter()
            .find(|candidate| candidate.name == port.name)
            .or_else(|| new.get(index))
            .map(|matched| matched.data_port_id);
        if let Some(matched) = matched {
            map.insert(port.data_port_id, matched);
        }
    }
    map
}
