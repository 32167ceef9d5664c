// stateflow-core/src/edit/group.rs
// ============================================================================
// Module: Stateflow Group and Ungroup
// Description: Fold sibling states into a hierarchy and unfold them again.
// Purpose: Split boundary linkage into matching ports and outcomes.
// Dependencies: crate::core, crate::edit::selection, log
// ============================================================================

//! ## Overview
//! Grouping moves selected sibling states and scoped variables into a fresh
//! hierarchy state. Enclosed linkage moves along; every dangling transition
//! or data flow is split in two at the new boundary, with a matching outcome
//! or port created on the group. Ungrouping is the inverse: boundary linkage
//! is stitched back together and the boundary ports and outcomes disappear.
//! Linkage that cannot be rebuilt is dropped with a warning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::machine::StateMachine;
use crate::core::path::StatePath;
use crate::core::state::State;
use crate::core::state::StateKind;
use crate::core::validate::StructureError;
use crate::core::value::TypeName;
use crate::core::value::Value;
use crate::edit::clipboard::EditError;
use crate::edit::selection::Selection;
use crate::edit::selection::inside_library;
use crate::interfaces::ChangeCause;

// ============================================================================
// SECTION: Group
// ============================================================================

/// Groups the selected sibling states and scoped variables into a new
/// hierarchy state and returns its id.
///
/// # Errors
///
/// Returns [`EditError`] when the selection is empty, spans a library
/// state, or the restructuring fails.
pub fn group_selection(
    machine: &mut StateMachine,
    selection: &mut Selection,
) -> Result<StateId, EditError> {
    if selection.is_empty() {
        return Err(EditError::EmptySelection);
    }
    let Some(parent_path) = selection.reduce_to_one_parent() else {
        return Err(EditError::RootState);
    };
    if inside_library(machine, &parent_path) {
        return Err(EditError::InsideLibrary);
    }
    let child_ids = selection.child_ids_under(&parent_path);
    let port_ids = selection.port_ids_on(&parent_path);
    if child_ids.is_empty() {
        return Err(EditError::EmptySelection);
    }
    machine
        .with_state(&parent_path, "group_states", ChangeCause::StructuralEdit, move |parent| {
            group_in_parent(parent, &child_ids, &port_ids)
        })
        .map_err(EditError::from)
}

/// Performs the group restructuring inside the parent container.
#[allow(
    clippy::too_many_lines,
    reason = "The boundary split is one linear restructuring pass."
)]
fn group_in_parent(
    parent: &mut State,
    child_ids: &BTreeSet<StateId>,
    port_ids: &BTreeSet<PortId>,
) -> Result<StateId, StructureError> {
    let parent_id = parent.state_id().clone();
    let parent_start = parent.start_state_id().cloned();

    // Only scoped variables move along with the children.
    let sv_ids: BTreeSet<PortId> = port_ids
        .iter()
        .copied()
        .filter(|id| parent.scoped_variable(*id).is_some())
        .collect();

    let linkage = parent.related_linkage(child_ids, &sv_ids);

    for transition in linkage
        .enclosed_transitions
        .iter()
        .chain(&linkage.ingoing_transitions)
        .chain(&linkage.outgoing_transitions)
    {
        parent.remove_transition(transition.transition_id)?;
    }
    for flow in linkage
        .enclosed_data_flows
        .iter()
        .chain(&linkage.ingoing_data_flows)
        .chain(&linkage.outgoing_data_flows)
    {
        parent.remove_data_flow(flow.data_flow_id)?;
    }

    let mut moved_children = Vec::new();
    for id in child_ids {
        moved_children.push(parent.remove_child_state(id)?);
    }
    let mut moved_variables = Vec::new();
    for id in &sv_ids {
        moved_variables.push(parent.remove_scoped_variable(*id)?);
    }

    let mut group_id = StateId::generate();
    while group_id == parent_id || parent.child(&group_id).is_some() {
        group_id = StateId::generate();
    }
    let mut group = State::new_hierarchy(group_id.clone(), "group");

    let mut port_defs: BTreeMap<(StateId, PortId), (String, TypeName, Value)> = BTreeMap::new();
    for child in &moved_children {
        for port in child.input_ports().iter().chain(child.output_ports()) {
            port_defs.insert(
                (child.state_id().clone(), port.data_port_id),
                (port.name.clone(), port.data_type, port.default_value.clone()),
            );
        }
    }
    let mut outcome_names: BTreeMap<(StateId, OutcomeId), String> = BTreeMap::new();
    for child in &moved_children {
        for outcome in child.outcomes() {
            outcome_names
                .insert((child.state_id().clone(), outcome.outcome_id), outcome.name.clone());
        }
    }
    for child in moved_children {
        group.add_child_state(child)?;
    }
    let mut sv_id_map: BTreeMap<PortId, PortId> = BTreeMap::new();
    for variable in moved_variables {
        port_defs.insert(
            (parent_id.clone(), variable.data_port_id),
            (variable.name.clone(), variable.data_type, variable.default_value.clone()),
        );
        let new_id =
            group.add_scoped_variable(variable.name, variable.data_type, variable.default_value)?;
        sv_id_map.insert(variable.data_port_id, new_id);
    }

    let map_state = |state: &StateId| {
        if *state == parent_id { group_id.clone() } else { state.clone() }
    };
    let map_key = |state: &StateId, key: PortId| {
        if *state == parent_id { sv_id_map.get(&key).copied().unwrap_or(key) } else { key }
    };

    for transition in &linkage.enclosed_transitions {
        if let Err(err) = group.add_transition(
            transition.from_state.clone(),
            transition.from_outcome,
            transition.to_state.clone(),
            None,
        ) {
            log::warn!("enclosed transition not regrouped: {err}");
        }
    }
    for flow in &linkage.enclosed_data_flows {
        if let Err(err) = group.add_data_flow(
            map_state(&flow.from_state),
            map_key(&flow.from_state, flow.from_key),
            map_state(&flow.to_state),
            map_key(&flow.to_state, flow.to_key),
        ) {
            log::warn!("enclosed data flow not regrouped: {err}");
        }
    }

    // Ingoing transitions land at the group's start state.
    let mut outer_transitions: Vec<Transition> = Vec::new();
    for transition in &linkage.ingoing_transitions {
        if let Some(start) = group.start_state_id() {
            if *start != transition.to_state {
                log::warn!(
                    "ingoing transition to {} dropped: group already starts at {start}",
                    transition.to_state
                );
                continue;
            }
        } else {
            group.set_start_state(Some(transition.to_state.clone()))?;
        }
        outer_transitions.push(Transition::new(
            transition.transition_id,
            transition.from_state.clone(),
            transition.from_outcome,
            group_id.clone(),
            None,
        ));
    }

    // Outgoing transitions exit through a matching group outcome.
    for transition in &linkage.outgoing_transitions {
        let base = transition
            .from_outcome
            .and_then(|outcome| {
                outcome_names.get(&(transition.from_state.clone(), outcome)).cloned()
            })
            .unwrap_or_else(|| "done".to_string());
        let mut name = base.clone();
        let mut counter = 2_u64;
        while group.outcome_by_name(&name).is_some() {
            name = format!("{base}_{counter}");
            counter += 1;
        }
        let group_outcome = group.add_outcome(name)?;
        if let Err(err) = group.add_transition(
            transition.from_state.clone(),
            transition.from_outcome,
            group_id.clone(),
            Some(group_outcome),
        ) {
            log::warn!("outgoing transition not split: {err}");
            continue;
        }
        outer_transitions.push(Transition::new(
            transition.transition_id,
            group_id.clone(),
            Some(group_outcome),
            transition.to_state.clone(),
            transition.to_outcome,
        ));
    }

    // Ingoing data flows enter through a matching group input port.
    let mut outer_flows: Vec<DataFlow> = Vec::new();
    for flow in &linkage.ingoing_data_flows {
        let target_key = (map_state(&flow.to_state), map_key(&flow.to_state, flow.to_key));
        let Some((name, data_type, default_value)) =
            port_defs.get(&(flow.to_state.clone(), flow.to_key)).cloned()
        else {
            log::warn!("ingoing data flow {} dropped: target port unknown", flow.data_flow_id);
            continue;
        };
        let port_name = free_group_port_name(&group, &name);
        let group_input = group.add_input_port(port_name, data_type, default_value)?;
        if let Err(err) =
            group.add_data_flow(group_id.clone(), group_input, target_key.0, target_key.1)
        {
            log::warn!("ingoing data flow not split: {err}");
            continue;
        }
        outer_flows.push(DataFlow::new(
            flow.data_flow_id,
            flow.from_state.clone(),
            flow.from_key,
            group_id.clone(),
            group_input,
        ));
    }

    // Outgoing data flows exit through a matching group output port.
    for flow in &linkage.outgoing_data_flows {
        let source_key = (map_state(&flow.from_state), map_key(&flow.from_state, flow.from_key));
        let Some((name, data_type, default_value)) =
            port_defs.get(&(flow.from_state.clone(), flow.from_key)).cloned()
        else {
            log::warn!("outgoing data flow {} dropped: source port unknown", flow.data_flow_id);
            continue;
        };
        let port_name = free_group_port_name(&group, &name);
        let group_output = group.add_output_port(port_name, data_type, default_value)?;
        if let Err(err) =
            group.add_data_flow(source_key.0, source_key.1, group_id.clone(), group_output)
        {
            log::warn!("outgoing data flow not split: {err}");
            continue;
        }
        outer_flows.push(DataFlow::new(
            flow.data_flow_id,
            group_id.clone(),
            group_output,
            flow.to_state.clone(),
            flow.to_key,
        ));
    }

    // Keep the start linkage intact when the old start state moved inside.
    if let Some(start) = &parent_start
        && child_ids.contains(start)
        && group.start_state_id().is_none()
    {
        group.set_start_state(Some(start.clone()))?;
    }

    parent.add_child_state(group)?;

    for transition in outer_transitions {
        if let Err(err) = parent.add_transition(
            transition.from_state,
            transition.from_outcome,
            transition.to_state,
            transition.to_outcome,
        ) {
            log::warn!("boundary transition not rebuilt: {err}");
        }
    }
    for flow in outer_flows {
        if let Err(err) =
            parent.add_data_flow(flow.from_state, flow.from_key, flow.to_state, flow.to_key)
        {
            log::warn!("boundary data flow not rebuilt: {err}");
        }
    }
    if let Some(start) = parent_start
        && child_ids.contains(&start)
        && parent.start_state_id().is_none()
    {
        parent.set_start_state(Some(group_id.clone()))?;
    }
    Ok(group_id)
}

// ============================================================================
// SECTION: Ungroup
// ============================================================================

/// Dissolves a hierarchy state, moving its content into the parent, and
/// returns the ids of the moved children.
///
/// # Errors
///
/// Returns [`EditError`] when the path names the root, a non-container, or
/// a state inside a library.
pub fn ungroup_state(
    machine: &mut StateMachine,
    path: &StatePath,
) -> Result<Vec<StateId>, EditError> {
    let Some(parent_path) = path.parent() else {
        return Err(EditError::RootState);
    };
    let Some(group_id) = path.leaf().cloned() else {
        return Err(EditError::TargetNotFound(path.to_string()));
    };
    if inside_library(machine, path) {
        return Err(EditError::InsideLibrary);
    }
    let group = machine.state_at(path).ok_or_else(|| EditError::TargetNotFound(path.to_string()))?;
    if group.container().is_none() {
        return Err(EditError::TargetNotAContainer(path.to_string()));
    }
    machine
        .with_state(&parent_path, "ungroup_state", ChangeCause::StructuralEdit, move |parent| {
            ungroup_in_parent(parent, &group_id)
        })
        .map_err(EditError::from)
}

/// Performs the ungroup restructuring inside the parent container.
#[allow(
    clippy::too_many_lines,
    reason = "The boundary stitch is one linear restructuring pass."
)]
fn ungroup_in_parent(
    parent: &mut State,
    group_id: &StateId,
) -> Result<Vec<StateId>, StructureError> {
    let parent_id = parent.state_id().clone();
    let parent_start = parent.start_state_id().cloned();

    // Capture the boundary linkage before it cascades away.
    let ingoing_transitions: Vec<Transition> = parent
        .transitions()
        .iter()
        .filter(|transition| transition.to_state == *group_id)
        .cloned()
        .collect();
    let outgoing_transitions: Vec<Transition> = parent
        .transitions()
        .iter()
        .filter(|transition| transition.from_state == *group_id)
        .cloned()
        .collect();
    let ingoing_flows: Vec<DataFlow> =
        parent.data_flows().iter().filter(|flow| flow.to_state == *group_id).cloned().collect();
    let outgoing_flows: Vec<DataFlow> =
        parent.data_flows().iter().filter(|flow| flow.from_state == *group_id).cloned().collect();

    let group = parent.remove_child_state(group_id)?;
    let was_barrier = group.kind() == StateKind::BarrierConcurrency;
    let group_start = group.start_state_id().cloned();
    let group_transitions: Vec<Transition> = group.transitions().to_vec();
    let group_flows: Vec<DataFlow> = group.data_flows().to_vec();
    let group_variables = group.scoped_variables().to_vec();
    let group_inputs = group.input_ports().to_vec();
    let group_outputs = group.output_ports().to_vec();

    // Move children out, re-keying on collision.
    let mut state_id_map: BTreeMap<StateId, StateId> = BTreeMap::new();
    let mut moved_ids = Vec::new();
    let children: Vec<State> = group.children().cloned().collect();
    for mut child in children {
        if was_barrier && child.state_id().is_decider() {
            log::warn!("decider child of {group_id} dropped during ungroup");
            continue;
        }
        let old_id = child.state_id().clone();
        let mut new_id = old_id.clone();
        while new_id == parent_id || parent.child(&new_id).is_some() {
            new_id = StateId::generate();
        }
        if new_id != old_id {
            child.change_own_id(new_id.clone());
        }
        state_id_map.insert(old_id, new_id.clone());
        parent.add_child_state(child)?;
        moved_ids.push(new_id);
    }

    // Move scoped variables out, re-keying through the id map.
    let mut sv_id_map: BTreeMap<PortId, PortId> = BTreeMap::new();
    for variable in group_variables {
        let mut name = variable.name.clone();
        let mut counter = 2_u64;
        while parent.scoped_variables().iter().any(|existing| existing.name == name) {
            name = format!("{}_{counter}", variable.name);
            counter += 1;
        }
        let new_id = parent.add_scoped_variable(name, variable.data_type, variable.default_value)?;
        sv_id_map.insert(variable.data_port_id, new_id);
    }

    let map_state = |state: &StateId| -> Option<StateId> {
        if *state == *group_id {
            None
        } else {
            Some(state_id_map.get(state).cloned().unwrap_or_else(|| state.clone()))
        }
    };

    // Stitch transitions back together.
    for transition in &group_transitions {
        match (map_state(&transition.from_state), map_state(&transition.to_state)) {
            (Some(from), Some(to)) => {
                if let Err(err) =
                    parent.add_transition(from, transition.from_outcome, to, None)
                {
                    log::warn!("ungrouped transition not rebuilt: {err}");
                }
            }
            (None, Some(_)) => {
                // Start linkage of the group; stitched with the outer ingoing
                // transitions below.
            }
            (Some(from), None) => {
                // Exit through a group outcome; stitch with the outer side.
                let Some(group_outcome) = transition.to_outcome else {
                    continue;
                };
                for outer in &outgoing_transitions {
                    if outer.from_outcome == Some(group_outcome) {
                        if let Err(err) = parent.add_transition(
                            from.clone(),
                            transition.from_outcome,
                            outer.to_state.clone(),
                            outer.to_outcome,
                        ) {
                            log::warn!("exit transition not stitched: {err}");
                        }
                    }
                }
            }
            (None, None) => {}
        }
    }
    if let Some(start) = &group_start
        && let Some(start) = state_id_map.get(start).cloned()
    {
        for outer in &ingoing_transitions {
            if let Err(err) = parent.add_transition(
                outer.from_state.clone(),
                outer.from_outcome,
                start.clone(),
                None,
            ) {
                log::warn!("entry transition not stitched: {err}");
            }
        }
    }

    // Stitch data flows back together.
    let group_input_ids: BTreeSet<PortId> =
        group_inputs.iter().map(|port| port.data_port_id).collect();
    let group_output_ids: BTreeSet<PortId> =
        group_outputs.iter().map(|port| port.data_port_id).collect();
    let resolve = |state: &StateId, key: PortId| -> Endpoint {
        if *state == *group_id {
            if let Some(mapped) = sv_id_map.get(&key) {
                Endpoint::Mapped(parent_id.clone(), *mapped)
            } else if group_input_ids.contains(&key) {
                Endpoint::GroupInput(key)
            } else if group_output_ids.contains(&key) {
                Endpoint::GroupOutput(key)
            } else {
                Endpoint::Dangling
            }
        } else {
            Endpoint::Mapped(
                state_id_map.get(state).cloned().unwrap_or_else(|| state.clone()),
                key,
            )
        }
    };

    for flow in &group_flows {
        let source = resolve(&flow.from_state, flow.from_key);
        let target = resolve(&flow.to_state, flow.to_key);
        match (source, target) {
            (Endpoint::Mapped(from_state, from_key), Endpoint::Mapped(to_state, to_key)) => {
                if let Err(err) = parent.add_data_flow(from_state, from_key, to_state, to_key) {
                    log::warn!("ungrouped data flow not rebuilt: {err}");
                }
            }
            (Endpoint::GroupInput(port), Endpoint::Mapped(to_state, to_key)) => {
                for outer in &ingoing_flows {
                    if outer.to_key == port
                        && let Err(err) = parent.add_data_flow(
                            outer.from_state.clone(),
                            outer.from_key,
                            to_state.clone(),
                            to_key,
                        )
                    {
                        log::warn!("entry data flow not stitched: {err}");
                    }
                }
            }
            (Endpoint::Mapped(from_state, from_key), Endpoint::GroupOutput(port)) => {
                for outer in &outgoing_flows {
                    if outer.from_key == port
                        && let Err(err) = parent.add_data_flow(
                            from_state.clone(),
                            from_key,
                            outer.to_state.clone(),
                            outer.to_key,
                        )
                    {
                        log::warn!("exit data flow not stitched: {err}");
                    }
                }
            }
            _ => {
                log::warn!("data flow {} dropped during ungroup", flow.data_flow_id);
            }
        }
    }

    // The parent start moves to the group's start child.
    if parent_start.as_ref() == Some(group_id)
        && let Some(start) = group_start.and_then(|start| state_id_map.get(&start).cloned())
    {
        parent.set_start_state(Some(start))?;
    }
    Ok(moved_ids)
}

/// Flow endpoint classification during ungroup.
enum Endpoint {
    /// Endpoint mapped into the parent's namespace.
    Mapped(StateId, PortId),
    /// Boundary input port of the dissolved group.
    GroupInput(PortId),
    /// Boundary output port of the dissolved group.
    GroupOutput(PortId),
    /// Endpoint that no longer resolves.
    Dangling,
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns a free boundary port name on the group.
fn free_group_port_name(group: &State, base: &str) -> String {
    let taken = |name: &str| {
        group.input_ports().iter().any(|port| port.name == name)
            || group.output_ports().iter().any(|port| port.name == name)
    };
    if !taken(base) {
        return base.to_string();
    }
    let mut counter = 2_u64;
    let mut name = format!("{base}_{counter}");
    while taken(&name) {
        counter += 1;
        name = format!("{base}_{counter}");
    }
    name
}
