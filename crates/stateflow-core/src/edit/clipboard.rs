// stateflow-core/src/edit/clipboard.rs
// ============================================================================
// Module: Stateflow Clipboard
// Description: Copy, cut, and paste of state subtrees with id remapping.
// Purpose: Re-insert deep-copied element sets with repaired references.
// Dependencies: crate::core, crate::edit::selection, log
// ============================================================================

//! ## Overview
//! The clipboard owns deep copies of the selected elements; paste never
//! consumes it and re-copies on every use. Insertion order is states first,
//! then outcomes, ports, and scoped variables, and transitions and data
//! flows last, rewriting endpoints through three remap tables. Copied
//! linkage whose endpoints were not pasted is dropped with a warning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::identifiers::DataFlowId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TransitionId;
use crate::core::identifiers::next_numeric_id;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::machine::StateMachine;
use crate::core::outcomes::Outcome;
use crate::core::path::StatePath;
use crate::core::ports::DataPort;
use crate::core::ports::PortDirection;
use crate::core::ports::ScopedVariable;
use crate::core::state::State;
use crate::core::validate::StructureError;
use crate::edit::selection::SelectedElement;
use crate::edit::selection::Selection;
use crate::edit::selection::SelectionKind;
use crate::edit::selection::inside_library;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural edit errors.
#[derive(Debug, Error)]
pub enum EditError {
    /// Nothing is selected.
    #[error("selection is empty")]
    EmptySelection,
    /// The paste or edit target does not resolve.
    #[error("target state not found: {0}")]
    TargetNotFound(String),
    /// The operation would reach inside a library state.
    #[error("elements inside a library state cannot be edited")]
    InsideLibrary,
    /// The operation needs a container target.
    #[error("target state {0} is not a container")]
    TargetNotAContainer(String),
    /// The root state cannot be replaced or ungrouped.
    #[error("operation not applicable to the root state")]
    RootState,
    /// A structural mutation failed.
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Limits restricting which element kinds a paste inserts.
pub type PasteLimits = BTreeSet<SelectionKind>;

/// Outcome of one paste operation.
#[derive(Debug, Default)]
pub struct PasteReport {
    /// Ids of the inserted states.
    pub pasted_states: Vec<StateId>,
    /// Ids of the inserted transitions.
    pub pasted_transitions: Vec<TransitionId>,
    /// Ids of the inserted data flows.
    pub pasted_data_flows: Vec<DataFlowId>,
    /// Ids of the inserted outcomes.
    pub pasted_outcomes: Vec<OutcomeId>,
    /// Ids of the inserted ports and scoped variables.
    pub pasted_ports: Vec<PortId>,
    /// Number of copied elements dropped with a warning.
    pub dropped: usize,
}

// ============================================================================
// SECTION: Clipboard
// ============================================================================

/// Clipboard holding deep copies of one reduced selection.
#[derive(Debug, Default, Clone)]
pub struct Clipboard {
    /// Copied child states.
    states: Vec<State>,
    /// Copied transitions of the copy parent.
    transitions: Vec<Transition>,
    /// Copied data flows of the copy parent.
    data_flows: Vec<DataFlow>,
    /// Copied outcomes of the copy parent.
    outcomes: Vec<Outcome>,
    /// Copied input ports of the copy parent.
    input_ports: Vec<DataPort>,
    /// Copied output ports of the copy parent.
    output_ports: Vec<DataPort>,
    /// Copied scoped variables of the copy parent.
    scoped_variables: Vec<ScopedVariable>,
    /// Id of the state the elements were copied from.
    copy_parent_state_id: Option<StateId>,
}

impl Clipboard {
    /// Creates an empty clipboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the selection, applying reduction and, when `smart` is set,
    /// smart linkage extension.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::EmptySelection`] when nothing remains selected.
    pub fn copy(
        &mut self,
        machine: &StateMachine,
        selection: &mut Selection,
        smart: bool,
    ) -> Result<(), EditError> {
        self.reset();
        self.capture(machine, selection, smart)
    }

    /// Cuts the selection: copies it, then removes it from the machine.
    ///
    /// # Errors
    ///
    /// Returns [`EditError`] when the selection is empty, reaches inside a
    /// library state, or removal fails.
    pub fn cut(
        &mut self,
        machine: &mut StateMachine,
        selection: &mut Selection,
        smart: bool,
    ) -> Result<(), EditError> {
        self.reset();
        self.capture(machine, selection, smart)?;
        let elements = selection.get_all();
        for element in &elements {
            if inside_library(machine, element.owner()) {
                return Err(EditError::InsideLibrary);
            }
        }

        // Linkage first so state removal does not cascade it away twice.
        for element in &elements {
            match element {
                SelectedElement::Transition(parent, id) => {
                    machine.remove_transition(parent, *id)?;
                }
                SelectedElement::DataFlow(parent, id) => {
                    machine.remove_data_flow(parent, *id)?;
                }
                _ => {}
            }
        }
        for element in &elements {
            match element {
                SelectedElement::State(path) => {
                    if let (Some(parent), Some(leaf)) = (path.parent(), path.leaf().cloned()) {
                        machine.remove_state(&parent, &leaf)?;
                    }
                }
                SelectedElement::Outcome(path, id) => {
                    machine.remove_outcome(path, *id)?;
                }
                SelectedElement::InputPort(path, id) => {
                    machine.remove_input_port(path, *id)?;
                }
                SelectedElement::OutputPort(path, id) => {
                    machine.remove_output_port(path, *id)?;
                }
                SelectedElement::ScopedVariable(path, id) => {
                    machine.remove_scoped_variable(path, *id)?;
                }
                SelectedElement::Transition(..) | SelectedElement::DataFlow(..) => {}
            }
        }
        selection.clear();
        Ok(())
    }

    /// Pastes the clipboard content into a target state.
    ///
    /// `limits` restricts the inserted element kinds; with `convert` set and
    /// exactly one port-like kind in `limits`, every copied port and scoped
    /// variable is inserted as that kind.
    ///
    /// # Errors
    ///
    /// Returns [`EditError`] when the target does not resolve or is inside a
    /// library state.
    pub fn paste(
        &self,
        machine: &mut StateMachine,
        target: &StatePath,
        limits: Option<&PasteLimits>,
        convert: bool,
    ) -> Result<PasteReport, EditError> {
        let target_state =
            machine.state_at(target).ok_or_else(|| EditError::TargetNotFound(target.to_string()))?;
        if inside_library(machine, target) {
            return Err(EditError::InsideLibrary);
        }
        let target_id = target_state.state_id().clone();
        let target_is_container = target_state.container().is_some();
        let existing_child_ids: BTreeSet<StateId> =
            target_state.children().map(|child| child.state_id().clone()).collect();

        // Paste never consumes the clipboard; work on a fresh deep copy.
        let copied = self.clone();
        let mut report = PasteReport::default();
        let mut state_id_map: BTreeMap<StateId, StateId> = BTreeMap::new();
        let mut outcome_id_map: BTreeMap<(StateId, OutcomeId), OutcomeId> = BTreeMap::new();
        let mut port_id_map: BTreeMap<(StateId, PortId), PortId> = BTreeMap::new();
        if let Some(copy_parent) = &copied.copy_parent_state_id {
            state_id_map.insert(copy_parent.clone(), target_id.clone());
        }

        let insert_kind =
            |kind: SelectionKind| limits.is_none_or(|limits| limits.contains(&kind));

        // States first, with fresh ids on collision.
        if insert_kind(SelectionKind::States) && target_is_container {
            let mut used_ids = existing_child_ids;
            used_ids.insert(target_id.clone());
            for mut state in copied.states.clone() {
                let old_id = state.state_id().clone();
                let mut new_id = old_id.clone();
                while used_ids.contains(&new_id) {
                    new_id = StateId::generate();
                }
                if new_id != old_id {
                    log::debug!("pasted state re-keyed from {old_id} to {new_id}");
                    state.change_own_id(new_id.clone());
                }
                used_ids.insert(new_id.clone());
                match machine.add_state(target, state) {
                    Ok(id) => {
                        state_id_map.insert(old_id, id.clone());
                        report.pasted_states.push(id);
                    }
                    Err(err) => {
                        log::warn!("pasted state {old_id} dropped: {err}");
                        report.dropped += 1;
                    }
                }
            }
        }

        // Outcomes, ports, and scoped variables with name-collision suffixes.
        if insert_kind(SelectionKind::Outcomes) {
            for outcome in &copied.outcomes {
                let name = free_outcome_name(machine, target, &outcome.name);
                match machine.add_outcome(target, name) {
                    Ok(id) => {
                        if let Some(copy_parent) = &copied.copy_parent_state_id {
                            outcome_id_map.insert((copy_parent.clone(), outcome.outcome_id), id);
                        }
                        report.pasted_outcomes.push(id);
                    }
                    Err(err) => {
                        log::warn!("pasted outcome '{}' dropped: {err}", outcome.name);
                        report.dropped += 1;
                    }
                }
            }
        }

        let port_groups = copied.port_groups(limits, convert);
        for (kind, ports) in port_groups {
            for port in ports {
                let name = free_port_name(machine, target, kind, &port.name);
                let result = match kind {
                    SelectionKind::InputPorts => {
                        machine.add_input_port(target, name, port.data_type, port.default_value.clone())
                    }
                    SelectionKind::OutputPorts => {
                        machine.add_output_port(target, name, port.data_type, port.default_value.clone())
                    }
                    _ => machine.add_scoped_variable(
                        target,
                        name,
                        port.data_type,
                        port.default_value.clone(),
                    ),
                };
                match result {
                    Ok(id) => {
                        if let Some(copy_parent) = &copied.copy_parent_state_id {
                            port_id_map.insert((copy_parent.clone(), port.data_port_id), id);
                        }
                        report.pasted_ports.push(id);
                    }
                    Err(err) => {
                        log::warn!("pasted port '{}' dropped: {err}", port.name);
                        report.dropped += 1;
                    }
                }
            }
        }

        // Transitions and data flows last, rewritten through the maps.
        if insert_kind(SelectionKind::Transitions) {
            for transition in &copied.transitions {
                let Some(from_state) = state_id_map.get(&transition.from_state) else {
                    log::warn!("pasted transition {} dropped: origin not pasted", transition.transition_id);
                    report.dropped += 1;
                    continue;
                };
                let Some(to_state) = state_id_map.get(&transition.to_state) else {
                    log::warn!("pasted transition {} dropped: target not pasted", transition.transition_id);
                    report.dropped += 1;
                    continue;
                };
                let from_outcome = transition.from_outcome.map(|outcome| {
                    outcome_id_map
                        .get(&(transition.from_state.clone(), outcome))
                        .copied()
                        .unwrap_or(outcome)
                });
                let to_outcome = transition.to_outcome.map(|outcome| {
                    outcome_id_map
                        .get(&(transition.to_state.clone(), outcome))
                        .copied()
                        .unwrap_or(outcome)
                });
                match machine.add_transition(
                    target,
                    from_state.clone(),
                    from_outcome,
                    to_state.clone(),
                    to_outcome,
                ) {
                    Ok(id) => report.pasted_transitions.push(id),
                    Err(err) => {
                        log::warn!("pasted transition dropped: {err}");
                        report.dropped += 1;
                    }
                }
            }
        }
        if insert_kind(SelectionKind::DataFlows) {
            for flow in &copied.data_flows {
                let Some(from_state) = state_id_map.get(&flow.from_state) else {
                    log::warn!("pasted data flow {} dropped: origin not pasted", flow.data_flow_id);
                    report.dropped += 1;
                    continue;
                };
                let Some(to_state) = state_id_map.get(&flow.to_state) else {
                    log::warn!("pasted data flow {} dropped: target not pasted", flow.data_flow_id);
                    report.dropped += 1;
                    continue;
                };
                let from_key = port_id_map
                    .get(&(flow.from_state.clone(), flow.from_key))
                    .copied()
                    .unwrap_or(flow.from_key);
                let to_key = port_id_map
                    .get(&(flow.to_state.clone(), flow.to_key))
                    .copied()
                    .unwrap_or(flow.to_key);
                match machine.add_data_flow(target, from_state.clone(), from_key, to_state.clone(), to_key)
                {
                    Ok(id) => report.pasted_data_flows.push(id),
                    Err(err) => {
                        log::warn!("pasted data flow dropped: {err}");
                        report.dropped += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Clears the clipboard content and remap bookkeeping.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Captures deep copies of a reduced (and optionally smart-extended)
    /// selection.
    fn capture(
        &mut self,
        machine: &StateMachine,
        selection: &mut Selection,
        smart: bool,
    ) -> Result<(), EditError> {
        if selection.is_empty() {
            return Err(EditError::EmptySelection);
        }
        let parent_path = selection.reduce_to_one_parent();
        if let Some(parent_path) = &parent_path {
            if smart {
                selection.smart_extension(machine, parent_path);
            }
            self.copy_parent_state_id =
                machine.state_at(parent_path).map(|state| state.state_id().clone());
        }

        for element in selection.get_all() {
            match &element {
                SelectedElement::State(path) => {
                    if let Some(state) = machine.state_at(path) {
                        self.states.push(state.clone());
                    }
                }
                SelectedElement::Outcome(path, id) => {
                    if let Some(outcome) =
                        machine.state_at(path).and_then(|state| state.outcome(*id))
                    {
                        self.outcomes.push(outcome.clone());
                    }
                }
                SelectedElement::InputPort(path, id) => {
                    if let Some(port) =
                        machine.state_at(path).and_then(|state| state.input_port(*id))
                    {
                        self.input_ports.push(port.clone());
                    }
                }
                SelectedElement::OutputPort(path, id) => {
                    if let Some(port) =
                        machine.state_at(path).and_then(|state| state.output_port(*id))
                    {
                        self.output_ports.push(port.clone());
                    }
                }
                SelectedElement::ScopedVariable(path, id) => {
                    if let Some(variable) =
                        machine.state_at(path).and_then(|state| state.scoped_variable(*id))
                    {
                        self.scoped_variables.push(variable.clone());
                    }
                }
                SelectedElement::Transition(path, id) => {
                    if let Some(transition) =
                        machine.state_at(path).and_then(|state| state.transition(*id))
                    {
                        self.transitions.push(transition.clone());
                    }
                }
                SelectedElement::DataFlow(path, id) => {
                    if let Some(flow) = machine.state_at(path).and_then(|state| state.data_flow(*id))
                    {
                        self.data_flows.push(flow.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Groups the copied ports by insertion kind, honoring limits and the
    /// conversion mode.
    fn port_groups(
        &self,
        limits: Option<&PasteLimits>,
        convert: bool,
    ) -> Vec<(SelectionKind, Vec<DataPort>)> {
        let port_kinds = [
            SelectionKind::InputPorts,
            SelectionKind::OutputPorts,
            SelectionKind::ScopedVariables,
        ];
        let as_ports = |variables: &[ScopedVariable]| {
            variables
                .iter()
                .map(|variable| {
                    DataPort::new(
                        variable.data_port_id,
                        variable.name.clone(),
                        variable.data_type,
                        variable.default_value.clone(),
                    )
                })
                .collect::<Vec<_>>()
        };

        if convert
            && let Some(limits) = limits
        {
            let selected: Vec<SelectionKind> = port_kinds
                .iter()
                .copied()
                .filter(|kind| limits.contains(kind))
                .collect();
            if let [kind] = selected[..] {
                let mut combined = self.input_ports.clone();
                combined.extend(self.output_ports.clone());
                combined.extend(as_ports(&self.scoped_variables));
                return vec![(kind, combined)];
            }
        }

        let mut groups = Vec::new();
        if limits.is_none_or(|limits| limits.contains(&SelectionKind::InputPorts)) {
            groups.push((SelectionKind::InputPorts, self.input_ports.clone()));
        }
        if limits.is_none_or(|limits| limits.contains(&SelectionKind::OutputPorts)) {
            groups.push((SelectionKind::OutputPorts, self.output_ports.clone()));
        }
        if limits.is_none_or(|limits| limits.contains(&SelectionKind::ScopedVariables)) {
            groups.push((SelectionKind::ScopedVariables, as_ports(&self.scoped_variables)));
        }
        groups
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns a free outcome name on the target, suffixing on collision.
fn free_outcome_name(machine: &StateMachine, target: &StatePath, name: &str) -> String {
    let Some(state) = machine.state_at(target) else {
        return name.to_string();
    };
    if state.outcome_by_name(name).is_none() {
        return name.to_string();
    }
    let suffix = crate::core::identifiers::next_outcome_id(
        state.outcomes().iter().map(|outcome| outcome.outcome_id.as_raw()),
    );
    format!("{name}_{suffix}")
}

/// Returns a free port name on the target, suffixing on collision.
fn free_port_name(
    machine: &StateMachine,
    target: &StatePath,
    kind: SelectionKind,
    name: &str,
) -> String {
    let Some(state) = machine.state_at(target) else {
        return name.to_string();
    };
    let taken = match kind {
        SelectionKind::InputPorts => state.port_by_name(PortDirection::Input, name).is_some(),
        SelectionKind::OutputPorts => state.port_by_name(PortDirection::Output, name).is_some(),
        _ => state.scoped_variables().iter().any(|variable| variable.name == name),
    };
    if !taken {
        return name.to_string();
    }
    let suffix = next_numeric_id(state.used_port_ids().map(PortId::as_raw));
    format!("{name}_{suffix}")
}
