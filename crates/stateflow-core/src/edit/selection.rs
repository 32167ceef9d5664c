// stateflow-core/src/edit/selection.rs
// ============================================================================
// Module: Stateflow Selection
// Description: Kind-partitioned element selection with reduction helpers.
// Purpose: Prepare closed element sets for copy, cut, and group operations.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! A selection partitions chosen elements by kind: states, outcomes, input
//! and output ports, scoped variables, transitions, and data flows. If a
//! state and one of its descendants are both selected, only the ancestor is
//! kept. Reduction trims the selection to one shared parent; smart extension
//! closes it under its linkage by dropping half-covered transitions and data
//! flows and adding fully covered ones.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DataFlowId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TransitionId;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::machine::StateMachine;
use crate::core::path::StatePath;

// ============================================================================
// SECTION: Element Kinds
// ============================================================================

/// Kind of a selectable element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Child states.
    States,
    /// Outcomes of the copy-parent state.
    Outcomes,
    /// Input ports of the copy-parent state.
    InputPorts,
    /// Output ports of the copy-parent state.
    OutputPorts,
    /// Scoped variables of the copy-parent state.
    ScopedVariables,
    /// Transitions of the copy-parent container.
    Transitions,
    /// Data flows of the copy-parent container.
    DataFlows,
}

/// One selected element addressed by path and id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectedElement {
    /// A state addressed by its path.
    State(StatePath),
    /// An outcome of the state at the path.
    Outcome(StatePath, OutcomeId),
    /// An input port of the state at the path.
    InputPort(StatePath, PortId),
    /// An output port of the state at the path.
    OutputPort(StatePath, PortId),
    /// A scoped variable of the container at the path.
    ScopedVariable(StatePath, PortId),
    /// A transition of the container at the path.
    Transition(StatePath, TransitionId),
    /// A data flow of the container at the path.
    DataFlow(StatePath, DataFlowId),
}

impl SelectedElement {
    /// Returns the kind partition of the element.
    #[must_use]
    pub const fn kind(&self) -> SelectionKind {
        match self {
            Self::State(_) => SelectionKind::States,
            Self::Outcome(..) => SelectionKind::Outcomes,
            Self::InputPort(..) => SelectionKind::InputPorts,
            Self::OutputPort(..) => SelectionKind::OutputPorts,
            Self::ScopedVariable(..) => SelectionKind::ScopedVariables,
            Self::Transition(..) => SelectionKind::Transitions,
            Self::DataFlow(..) => SelectionKind::DataFlows,
        }
    }

    /// Returns the path of the state the element belongs to.
    ///
    /// For states this is the state itself; for every other kind it is the
    /// owning state.
    #[must_use]
    pub const fn owner(&self) -> &StatePath {
        match self {
            Self::State(path)
            | Self::Outcome(path, _)
            | Self::InputPort(path, _)
            | Self::OutputPort(path, _)
            | Self::ScopedVariable(path, _)
            | Self::Transition(path, _)
            | Self::DataFlow(path, _) => path,
        }
    }

    /// Returns the parent path the element hangs under for reduction.
    #[must_use]
    pub fn reduction_parent(&self) -> Option<StatePath> {
        match self {
            Self::State(path) => path.parent(),
            _ => Some(self.owner().clone()),
        }
    }
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Kind-partitioned set of selected elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected elements.
    elements: BTreeSet<SelectedElement>,
}

impl Selection {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element, keeping the ancestor-swallows-descendant invariant.
    pub fn add(&mut self, element: SelectedElement) {
        if let SelectedElement::State(path) = &element {
            let covered = self.elements.iter().any(|existing| {
                matches!(existing, SelectedElement::State(existing_path)
                    if existing_path.is_ancestor_of(path) || existing_path == path)
            });
            if covered {
                return;
            }
            self.elements.retain(|existing| {
                let owner = existing.owner();
                !(path.is_ancestor_of(owner) || (owner == path && !matches!(existing, SelectedElement::State(_))))
            });
        } else {
            let owner = element.owner();
            let swallowed = self.elements.iter().any(|existing| {
                matches!(existing, SelectedElement::State(existing_path)
                    if existing_path.is_ancestor_of(owner) || existing_path == owner)
            });
            if swallowed {
                return;
            }
        }
        self.elements.insert(element);
    }

    /// Removes an element.
    pub fn remove(&mut self, element: &SelectedElement) {
        self.elements.remove(element);
    }

    /// Replaces the selection with the given elements.
    pub fn set(&mut self, elements: impl IntoIterator<Item = SelectedElement>) {
        self.clear();
        for element in elements {
            self.add(element);
        }
    }

    /// Clears the selection.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Returns every selected element.
    #[must_use]
    pub fn get_all(&self) -> Vec<SelectedElement> {
        self.elements.iter().cloned().collect()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the elements of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: SelectionKind) -> Vec<SelectedElement> {
        self.elements.iter().filter(|element| element.kind() == kind).cloned().collect()
    }

    /// Returns the selected child state ids under a parent path.
    #[must_use]
    pub fn child_ids_under(&self, parent: &StatePath) -> BTreeSet<StateId> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                SelectedElement::State(path) if path.parent().as_ref() == Some(parent) => {
                    path.leaf().cloned()
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the selected port and scoped-variable ids owned by a state.
    #[must_use]
    pub fn port_ids_on(&self, owner: &StatePath) -> BTreeSet<PortId> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                SelectedElement::InputPort(path, id)
                | SelectedElement::OutputPort(path, id)
                | SelectedElement::ScopedVariable(path, id)
                    if path == owner =>
                {
                    Some(*id)
                }
                _ => None,
            })
            .collect()
    }

    /// Returns the selected outcome ids owned by a state.
    #[must_use]
    pub fn outcome_ids_on(&self, owner: &StatePath) -> BTreeSet<OutcomeId> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                SelectedElement::Outcome(path, id) if path == owner => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Reduces the selection to elements sharing one parent.
    ///
    /// The parent with the most selected elements wins; the rest is dropped.
    /// Returns the winning parent path, or `None` for an empty selection or
    /// a selected root state.
    pub fn reduce_to_one_parent(&mut self) -> Option<StatePath> {
        if self.elements.is_empty() {
            return None;
        }
        let mut counts: BTreeMap<StatePath, usize> = BTreeMap::new();
        for element in &self.elements {
            if let Some(parent) = element.reduction_parent() {
                *counts.entry(parent).or_default() += 1;
            }
        }
        let parent = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(parent, _)| parent);
        let Some(parent) = parent else {
            // Only a root state can lack a reduction parent; keep it alone.
            let root = self
                .elements
                .iter()
                .find(|element| matches!(element, SelectedElement::State(_)))
                .cloned();
            self.elements.clear();
            if let Some(root) = root {
                self.elements.insert(root);
            }
            return None;
        };
        self.elements.retain(|element| element.reduction_parent().as_ref() == Some(&parent));
        Some(parent)
    }

    /// Applies smart linkage extension relative to a reduced parent.
    ///
    /// Transitions and data flows not fully covered by the selection are
    /// dropped; linkage with both endpoints covered is added.
    pub fn smart_extension(&mut self, machine: &StateMachine, parent_path: &StatePath) {
        let Some(parent) = machine.state_at(parent_path) else {
            return;
        };
        let child_ids = self.child_ids_under(parent_path);
        let port_ids = self.port_ids_on(parent_path);
        let outcome_ids = self.outcome_ids_on(parent_path);

        let covers_transition = |transition: &Transition| {
            let origin = child_ids.contains(&transition.from_state);
            let target = child_ids.contains(&transition.to_state)
                || (transition.to_state == *parent.state_id()
                    && transition.to_outcome.is_some_and(|outcome| outcome_ids.contains(&outcome)));
            origin && target
        };
        let covers_flow = |flow: &DataFlow| {
            let origin = child_ids.contains(&flow.from_state)
                || (flow.from_state == *parent.state_id() && port_ids.contains(&flow.from_key));
            let target = child_ids.contains(&flow.to_state)
                || (flow.to_state == *parent.state_id() && port_ids.contains(&flow.to_key));
            origin && target
        };

        // Drop half-covered linkage from the selection.
        self.elements.retain(|element| match element {
            SelectedElement::Transition(path, id) if path == parent_path => {
                parent.transition(*id).is_some_and(covers_transition)
            }
            SelectedElement::DataFlow(path, id) if path == parent_path => {
                parent.data_flow(*id).is_some_and(covers_flow)
            }
            _ => true,
        });

        // Add fully covered linkage.
        for transition in parent.transitions() {
            if covers_transition(transition) {
                self.elements.insert(SelectedElement::Transition(
                    parent_path.clone(),
                    transition.transition_id,
                ));
            }
        }
        for flow in parent.data_flows() {
            if covers_flow(flow) {
                self.elements
                    .insert(SelectedElement::DataFlow(parent_path.clone(), flow.data_flow_id));
            }
        }
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns true if the path or one of its ancestors is a library state.
#[must_use]
pub fn inside_library(machine: &StateMachine, path: &StatePath) -> bool {
    let mut current = path.clone();
    loop {
        if machine
            .state_at(&current)
            .is_some_and(|state| state.library_reference().is_some())
        {
            return true;
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}
