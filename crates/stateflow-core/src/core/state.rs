// stateflow-core/src/core/state.rs
// ============================================================================
// Module: Stateflow State Tree
// Description: States, container cores, and validated structural mutation.
// Purpose: Own the state tree and enforce the structural invariants.
// Dependencies: crate::core::{identifiers, linkage, outcomes, ports, value}, log, serde
// ============================================================================

//! ## Overview
//! A state is the shared record (id, name, ports, outcomes) plus one of five
//! variants: execution, hierarchy, barrier concurrency, preemptive
//! concurrency, or library. Containers exclusively own their children,
//! transitions, data flows, and scoped variables. Every mutation validates
//! against the structural invariants before committing and leaves the tree
//! unchanged on failure.

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
use crate::core::identifiers::next_numeric_id;
use crate::core::identifiers::next_outcome_id;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::outcomes::Outcome;
use crate::core::ports::DataPort;
use crate::core::ports::PortDirection;
use crate::core::ports::ScopedVariable;
use crate::core::validate::StructureError;
use crate::core::value::TypeName;
use crate::core::value::Value;

// ============================================================================
// SECTION: State Kind
// ============================================================================

/// Discriminant of the five state variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Leaf state running a script.
    Execution,
    /// Container advancing one child at a time.
    Hierarchy,
    /// Container running all children and deciding on their outcomes.
    BarrierConcurrency,
    /// Container finishing as soon as one child finishes.
    PreemptiveConcurrency,
    /// State delegating to another persisted state machine.
    Library,
}

impl StateKind {
    /// Returns true if states of this kind own children.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Hierarchy | Self::BarrierConcurrency | Self::PreemptiveConcurrency)
    }

    /// Returns true if states of this kind run children concurrently.
    #[must_use]
    pub const fn is_concurrency(self) -> bool {
        matches!(self, Self::BarrierConcurrency | Self::PreemptiveConcurrency)
    }
}

// ============================================================================
// SECTION: Script Source
// ============================================================================

/// Script attached to an execution state.
///
/// The source is interpreted by the configured script host; the core never
/// evaluates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScriptSource {
    /// Host-interpreted script text or routine name.
    pub source: String,
}

impl ScriptSource {
    /// Creates a script source from text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Returns true if no script text is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

// ============================================================================
// SECTION: Library Reference
// ============================================================================

/// Reference to a persisted state machine backing a library state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryReference {
    /// Provider-scoped path of the referenced library.
    pub library_path: String,
}

impl LibraryReference {
    /// Creates a new library reference.
    #[must_use]
    pub fn new(library_path: impl Into<String>) -> Self {
        Self {
            library_path: library_path.into(),
        }
    }
}

// ============================================================================
// SECTION: Container Core
// ============================================================================

/// Child states and linkage owned by a container state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContainerCore {
    /// Child states by id.
    pub(crate) children: BTreeMap<StateId, State>,
    /// Transitions between children and the container boundary.
    pub(crate) transitions: Vec<Transition>,
    /// Data flows between children, the container boundary, and variables.
    pub(crate) data_flows: Vec<DataFlow>,
    /// Scoped variables of the container.
    pub(crate) scoped_variables: Vec<ScopedVariable>,
    /// Child executed first, if any.
    pub(crate) start_state_id: Option<StateId>,
}

// ============================================================================
// SECTION: State Variant
// ============================================================================

/// Variant payload of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateVariant {
    /// Leaf state carrying a script.
    Execution {
        /// Script producing outputs and selecting an outcome.
        script: ScriptSource,
    },
    /// Container advancing one child at a time.
    Hierarchy(ContainerCore),
    /// Container running all children to completion, then a decider.
    BarrierConcurrency(ContainerCore),
    /// Container finishing with the first child to finish.
    PreemptiveConcurrency(ContainerCore),
    /// State delegating to a referenced library machine.
    Library(LibraryReference),
}

impl StateVariant {
    /// Returns the kind discriminant of this variant.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::Execution {
                ..
            } => StateKind::Execution,
            Self::Hierarchy(_) => StateKind::Hierarchy,
            Self::BarrierConcurrency(_) => StateKind::BarrierConcurrency,
            Self::PreemptiveConcurrency(_) => StateKind::PreemptiveConcurrency,
            Self::Library(_) => StateKind::Library,
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Node of the state tree.
///
/// # Invariants
/// - The outcome list always contains the reserved outcomes.
/// - Port names are unique per direction; outcome names are unique.
/// - Container linkage references live endpoints only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// State identifier, unique among siblings.
    state_id: StateId,
    /// Human-readable state name.
    name: String,
    /// Ordered input ports.
    input_ports: Vec<DataPort>,
    /// Ordered output ports.
    output_ports: Vec<DataPort>,
    /// Ordered outcomes, containing at least the reserved set.
    outcomes: Vec<Outcome>,
    /// Variant payload.
    variant: StateVariant,
}

impl State {
    /// Creates a new execution state with the standard outcomes.
    #[must_use]
    pub fn new_execution(state_id: StateId, name: impl Into<String>) -> Self {
        Self::with_variant(state_id, name, StateVariant::Execution {
            script: ScriptSource::default(),
        })
    }

    /// Creates a new hierarchy state with the standard outcomes.
    #[must_use]
    pub fn new_hierarchy(state_id: StateId, name: impl Into<String>) -> Self {
        Self::with_variant(state_id, name, StateVariant::Hierarchy(ContainerCore::default()))
    }

    /// Creates a new barrier-concurrency state including its decider child.
    #[must_use]
    pub fn new_barrier(state_id: StateId, name: impl Into<String>) -> Self {
        let mut core = ContainerCore::default();
        let decider = Self::new_execution(StateId::decider(), "decider");
        core.children.insert(decider.state_id.clone(), decider);
        Self::with_variant(state_id, name, StateVariant::BarrierConcurrency(core))
    }

    /// Creates a new preemptive-concurrency state with the standard outcomes.
    #[must_use]
    pub fn new_preemptive(state_id: StateId, name: impl Into<String>) -> Self {
        Self::with_variant(
            state_id,
            name,
            StateVariant::PreemptiveConcurrency(ContainerCore::default()),
        )
    }

    /// Creates a new library state referencing a persisted machine.
    #[must_use]
    pub fn new_library(
        state_id: StateId,
        name: impl Into<String>,
        library_path: impl Into<String>,
    ) -> Self {
        Self::with_variant(state_id, name, StateVariant::Library(LibraryReference::new(library_path)))
    }

    /// Creates a state from shared fields and a variant payload.
    fn with_variant(state_id: StateId, name: impl Into<String>, variant: StateVariant) -> Self {
        Self {
            state_id,
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            outcomes: Outcome::standard_set(),
            variant,
        }
    }

    /// Rebuilds a state from stored parts; callers re-validate the tree.
    pub(crate) fn from_parts(
        state_id: StateId,
        name: String,
        input_ports: Vec<DataPort>,
        output_ports: Vec<DataPort>,
        outcomes: Vec<Outcome>,
        variant: StateVariant,
    ) -> Self {
        Self {
            state_id,
            name,
            input_ports,
            output_ports,
            outcomes,
            variant,
        }
    }

    // ------------------------------------------------------------------
    // Shared accessors
    // ------------------------------------------------------------------

    /// Returns the state identifier.
    #[must_use]
    pub const fn state_id(&self) -> &StateId {
        &self.state_id
    }

    /// Returns the state name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the state.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the variant kind.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        self.variant.kind()
    }

    /// Returns the variant payload.
    #[must_use]
    pub const fn variant(&self) -> &StateVariant {
        &self.variant
    }

    /// Returns the ordered input ports.
    #[must_use]
    pub fn input_ports(&self) -> &[DataPort] {
        &self.input_ports
    }

    /// Returns the ordered output ports.
    #[must_use]
    pub fn output_ports(&self) -> &[DataPort] {
        &self.output_ports
    }

    /// Returns the ordered outcomes.
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Returns the script of an execution state.
    #[must_use]
    pub const fn script(&self) -> Option<&ScriptSource> {
        match &self.variant {
            StateVariant::Execution {
                script,
            } => Some(script),
            _ => None,
        }
    }

    /// Replaces the script of an execution state.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::NotAnExecutionState`] for other variants.
    pub fn set_script(&mut self, script: ScriptSource) -> Result<(), StructureError> {
        match &mut self.variant {
            StateVariant::Execution {
                script: slot,
            } => {
                *slot = script;
                Ok(())
            }
            _ => Err(StructureError::NotAnExecutionState(self.state_id.clone())),
        }
    }

    /// Returns the library reference of a library state.
    #[must_use]
    pub const fn library_reference(&self) -> Option<&LibraryReference> {
        match &self.variant {
            StateVariant::Library(reference) => Some(reference),
            _ => None,
        }
    }

    /// Returns the container core for container variants.
    #[must_use]
    pub const fn container(&self) -> Option<&ContainerCore> {
        match &self.variant {
            StateVariant::Hierarchy(core)
            | StateVariant::BarrierConcurrency(core)
            | StateVariant::PreemptiveConcurrency(core) => Some(core),
            _ => None,
        }
    }

    /// Returns the mutable container core for container variants.
    pub(crate) fn container_mut(&mut self) -> Option<&mut ContainerCore> {
        match &mut self.variant {
            StateVariant::Hierarchy(core)
            | StateVariant::BarrierConcurrency(core)
            | StateVariant::PreemptiveConcurrency(core) => Some(core),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Port and outcome lookup
    // ------------------------------------------------------------------

    /// Looks up an input port by id.
    #[must_use]
    pub fn input_port(&self, id: PortId) -> Option<&DataPort> {
        self.input_ports.iter().find(|port| port.data_port_id == id)
    }

    /// Looks up an output port by id.
    #[must_use]
    pub fn output_port(&self, id: PortId) -> Option<&DataPort> {
        self.output_ports.iter().find(|port| port.data_port_id == id)
    }

    /// Looks up an outcome by id.
    #[must_use]
    pub fn outcome(&self, id: OutcomeId) -> Option<&Outcome> {
        self.outcomes.iter().find(|outcome| outcome.outcome_id == id)
    }

    /// Looks up an outcome by name.
    #[must_use]
    pub fn outcome_by_name(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }

    /// Looks up a port by direction and name.
    #[must_use]
    pub fn port_by_name(&self, direction: PortDirection, name: &str) -> Option<&DataPort> {
        let ports = match direction {
            PortDirection::Input => &self.input_ports,
            PortDirection::Output => &self.output_ports,
            PortDirection::Scoped => return None,
        };
        ports.iter().find(|port| port.name == name)
    }

    /// Returns every port id used by the state, including scoped variables.
    pub fn used_port_ids(&self) -> impl Iterator<Item = PortId> + '_ {
        let scoped = self.container().map(|core| &core.scoped_variables);
        self.input_ports
            .iter()
            .chain(self.output_ports.iter())
            .map(|port| port.data_port_id)
            .chain(scoped.into_iter().flatten().map(|variable| variable.data_port_id))
    }

    // ------------------------------------------------------------------
    // Port and outcome mutation
    // ------------------------------------------------------------------

    /// Adds an input port and returns its allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::DuplicatePortName`] when the name is taken.
    pub fn add_input_port(
        &mut self,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        if self.port_by_name(PortDirection::Input, &name).is_some() {
            return Err(StructureError::DuplicatePortName {
                state: self.state_id.clone(),
                name,
            });
        }
        let id = PortId::from_raw(next_numeric_id(self.used_port_ids().map(PortId::as_raw)));
        self.input_ports.push(DataPort::new(id, name, data_type, default_value));
        Ok(id)
    }

    /// Adds an output port and returns its allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::DuplicatePortName`] when the name is taken.
    pub fn add_output_port(
        &mut self,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        if self.port_by_name(PortDirection::Output, &name).is_some() {
            return Err(StructureError::DuplicatePortName {
                state: self.state_id.clone(),
                name,
            });
        }
        let id = PortId::from_raw(next_numeric_id(self.used_port_ids().map(PortId::as_raw)));
        self.output_ports.push(DataPort::new(id, name, data_type, default_value));
        Ok(id)
    }

    /// Removes an input port.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::PortNotFound`] when the id is unknown and
    /// [`StructureError::PortInUse`] when internal data flows reference it.
    pub fn remove_input_port(&mut self, id: PortId) -> Result<DataPort, StructureError> {
        self.ensure_port_unreferenced(id)?;
        let index = self
            .input_ports
            .iter()
            .position(|port| port.data_port_id == id)
            .ok_or_else(|| StructureError::PortNotFound {
                state: self.state_id.clone(),
                port: id,
            })?;
        Ok(self.input_ports.remove(index))
    }

    /// Removes an output port.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::PortNotFound`] when the id is unknown and
    /// [`StructureError::PortInUse`] when internal data flows reference it.
    pub fn remove_output_port(&mut self, id: PortId) -> Result<DataPort, StructureError> {
        self.ensure_port_unreferenced(id)?;
        let index = self
            .output_ports
            .iter()
            .position(|port| port.data_port_id == id)
            .ok_or_else(|| StructureError::PortNotFound {
                state: self.state_id.clone(),
                port: id,
            })?;
        Ok(self.output_ports.remove(index))
    }

    /// Adds a user outcome and returns its allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::DuplicateOutcomeName`] when the name is
    /// taken.
    pub fn add_outcome(&mut self, name: impl Into<String>) -> Result<OutcomeId, StructureError> {
        let name = name.into();
        if self.outcome_by_name(&name).is_some() {
            return Err(StructureError::DuplicateOutcomeName {
                state: self.state_id.clone(),
                name,
            });
        }
        let id = OutcomeId::from_raw(next_outcome_id(
            self.outcomes.iter().map(|outcome| outcome.outcome_id.as_raw()),
        ));
        self.outcomes.push(Outcome::new(id, name));
        Ok(id)
    }

    /// Removes a user outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::ReservedOutcome`] for the reserved set,
    /// [`StructureError::OutcomeNotFound`] for unknown ids, and
    /// [`StructureError::OutcomeInUse`] when internal transitions reference
    /// the outcome.
    pub fn remove_outcome(&mut self, id: OutcomeId) -> Result<Outcome, StructureError> {
        if id.as_raw() <= 0 {
            return Err(StructureError::ReservedOutcome {
                state: self.state_id.clone(),
                outcome: id,
            });
        }
        if let Some(core) = self.container()
            && core
                .transitions
                .iter()
                .any(|transition| transition.leaves(&self.state_id) && transition.to_outcome == Some(id))
        {
            return Err(StructureError::OutcomeInUse {
                state: self.state_id.clone(),
                outcome: id,
            });
        }
        let index = self
            .outcomes
            .iter()
            .position(|outcome| outcome.outcome_id == id)
            .ok_or_else(|| StructureError::OutcomeNotFound {
                state: self.state_id.clone(),
                outcome: id,
            })?;
        Ok(self.outcomes.remove(index))
    }

    /// Fails when internal data flows reference the port.
    fn ensure_port_unreferenced(&self, id: PortId) -> Result<(), StructureError> {
        if let Some(core) = self.container()
            && core.data_flows.iter().any(|flow| {
                (flow.from_state == self.state_id && flow.from_key == id)
                    || (flow.to_state == self.state_id && flow.to_key == id)
            })
        {
            return Err(StructureError::PortInUse {
                state: self.state_id.clone(),
                port: id,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Container access
    // ------------------------------------------------------------------

    /// Returns the child states of a container, empty for leaves.
    pub fn children(&self) -> impl Iterator<Item = &State> {
        self.container().into_iter().flat_map(|core| core.children.values())
    }

    /// Looks up a child state by id.
    #[must_use]
    pub fn child(&self, id: &StateId) -> Option<&State> {
        self.container().and_then(|core| core.children.get(id))
    }

    /// Looks up a mutable child state by id.
    pub fn child_mut(&mut self, id: &StateId) -> Option<&mut State> {
        self.container_mut().and_then(|core| core.children.get_mut(id))
    }

    /// Returns the transitions of a container, empty for leaves.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        self.container().map_or(&[], |core| &core.transitions)
    }

    /// Returns the data flows of a container, empty for leaves.
    #[must_use]
    pub fn data_flows(&self) -> &[DataFlow] {
        self.container().map_or(&[], |core| &core.data_flows)
    }

    /// Returns the scoped variables of a container, empty for leaves.
    #[must_use]
    pub fn scoped_variables(&self) -> &[ScopedVariable] {
        self.container().map_or(&[], |core| &core.scoped_variables)
    }

    /// Looks up a scoped variable by id.
    #[must_use]
    pub fn scoped_variable(&self, id: PortId) -> Option<&ScopedVariable> {
        self.scoped_variables().iter().find(|variable| variable.data_port_id == id)
    }

    /// Returns the start state id of a container.
    #[must_use]
    pub fn start_state_id(&self) -> Option<&StateId> {
        self.container().and_then(|core| core.start_state_id.as_ref())
    }

    /// Looks up a transition by id.
    #[must_use]
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions().iter().find(|transition| transition.transition_id == id)
    }

    /// Looks up a data flow by id.
    #[must_use]
    pub fn data_flow(&self, id: DataFlowId) -> Option<&DataFlow> {
        self.data_flows().iter().find(|flow| flow.data_flow_id == id)
    }

    // ------------------------------------------------------------------
    // Container mutation
    // ------------------------------------------------------------------

    /// Adds a child state and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::NotAContainer`] for leaf variants and
    /// [`StructureError::DuplicateStateId`] on id collision with the
    /// container or a sibling.
    pub fn add_child_state(&mut self, child: State) -> Result<StateId, StructureError> {
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id.clone()))?;
        let child_id = child.state_id.clone();
        if child_id == own_id || core.children.contains_key(&child_id) {
            return Err(StructureError::DuplicateStateId(child_id));
        }
        core.children.insert(child_id.clone(), child);
        Ok(child_id)
    }

    /// Removes a child state together with every transition and data flow
    /// referencing it.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::StateNotFound`] when the id is unknown and
    /// [`StructureError::DeciderImmutable`] for the decider child of a
    /// barrier-concurrency state.
    pub fn remove_child_state(&mut self, id: &StateId) -> Result<State, StructureError> {
        if self.kind() == StateKind::BarrierConcurrency && id.is_decider() {
            return Err(StructureError::DeciderImmutable(self.state_id.clone()));
        }
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id))?;
        let removed = core
            .children
            .remove(id)
            .ok_or_else(|| StructureError::StateNotFound(id.clone()))?;
        core.transitions
            .retain(|transition| transition.from_state != *id && transition.to_state != *id);
        core.data_flows.retain(|flow| flow.from_state != *id && flow.to_state != *id);
        if core.start_state_id.as_ref() == Some(id) {
            core.start_state_id = None;
        }
        Ok(removed)
    }

    /// Sets or clears the start state of a container.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::StateNotFound`] when the id names no child.
    pub fn set_start_state(&mut self, id: Option<StateId>) -> Result<(), StructureError> {
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id))?;
        if let Some(id) = &id
            && !core.children.contains_key(id)
        {
            return Err(StructureError::StateNotFound(id.clone()));
        }
        core.start_state_id = id;
        Ok(())
    }

    /// Adds a transition and returns its allocated id.
    ///
    /// Start linkage (`from_state` equal to the container id with no origin
    /// outcome) also updates the start state.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] when an endpoint is missing or the
    /// `(from_state, from_outcome)` pair is already connected.
    pub fn add_transition(
        &mut self,
        from_state: StateId,
        from_outcome: Option<OutcomeId>,
        to_state: StateId,
        to_outcome: Option<OutcomeId>,
    ) -> Result<TransitionId, StructureError> {
        let id = TransitionId::from_raw(next_numeric_id(
            self.transitions().iter().map(|transition| transition.transition_id.as_raw()),
        ));
        let transition = Transition::new(id, from_state, from_outcome, to_state, to_outcome);
        self.validate_transition(&transition)?;
        let is_start = transition.is_start(&self.state_id);
        let start_target = transition.to_state.clone();
        if let Some(core) = self.container_mut() {
            core.transitions.push(transition);
            if is_start {
                core.start_state_id = Some(start_target);
            }
        }
        Ok(id)
    }

    /// Removes a transition.
    ///
    /// Removing the start linkage clears the start state.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::TransitionNotFound`] when the id is unknown.
    pub fn remove_transition(&mut self, id: TransitionId) -> Result<Transition, StructureError> {
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id.clone()))?;
        let index = core
            .transitions
            .iter()
            .position(|transition| transition.transition_id == id)
            .ok_or(StructureError::TransitionNotFound(id))?;
        let removed = core.transitions.remove(index);
        if removed.is_start(&own_id) {
            core.start_state_id = None;
        }
        Ok(removed)
    }

    /// Adds a data flow and returns its allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] when an endpoint key does not resolve,
    /// the declared types are incompatible, or the target is already driven.
    pub fn add_data_flow(
        &mut self,
        from_state: StateId,
        from_key: PortId,
        to_state: StateId,
        to_key: PortId,
    ) -> Result<DataFlowId, StructureError> {
        let id = DataFlowId::from_raw(next_numeric_id(
            self.data_flows().iter().map(|flow| flow.data_flow_id.as_raw()),
        ));
        let flow = DataFlow::new(id, from_state, from_key, to_state, to_key);
        self.validate_data_flow(&flow)?;
        if let Some(core) = self.container_mut() {
            core.data_flows.push(flow);
        }
        Ok(id)
    }

    /// Removes a data flow.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::DataFlowNotFound`] when the id is unknown.
    pub fn remove_data_flow(&mut self, id: DataFlowId) -> Result<DataFlow, StructureError> {
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id))?;
        let index = core
            .data_flows
            .iter()
            .position(|flow| flow.data_flow_id == id)
            .ok_or(StructureError::DataFlowNotFound(id))?;
        Ok(core.data_flows.remove(index))
    }

    /// Adds a scoped variable and returns its allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::NotAContainer`] for leaf variants and
    /// [`StructureError::DuplicatePortName`] when the name is taken.
    pub fn add_scoped_variable(
        &mut self,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        if self.container().is_none() {
            return Err(StructureError::NotAContainer(self.state_id.clone()));
        }
        if self.scoped_variables().iter().any(|variable| variable.name == name) {
            return Err(StructureError::DuplicatePortName {
                state: self.state_id.clone(),
                name,
            });
        }
        let id = PortId::from_raw(next_numeric_id(self.used_port_ids().map(PortId::as_raw)));
        if let Some(core) = self.container_mut() {
            core.scoped_variables.push(ScopedVariable::new(id, name, data_type, default_value));
        }
        Ok(id)
    }

    /// Removes a scoped variable together with data flows referencing it.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::PortNotFound`] when the id is unknown.
    pub fn remove_scoped_variable(&mut self, id: PortId) -> Result<ScopedVariable, StructureError> {
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id.clone()))?;
        let index = core
            .scoped_variables
            .iter()
            .position(|variable| variable.data_port_id == id)
            .ok_or(StructureError::PortNotFound {
                state: own_id.clone(),
                port: id,
            })?;
        let removed = core.scoped_variables.remove(index);
        core.data_flows.retain(|flow| {
            !(flow.from_state == own_id && flow.from_key == id)
                && !(flow.to_state == own_id && flow.to_key == id)
        });
        Ok(removed)
    }

    /// Re-keys a child state and repairs every transition and data flow
    /// referencing the old id.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on unknown child, decider re-keying, or
    /// id collision.
    pub fn change_child_id(
        &mut self,
        old_id: &StateId,
        new_id: StateId,
    ) -> Result<(), StructureError> {
        if old_id.is_decider() && self.kind() == StateKind::BarrierConcurrency {
            return Err(StructureError::DeciderImmutable(self.state_id.clone()));
        }
        if new_id == self.state_id {
            return Err(StructureError::DuplicateStateId(new_id));
        }
        let own_id = self.state_id.clone();
        let core = self
            .container_mut()
            .ok_or_else(|| StructureError::NotAContainer(own_id))?;
        if core.children.contains_key(&new_id) {
            return Err(StructureError::DuplicateStateId(new_id));
        }
        let mut child = core
            .children
            .remove(old_id)
            .ok_or_else(|| StructureError::StateNotFound(old_id.clone()))?;
        child.state_id = new_id.clone();
        core.children.insert(new_id.clone(), child);
        for transition in &mut core.transitions {
            if transition.from_state == *old_id {
                transition.from_state = new_id.clone();
            }
            if transition.to_state == *old_id {
                transition.to_state = new_id.clone();
            }
        }
        for flow in &mut core.data_flows {
            if flow.from_state == *old_id {
                flow.from_state = new_id.clone();
            }
            if flow.to_state == *old_id {
                flow.to_state = new_id.clone();
            }
        }
        if core.start_state_id.as_ref() == Some(old_id) {
            core.start_state_id = Some(new_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Linkage validation
    // ------------------------------------------------------------------

    /// Validates a transition against the container invariants.
    fn validate_transition(&self, transition: &Transition) -> Result<(), StructureError> {
        let core = self
            .container()
            .ok_or_else(|| StructureError::NotAContainer(self.state_id.clone()))?;
        let own_id = &self.state_id;

        if transition.from_state == *own_id {
            if transition.from_outcome.is_some() {
                return Err(StructureError::InvalidTransition(
                    "container-origin transitions carry no origin outcome".to_string(),
                ));
            }
        } else {
            let origin = core
                .children
                .get(&transition.from_state)
                .ok_or_else(|| StructureError::StateNotFound(transition.from_state.clone()))?;
            let outcome = transition.from_outcome.ok_or_else(|| {
                StructureError::InvalidTransition("sibling-origin transitions require an origin outcome".to_string())
            })?;
            if origin.outcome(outcome).is_none() {
                return Err(StructureError::OutcomeNotFound {
                    state: transition.from_state.clone(),
                    outcome,
                });
            }
        }

        if transition.to_state == *own_id {
            let outcome = transition.to_outcome.ok_or_else(|| {
                StructureError::InvalidTransition("container-target transitions require a target outcome".to_string())
            })?;
            if self.outcome(outcome).is_none() {
                return Err(StructureError::OutcomeNotFound {
                    state: own_id.clone(),
                    outcome,
                });
            }
        } else {
            if !core.children.contains_key(&transition.to_state) {
                return Err(StructureError::StateNotFound(transition.to_state.clone()));
            }
            if transition.to_outcome.is_some() {
                return Err(StructureError::InvalidTransition(
                    "sibling-target transitions carry no target outcome".to_string(),
                ));
            }
        }

        if core.transitions.iter().any(|existing| {
            existing.from_state == transition.from_state
                && existing.from_outcome == transition.from_outcome
        }) {
            return Err(StructureError::DuplicateTransitionOrigin {
                state: transition.from_state.clone(),
                outcome: transition.from_outcome,
            });
        }
        Ok(())
    }

    /// Validates a data flow against the container invariants.
    fn validate_data_flow(&self, flow: &DataFlow) -> Result<(), StructureError> {
        let core = self
            .container()
            .ok_or_else(|| StructureError::NotAContainer(self.state_id.clone()))?;
        let own_id = &self.state_id;

        let source_type = if flow.from_state == *own_id {
            self.input_port(flow.from_key)
                .map(|port| port.data_type)
                .or_else(|| self.scoped_variable(flow.from_key).map(|variable| variable.data_type))
                .ok_or(StructureError::PortNotFound {
                    state: own_id.clone(),
                    port: flow.from_key,
                })?
        } else {
            let origin = core
                .children
                .get(&flow.from_state)
                .ok_or_else(|| StructureError::StateNotFound(flow.from_state.clone()))?;
            origin
                .output_port(flow.from_key)
                .map(|port| port.data_type)
                .ok_or(StructureError::PortNotFound {
                    state: flow.from_state.clone(),
                    port: flow.from_key,
                })?
        };

        let target_type = if flow.to_state == *own_id {
            self.output_port(flow.to_key)
                .map(|port| port.data_type)
                .or_else(|| self.scoped_variable(flow.to_key).map(|variable| variable.data_type))
                .ok_or(StructureError::PortNotFound {
                    state: own_id.clone(),
                    port: flow.to_key,
                })?
        } else {
            let target = core
                .children
                .get(&flow.to_state)
                .ok_or_else(|| StructureError::StateNotFound(flow.to_state.clone()))?;
            target.input_port(flow.to_key).map(|port| port.data_type).ok_or(
                StructureError::PortNotFound {
                    state: flow.to_state.clone(),
                    port: flow.to_key,
                },
            )?
        };

        if !compatible_types(source_type, target_type) {
            return Err(StructureError::IncompatibleDataTypes {
                source_type,
                target: target_type,
            });
        }

        if core
            .data_flows
            .iter()
            .any(|existing| existing.to_state == flow.to_state && existing.to_key == flow.to_key)
        {
            return Err(StructureError::TargetAlreadyDriven {
                state: flow.to_state.clone(),
                port: flow.to_key,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Related linkage classification
    // ------------------------------------------------------------------

    /// Classifies the container's transitions and data flows relative to a
    /// subset of children and container-side port keys.
    #[must_use]
    pub fn related_linkage(
        &self,
        state_ids: &BTreeSet<StateId>,
        port_ids: &BTreeSet<PortId>,
    ) -> RelatedLinkage {
        let mut linkage = RelatedLinkage::default();
        let own_id = &self.state_id;

        for transition in self.transitions() {
            let origin_in = state_ids.contains(&transition.from_state);
            let target_in = state_ids.contains(&transition.to_state);
            if origin_in && target_in {
                linkage.enclosed_transitions.push(transition.clone());
            } else if origin_in {
                linkage.outgoing_transitions.push(transition.clone());
            } else if target_in {
                linkage.ingoing_transitions.push(transition.clone());
            }
        }

        for flow in self.data_flows() {
            let origin_in = state_ids.contains(&flow.from_state)
                || (flow.from_state == *own_id && port_ids.contains(&flow.from_key));
            let target_in = state_ids.contains(&flow.to_state)
                || (flow.to_state == *own_id && port_ids.contains(&flow.to_key));
            if origin_in && target_in {
                linkage.enclosed_data_flows.push(flow.clone());
            } else if origin_in {
                linkage.outgoing_data_flows.push(flow.clone());
            } else if target_in {
                linkage.ingoing_data_flows.push(flow.clone());
            }
        }
        linkage
    }

    // ------------------------------------------------------------------
    // Type change
    // ------------------------------------------------------------------

    /// Rebuilds the state as `target` while preserving the shared fields.
    ///
    /// Container content survives container-to-container changes; changing
    /// to an execution state discards children and linkage with a data-loss
    /// warning. Barrier targets gain the implicit decider; leaving the
    /// barrier variant drops the decider and every transition touching it.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::UnsupportedTypeChange`] when `target` is
    /// the library variant, which can only be constructed from a reference.
    pub fn change_variant(&mut self, target: StateKind) -> Result<(), StructureError> {
        if target == StateKind::Library {
            return Err(StructureError::UnsupportedTypeChange {
                state: self.state_id.clone(),
                target,
            });
        }
        if target == self.kind() {
            return Ok(());
        }

        let mut core = match &mut self.variant {
            StateVariant::Hierarchy(core)
            | StateVariant::BarrierConcurrency(core)
            | StateVariant::PreemptiveConcurrency(core) => std::mem::take(core),
            StateVariant::Execution {
                ..
            }
            | StateVariant::Library(_) => ContainerCore::default(),
        };

        if self.kind() == StateKind::BarrierConcurrency && target != StateKind::BarrierConcurrency {
            core.children.remove(&StateId::decider());
            core.transitions.retain(|transition| {
                !transition.from_state.is_decider() && !transition.to_state.is_decider()
            });
        }

        self.variant = match target {
            StateKind::Execution => {
                if !core.children.is_empty() {
                    log::warn!(
                        "state {} loses {} child states and their linkage in type change",
                        self.state_id,
                        core.children.len()
                    );
                }
                StateVariant::Execution {
                    script: ScriptSource::default(),
                }
            }
            StateKind::Hierarchy => StateVariant::Hierarchy(core),
            StateKind::BarrierConcurrency => {
                if !core.children.contains_key(&StateId::decider()) {
                    let decider = Self::new_execution(StateId::decider(), "decider");
                    core.children.insert(decider.state_id.clone(), decider);
                }
                StateVariant::BarrierConcurrency(core)
            }
            StateKind::PreemptiveConcurrency => StateVariant::PreemptiveConcurrency(core),
            StateKind::Library => return Err(StructureError::UnsupportedTypeChange {
                state: self.state_id.clone(),
                target,
            }),
        };
        Ok(())
    }

    /// Re-keys this state in place; used by paste and substitute where the
    /// state is not yet attached to a parent.
    #[allow(dead_code, reason = "public API surface not yet wired to a caller")]
    pub(crate) fn set_state_id(&mut self, id: StateId) {
        self.state_id = id;
    }

    /// Re-keys a detached state and rewrites its internal linkage endpoints
    /// referencing the old id.
    pub(crate) fn change_own_id(&mut self, new_id: StateId) {
        let old_id = self.state_id.clone();
        self.state_id = new_id.clone();
        if let Some(core) = self.container_mut() {
            for transition in &mut core.transitions {
                if transition.from_state == old_id {
                    transition.from_state = new_id.clone();
                }
                if transition.to_state == old_id {
                    transition.to_state = new_id.clone();
                }
            }
            for flow in &mut core.data_flows {
                if flow.from_state == old_id {
                    flow.from_state = new_id.clone();
                }
                if flow.to_state == old_id {
                    flow.to_state = new_id.clone();
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Related Linkage
// ============================================================================

/// Container linkage classified relative to a selection of children.
#[derive(Debug, Clone, Default)]
pub struct RelatedLinkage {
    /// Transitions with both endpoints covered by the selection.
    pub enclosed_transitions: Vec<Transition>,
    /// Transitions entering the selection from outside.
    pub ingoing_transitions: Vec<Transition>,
    /// Transitions leaving the selection to the outside.
    pub outgoing_transitions: Vec<Transition>,
    /// Data flows with both endpoints covered by the selection.
    pub enclosed_data_flows: Vec<DataFlow>,
    /// Data flows entering the selection from outside.
    pub ingoing_data_flows: Vec<DataFlow>,
    /// Data flows leaving the selection to the outside.
    pub outgoing_data_flows: Vec<DataFlow>,
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns true if a source type may drive a target type.
fn compatible_types(source: TypeName, target: TypeName) -> bool {
    source == target
        || matches!(
            (source, target),
            (_, TypeName::Any) | (TypeName::Any, _) | (TypeName::Int, TypeName::Float)
        )
}
