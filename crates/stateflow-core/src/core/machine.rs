// stateflow-core/src/core/machine.rs
// ============================================================================
// Module: Stateflow State Machine
// Description: Root ownership, machine metadata, and observed mutations.
// Purpose: Route every structural mutation through validation and observers.
// Dependencies: crate::core::{identifiers, observer, path, state, time, validate},
// crate::interfaces
// ============================================================================

//! ## Overview
//! A state machine owns its root state plus machine metadata (id, file
//! system path, dirty flag, version, timestamps). Every mutation resolves a
//! state path, emits a before/after notification pair, validates, and leaves
//! the tree unchanged on failure. While an engine executes the machine,
//! mutations are refused with [`StructureError::EngineBusy`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::identifiers::DataFlowId;
use crate::core::identifiers::MachineId;
use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::identifiers::TransitionId;
use crate::core::observer::ObserverRegistry;
use crate::core::path::StatePath;
use crate::core::state::ScriptSource;
use crate::core::state::State;
use crate::core::state::StateKind;
use crate::core::time::Timestamp;
use crate::core::validate::StructureError;
use crate::core::value::TypeName;
use crate::core::value::Value;
use crate::interfaces::ChangeCause;
use crate::interfaces::ModelEvent;
use crate::interfaces::Observer;

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// State machine owning a root state and its metadata.
#[derive(Debug)]
pub struct StateMachine {
    /// Machine identifier.
    machine_id: MachineId,
    /// Root state of the tree.
    root: State,
    /// Path the machine was loaded from or saved to.
    file_system_path: Option<PathBuf>,
    /// Set when the tree changed since the last save.
    marked_dirty: bool,
    /// Version of the runtime that created the machine.
    version: String,
    /// Creation timestamp.
    creation_time: Timestamp,
    /// Observer registry for model-change notifications.
    observers: ObserverRegistry,
    /// Set by an engine for the duration of a run.
    execution_marker: Arc<AtomicBool>,
}

impl StateMachine {
    /// Creates a new state machine around a root state.
    #[must_use]
    pub fn new(root: State) -> Self {
        Self::with_machine_id(MachineId::generate(), root)
    }

    /// Creates a state machine with a known identifier, e.g. when loading.
    #[must_use]
    pub fn with_machine_id(machine_id: MachineId, root: State) -> Self {
        Self {
            machine_id,
            root,
            file_system_path: None,
            marked_dirty: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
            creation_time: Timestamp::now_wall(),
            observers: ObserverRegistry::new(),
            execution_marker: Arc::new(AtomicBool::new(false)),
        }
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Returns the machine identifier.
    #[must_use]
    pub const fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// Returns the root state.
    #[must_use]
    pub const fn root(&self) -> &State {
        &self.root
    }

    /// Returns the path addressing the root state.
    #[must_use]
    pub fn root_path(&self) -> StatePath {
        StatePath::root(self.root.state_id().clone())
    }

    /// Returns the file system path of the machine, if any.
    #[must_use]
    pub const fn file_system_path(&self) -> Option<&PathBuf> {
        self.file_system_path.as_ref()
    }

    /// Records the file system path of the machine.
    pub fn set_file_system_path(&mut self, path: Option<PathBuf>) {
        self.file_system_path = path;
    }

    /// Returns the runtime version recorded for the machine.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Overrides the recorded runtime version, e.g. when loading.
    pub(crate) fn set_version(&mut self, version: String) {
        self.version = version;
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn creation_time(&self) -> Timestamp {
        self.creation_time
    }

    /// Overrides the creation timestamp, e.g. when loading.
    pub(crate) fn set_creation_time(&mut self, time: Timestamp) {
        self.creation_time = time;
    }

    /// Returns true if the tree changed since the last save.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.marked_dirty
    }

    /// Clears the dirty flag, e.g. after saving.
    pub fn clear_dirty(&mut self) {
        self.marked_dirty = false;
    }

    /// Subscribes an observer to model-change notifications.
    pub fn subscribe(&self, observer: &Arc<dyn Observer>) {
        self.observers.subscribe(observer);
    }

    /// Returns true while an engine executes the machine.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.execution_marker.load(Ordering::Acquire)
    }

    /// Returns the marker handle engines set for the run duration.
    #[must_use]
    pub(crate) fn execution_marker(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.execution_marker)
    }

    /// Fails with [`StructureError::EngineBusy`] while the engine runs.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EngineBusy`] when the machine executes.
    pub fn assert_editable(&self) -> Result<(), StructureError> {
        if self.is_executing() {
            return Err(StructureError::EngineBusy);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Resolves a state path to a state.
    #[must_use]
    pub fn state_at(&self, path: &StatePath) -> Option<&State> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        if first != self.root.state_id() {
            return None;
        }
        let mut current = &self.root;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Resolves a state path to a mutable state.
    pub(crate) fn state_at_mut(&mut self, path: &StatePath) -> Option<&mut State> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        if first != self.root.state_id() {
            return None;
        }
        let mut current = &mut self.root;
        for segment in segments {
            current = current.child_mut(segment)?;
        }
        Some(current)
    }

    /// Renders a path by state names instead of ids.
    #[must_use]
    pub fn path_by_name(&self, path: &StatePath) -> Option<String> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        if first != self.root.state_id() {
            return None;
        }
        let mut names = vec![self.root.name().to_string()];
        let mut current = &self.root;
        for segment in segments {
            current = current.child(segment)?;
            names.push(current.name().to_string());
        }
        Some(names.join("/"))
    }

    // ------------------------------------------------------------------
    // Observed mutations
    // ------------------------------------------------------------------

    /// Adds a child state under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_state(
        &mut self,
        parent: &StatePath,
        child: State,
    ) -> Result<StateId, StructureError> {
        self.with_state(parent, "add_state", ChangeCause::StateChange, move |state| {
            state.add_child_state(child)
        })
    }

    /// Removes a child state under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_state(
        &mut self,
        parent: &StatePath,
        id: &StateId,
    ) -> Result<State, StructureError> {
        self.with_state(parent, "remove_state", ChangeCause::StateChange, |state| {
            state.remove_child_state(id)
        })
    }

    /// Adds a transition under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_transition(
        &mut self,
        parent: &StatePath,
        from_state: StateId,
        from_outcome: Option<OutcomeId>,
        to_state: StateId,
        to_outcome: Option<OutcomeId>,
    ) -> Result<TransitionId, StructureError> {
        self.with_state(parent, "add_transition", ChangeCause::TransitionChange, move |state| {
            state.add_transition(from_state, from_outcome, to_state, to_outcome)
        })
    }

    /// Removes a transition under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_transition(
        &mut self,
        parent: &StatePath,
        id: TransitionId,
    ) -> Result<(), StructureError> {
        self.with_state(parent, "remove_transition", ChangeCause::TransitionChange, move |state| {
            state.remove_transition(id).map(|_| ())
        })
    }

    /// Adds a data flow under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_data_flow(
        &mut self,
        parent: &StatePath,
        from_state: StateId,
        from_key: PortId,
        to_state: StateId,
        to_key: PortId,
    ) -> Result<DataFlowId, StructureError> {
        self.with_state(parent, "add_data_flow", ChangeCause::DataFlowChange, move |state| {
            state.add_data_flow(from_state, from_key, to_state, to_key)
        })
    }

    /// Removes a data flow under a container path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_data_flow(
        &mut self,
        parent: &StatePath,
        id: DataFlowId,
    ) -> Result<(), StructureError> {
        self.with_state(parent, "remove_data_flow", ChangeCause::DataFlowChange, move |state| {
            state.remove_data_flow(id).map(|_| ())
        })
    }

    /// Adds an input port to the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_input_port(
        &mut self,
        path: &StatePath,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        self.with_state(path, "add_input_port", ChangeCause::PortChange, move |state| {
            state.add_input_port(name, data_type, default_value)
        })
    }

    /// Adds an output port to the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_output_port(
        &mut self,
        path: &StatePath,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        self.with_state(path, "add_output_port", ChangeCause::PortChange, move |state| {
            state.add_output_port(name, data_type, default_value)
        })
    }

    /// Removes an input port from the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_input_port(
        &mut self,
        path: &StatePath,
        id: PortId,
    ) -> Result<(), StructureError> {
        self.ensure_port_unlinked(path, id)?;
        self.with_state(path, "remove_input_port", ChangeCause::PortChange, move |state| {
            state.remove_input_port(id).map(|_| ())
        })
    }

    /// Removes an output port from the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_output_port(
        &mut self,
        path: &StatePath,
        id: PortId,
    ) -> Result<(), StructureError> {
        self.ensure_port_unlinked(path, id)?;
        self.with_state(path, "remove_output_port", ChangeCause::PortChange, move |state| {
            state.remove_output_port(id).map(|_| ())
        })
    }

    /// Adds a user outcome to the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_outcome(
        &mut self,
        path: &StatePath,
        name: impl Into<String>,
    ) -> Result<OutcomeId, StructureError> {
        let name = name.into();
        self.with_state(path, "add_outcome", ChangeCause::OutcomeChange, move |state| {
            state.add_outcome(name)
        })
    }

    /// Removes a user outcome from the state at a path.
    ///
    /// The outcome must be unreferenced by the parent's transitions.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_outcome(
        &mut self,
        path: &StatePath,
        id: OutcomeId,
    ) -> Result<(), StructureError> {
        if let (Some(parent_path), Some(leaf)) = (path.parent(), path.leaf().cloned())
            && let Some(parent) = self.state_at(&parent_path)
            && parent
                .transitions()
                .iter()
                .any(|transition| transition.from_state == leaf && transition.from_outcome == Some(id))
        {
            return Err(StructureError::OutcomeInUse {
                state: leaf,
                outcome: id,
            });
        }
        self.with_state(path, "remove_outcome", ChangeCause::OutcomeChange, move |state| {
            state.remove_outcome(id).map(|_| ())
        })
    }

    /// Adds a scoped variable to the container at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn add_scoped_variable(
        &mut self,
        path: &StatePath,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Result<PortId, StructureError> {
        let name = name.into();
        self.with_state(path, "add_scoped_variable", ChangeCause::ScopedVariableChange, move |state| {
            state.add_scoped_variable(name, data_type, default_value)
        })
    }

    /// Removes a scoped variable from the container at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn remove_scoped_variable(
        &mut self,
        path: &StatePath,
        id: PortId,
    ) -> Result<(), StructureError> {
        self.with_state(path, "remove_scoped_variable", ChangeCause::ScopedVariableChange, move |state| {
            state.remove_scoped_variable(id).map(|_| ())
        })
    }

    /// Renames the state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn rename_state(
        &mut self,
        path: &StatePath,
        name: impl Into<String>,
    ) -> Result<(), StructureError> {
        let name = name.into();
        self.with_state(path, "rename_state", ChangeCause::Rename, move |state| {
            state.set_name(name);
            Ok(())
        })
    }

    /// Sets or clears the start state of the container at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn set_start_state(
        &mut self,
        path: &StatePath,
        id: Option<StateId>,
    ) -> Result<(), StructureError> {
        self.with_state(path, "set_start_state", ChangeCause::StartStateChange, move |state| {
            state.set_start_state(id)
        })
    }

    /// Re-keys a child state and repairs all referencing linkage.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn change_state_id(
        &mut self,
        parent: &StatePath,
        old_id: &StateId,
        new_id: StateId,
    ) -> Result<(), StructureError> {
        self.with_state(parent, "change_state_id", ChangeCause::StateChange, move |state| {
            state.change_child_id(old_id, new_id)
        })
    }

    /// Rebuilds the state at a path as another variant.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn change_state_type(
        &mut self,
        path: &StatePath,
        target: StateKind,
    ) -> Result<(), StructureError> {
        self.with_state(path, "change_state_type", ChangeCause::TypeChange, move |state| {
            state.change_variant(target)
        })
    }

    /// Replaces the script of the execution state at a path.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError`] on invalid structure or a running engine.
    pub fn set_script(
        &mut self,
        path: &StatePath,
        script: ScriptSource,
    ) -> Result<(), StructureError> {
        self.with_state(path, "set_script", ChangeCause::StateChange, move |state| {
            state.set_script(script)
        })
    }

    // ------------------------------------------------------------------
    // Mutation plumbing
    // ------------------------------------------------------------------

    /// Runs a mutation against a resolved state with gating, notification,
    /// and dirty tracking.
    pub(crate) fn with_state<T>(
        &mut self,
        path: &StatePath,
        operation: &'static str,
        cause: ChangeCause,
        mutate: impl FnOnce(&mut State) -> Result<T, StructureError>,
    ) -> Result<T, StructureError> {
        self.assert_editable()?;
        let event = ModelEvent {
            path: path.clone(),
            operation,
            cause,
        };
        self.observers.notify_before(&event);
        let result = match self.state_at_mut(path) {
            Some(state) => mutate(state),
            None => Err(StructureError::PathNotFound(path.to_string())),
        };
        if result.is_ok() {
            self.marked_dirty = true;
        }
        self.observers.notify_after(&event, result.as_ref().err());
        result
    }

    /// Fails when the parent container links the port of the state at
    /// `path` through a data flow.
    fn ensure_port_unlinked(&self, path: &StatePath, id: PortId) -> Result<(), StructureError> {
        if let (Some(parent_path), Some(leaf)) = (path.parent(), path.leaf().cloned())
            && let Some(parent) = self.state_at(&parent_path)
            && parent.data_flows().iter().any(|flow| {
                (flow.from_state == leaf && flow.from_key == id)
                    || (flow.to_state == leaf && flow.to_key == id)
            })
        {
            return Err(StructureError::PortInUse {
                state: leaf,
                port: id,
            });
        }
        Ok(())
    }
}
