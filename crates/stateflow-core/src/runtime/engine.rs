// stateflow-core/src/runtime/engine.rs
// ============================================================================
// Module: Stateflow Execution Engine
// Description: Drives state trees under hierarchy and concurrency semantics.
// Purpose: Execute machines with run/pause/stop/step control and history.
// Dependencies: crate::core, crate::interfaces, crate::runtime, log
// ============================================================================

//! ## Overview
//! The engine runs the root state on a dedicated worker thread; every branch
//! of a concurrency container runs on its own scoped thread. Boundaries
//! consult the shared [`ExecutionControl`], history items are pushed around
//! every state execution, and faults, unhandled outcomes, and cancellation
//! are reified as the reserved outcomes flowing through transitions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::core::identifiers::OutcomeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StateId;
use crate::core::machine::StateMachine;
use crate::core::outcomes::ABORTED_OUTCOME_ID;
use crate::core::outcomes::Outcome;
use crate::core::outcomes::PREEMPTED_OUTCOME_ID;
use crate::core::outcomes::SUCCESS_OUTCOME_ID;
use crate::core::path::StatePath;
use crate::core::ports::ScopedVariable;
use crate::core::state::State;
use crate::core::state::StateKind;
use crate::core::validate::StructureError;
use crate::core::validate::validate_tree;
use crate::core::value::Value;
use crate::interfaces::Clock;
use crate::interfaces::HistoryStore;
use crate::interfaces::LibraryError;
use crate::interfaces::LibraryProvider;
use crate::interfaces::ScriptContext;
use crate::interfaces::ScriptError;
use crate::interfaces::ScriptHost;
use crate::runtime::clock::WallClock;
use crate::runtime::control::EngineStatus;
use crate::runtime::control::ExecutionControl;
use crate::runtime::control::Passage;
use crate::runtime::control::StepMode;
use crate::runtime::history::CallType;
use crate::runtime::history::ExecutionHistory;
use crate::runtime::history::ItemContext;
use crate::runtime::history::MachineStartInfo;
use crate::runtime::history::StateType;
use crate::runtime::history::render_payload;
use crate::runtime::scoped_data::ScopedData;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum nesting depth for library resolution.
const MAX_LIBRARY_DEPTH: usize = 16;

/// Output key carrying reified execution faults.
const ERROR_OUTPUT_KEY: &str = "error";

// ============================================================================
// SECTION: Run Report
// ============================================================================

/// Result of one completed or cancelled run.
pub struct RunReport {
    /// Final outcome of the root state.
    pub outcome: Outcome,
    /// Final outputs of the root state.
    pub outputs: BTreeMap<String, Value>,
    /// Root-thread execution history.
    pub history: ExecutionHistory,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine control errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An execution is already running.
    #[error("an execution is already running")]
    AlreadyRunning,
    /// No execution was started or it was already joined.
    #[error("no execution was started")]
    NotStarted,
    /// The machine failed structural validation.
    #[error(transparent)]
    Invalid(#[from] StructureError),
    /// A referenced library cannot be resolved; the engine refuses to start.
    #[error(transparent)]
    Library(#[from] LibraryError),
    /// The worker thread panicked.
    #[error("engine worker thread panicked")]
    WorkerPanicked,
    /// The worker thread could not be spawned.
    #[error("engine worker thread could not be spawned: {0}")]
    Spawn(String),
}

// ============================================================================
// SECTION: Execution Engine
// ============================================================================

/// Execution engine driving one machine at a time.
pub struct ExecutionEngine {
    /// Shared boundary control.
    control: Arc<ExecutionControl>,
    /// Script host running execution-state bodies.
    script_host: Arc<dyn ScriptHost>,
    /// Timestamp source for history items.
    clock: Arc<dyn Clock>,
    /// Library resolver, required when the tree contains library states.
    library_provider: Option<Arc<dyn LibraryProvider>>,
    /// Keyed history store, optional.
    store: Option<Arc<dyn HistoryStore>>,
    /// Handle of the active worker, if any.
    worker: Mutex<Option<JoinHandle<RunReport>>>,
}

impl ExecutionEngine {
    /// Creates an engine around a script host with a wall clock and no
    /// persistent history.
    #[must_use]
    pub fn new(script_host: Arc<dyn ScriptHost>) -> Self {
        Self {
            control: Arc::new(ExecutionControl::new()),
            script_host,
            clock: Arc::new(WallClock),
            library_provider: None,
            store: None,
            worker: Mutex::new(None),
        }
    }

    /// Replaces the clock, e.g. with a logical clock for replays.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attaches a keyed history store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches a library provider.
    #[must_use]
    pub fn with_library_provider(mut self, provider: Arc<dyn LibraryProvider>) -> Self {
        self.library_provider = Some(provider);
        self
    }

    /// Starts executing a machine on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a run is active, the tree is invalid, or
    /// a referenced library cannot be resolved.
    pub fn start(&self, machine: Arc<RwLock<StateMachine>>) -> Result<(), EngineError> {
        let mut worker = lock_worker(&self.worker);
        if worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (libraries, marker, start_info, root_inputs) = {
            let guard = read_machine(&machine);
            validate_tree(guard.root())?;
            let mut libraries = BTreeMap::new();
            resolve_libraries(
                guard.root(),
                &guard.root_path(),
                self.library_provider.as_ref(),
                &mut libraries,
                0,
            )?;
            let root_inputs: BTreeMap<String, Value> = guard
                .root()
                .input_ports()
                .iter()
                .map(|port| (port.name.clone(), port.default_value.clone()))
                .collect();
            let start_info = MachineStartInfo {
                machine_id: guard.machine_id().clone(),
                version: guard.version().to_string(),
                creation_time: guard.creation_time(),
                root_state_storage_id: guard.root().state_id().clone(),
            };
            (libraries, guard.execution_marker(), start_info, root_inputs)
        };

        marker.store(true, Ordering::Release);
        self.control.begin_run();

        let ctx = RunContext {
            control: Arc::clone(&self.control),
            host: Arc::clone(&self.script_host),
            clock: Arc::clone(&self.clock),
            libraries,
        };
        let store = self.store.clone();
        let handle = thread::Builder::new()
            .name("stateflow-engine".to_string())
            .spawn(move || {
                let report = run_worker(&machine, &ctx, store, start_info, root_inputs);
                marker.store(false, Ordering::Release);
                ctx.control.finish_run();
                report
            })
            .map_err(|err| EngineError::Spawn(err.to_string()))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Waits for the worker and returns the run report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotStarted`] without an active run and
    /// [`EngineError::WorkerPanicked`] when the worker died.
    pub fn join(&self) -> Result<RunReport, EngineError> {
        let handle = lock_worker(&self.worker).take().ok_or(EngineError::NotStarted)?;
        handle.join().map_err(|_| EngineError::WorkerPanicked)
    }

    /// Starts a machine and blocks until the run finishes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the run cannot be started or joined.
    pub fn run_to_completion(
        &self,
        machine: Arc<RwLock<StateMachine>>,
    ) -> Result<RunReport, EngineError> {
        self.start(machine)?;
        self.join()
    }

    /// Requests cancellation; branches exit via `preempted` at their next
    /// boundary.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Parks the run at the next boundary.
    pub fn pause(&self) {
        self.control.pause();
    }

    /// Resumes a paused run.
    pub fn resume(&self) {
        self.control.resume();
    }

    /// Steps to the next boundary regardless of depth.
    pub fn step_into(&self) {
        self.control.step(StepMode::Into);
    }

    /// Steps to the next boundary at or above the current depth.
    pub fn step_over(&self) {
        self.control.step(StepMode::Over);
    }

    /// Steps until the current container is left.
    pub fn step_out(&self) {
        self.control.step(StepMode::Out);
    }

    /// Unwinds one recorded step of the active hierarchy.
    pub fn step_backward(&self) {
        self.control.request_backstep();
    }

    /// Returns the engine status snapshot.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.control.status()
    }

    /// Returns true once the run finished or was stopped.
    #[must_use]
    pub fn finished_or_stopped(&self) -> bool {
        self.control.finished_or_stopped()
    }
}

// ============================================================================
// SECTION: Run Context
// ============================================================================

/// Shared immutable context of one run.
struct RunContext {
    /// Boundary control.
    control: Arc<ExecutionControl>,
    /// Script host.
    host: Arc<dyn ScriptHost>,
    /// Timestamp source.
    clock: Arc<dyn Clock>,
    /// Loaded library roots by library-state path.
    libraries: BTreeMap<StatePath, State>,
}

/// Returns true once the run or the branch was cancelled.
fn cancelled(ctx: &RunContext, preempt: Option<&AtomicBool>) -> bool {
    ctx.control.stop_requested() || preempt.is_some_and(|flag| flag.load(Ordering::Acquire))
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Runs the root state to completion on the worker thread.
fn run_worker(
    machine: &Arc<RwLock<StateMachine>>,
    ctx: &RunContext,
    store: Option<Arc<dyn HistoryStore>>,
    start_info: MachineStartInfo,
    root_inputs: BTreeMap<String, Value>,
) -> RunReport {
    let guard = read_machine(machine);
    let root = guard.root();
    let root_path = guard.root_path();
    let root_name = root.name().to_string();
    let history = ExecutionHistory::new(store.clone());

    let start_ctx = ItemContext {
        path: root_path.clone(),
        path_by_name: root_name.clone(),
        state_name: root_name.clone(),
        state_type: StateType::Machine,
        run_id: RunId::generate(),
    };
    history.push_machine_start(&start_ctx, ctx.clock.now(), start_info);

    let execution = ChildExecution::new(root, root_path.clone(), root_name.clone());
    let empty_plane = ScopedData::default();
    execution.begin(&history, ctx, &root_inputs, &empty_plane);
    let (mut outcome, outputs) = execute_body(
        ctx,
        root,
        &root_path,
        &root_name,
        execution.run_id(),
        &root_inputs,
        &history,
        None,
        None,
    );
    if cancelled(ctx, None) {
        outcome = reserved_outcome(root, PREEMPTED_OUTCOME_ID);
    }
    execution.finish(&history, ctx, &outputs, &empty_plane, &outcome);

    if let Some(store) = &store
        && let Err(err) = store.flush()
    {
        log::warn!("history store flush failed: {err}");
    }

    RunReport {
        outcome,
        outputs,
        history,
    }
}

// ============================================================================
// SECTION: Child Execution Items
// ============================================================================

/// History bookkeeping around one state execution.
struct ChildExecution {
    /// Item context shared by the four boundary items.
    item_ctx: ItemContext,
    /// Rendered scoped-variable declarations of the state.
    scoped_vars: serde_json::Value,
}

impl ChildExecution {
    /// Allocates a run id and prepares the item context for a state.
    fn new(state: &State, path: StatePath, path_by_name: String) -> Self {
        let declared: BTreeMap<String, ScopedVariable> = state
            .scoped_variables()
            .iter()
            .map(|variable| (variable.data_port_id.to_string(), variable.clone()))
            .collect();
        Self {
            item_ctx: ItemContext {
                path,
                path_by_name,
                state_name: state.name().to_string(),
                state_type: state.kind().into(),
                run_id: RunId::generate(),
            },
            scoped_vars: render_payload(&declared),
        }
    }

    /// Returns the run id shared by the four boundary items.
    const fn run_id(&self) -> &RunId {
        &self.item_ctx.run_id
    }

    /// Pushes the outer and inner call items.
    fn begin(
        &self,
        history: &ExecutionHistory,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Value>,
        plane: &ScopedData,
    ) {
        let scope = render_payload(&plane.snapshot());
        let io = render_payload(inputs);
        history.push_call(
            &self.item_ctx,
            ctx.clock.now(),
            CallType::Container,
            io.clone(),
            scope.clone(),
            self.scoped_vars.clone(),
        );
        history.push_call(
            &self.item_ctx,
            ctx.clock.now(),
            CallType::Execute,
            io,
            scope,
            self.scoped_vars.clone(),
        );
    }

    /// Pushes the inner and outer return items.
    fn finish(
        &self,
        history: &ExecutionHistory,
        ctx: &RunContext,
        outputs: &BTreeMap<String, Value>,
        plane: &ScopedData,
        outcome: &Outcome,
    ) {
        let scope = render_payload(&plane.snapshot());
        let io = render_payload(outputs);
        history.push_return(
            &self.item_ctx,
            ctx.clock.now(),
            CallType::Execute,
            io.clone(),
            scope.clone(),
            self.scoped_vars.clone(),
            outcome,
        );
        history.push_return(
            &self.item_ctx,
            ctx.clock.now(),
            CallType::Container,
            io,
            scope,
            self.scoped_vars.clone(),
            outcome,
        );
    }
}

// ============================================================================
// SECTION: Body Dispatch
// ============================================================================

/// Executes the body of a state and returns its outcome and outputs.
#[allow(
    clippy::too_many_arguments,
    reason = "The body dispatcher threads the full boundary context."
)]
fn execute_body(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    path_by_name: &str,
    run_id: &RunId,
    inputs: &BTreeMap<String, Value>,
    history: &ExecutionHistory,
    preempt: Option<&AtomicBool>,
    branch_outcomes: Option<&[(StateId, Outcome)]>,
) -> (Outcome, BTreeMap<String, Value>) {
    match state.kind() {
        StateKind::Execution => run_script(ctx, state, path, inputs, branch_outcomes),
        StateKind::Hierarchy => {
            run_hierarchy(ctx, state, path, path_by_name, inputs, history, preempt)
        }
        StateKind::BarrierConcurrency => {
            run_barrier(ctx, state, path, path_by_name, run_id, inputs, history, preempt)
        }
        StateKind::PreemptiveConcurrency => {
            run_preemptive(ctx, state, path, path_by_name, run_id, inputs, history, preempt)
        }
        StateKind::Library => {
            run_library(ctx, state, path, path_by_name, inputs, history, preempt)
        }
    }
}

// ============================================================================
// SECTION: Execution States
// ============================================================================

/// Runs an execution-state script, reifying faults as `aborted`.
fn run_script(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    inputs: &BTreeMap<String, Value>,
    branch_outcomes: Option<&[(StateId, Outcome)]>,
) -> (Outcome, BTreeMap<String, Value>) {
    let script = state.script().cloned().unwrap_or_default();
    let script_ctx = ScriptContext {
        state_path: path,
        state_name: state.name(),
        inputs,
        branch_outcomes,
    };
    match ctx.host.call(&script, &script_ctx) {
        Ok(result) => {
            let outcome = state.outcome(result.outcome).cloned().unwrap_or_else(|| {
                log::warn!("script of {path} selected unknown outcome {}", result.outcome);
                reserved_outcome(state, ABORTED_OUTCOME_ID)
            });
            (outcome, result.outputs)
        }
        Err(err) => {
            log::warn!("execution fault in {path}: {err}");
            let mut outputs = BTreeMap::new();
            let mut fault = BTreeMap::new();
            let (error_type, error_message) = match &err {
                ScriptError::Fault {
                    error_type,
                    error_message,
                } => (error_type.clone(), error_message.clone()),
                ScriptError::UnknownRoutine(name) => ("unknown_routine".to_string(), name.clone()),
            };
            fault.insert("error_type".to_string(), Value::Str(error_type));
            fault.insert("error_message".to_string(), Value::Str(error_message));
            outputs.insert(ERROR_OUTPUT_KEY.to_string(), Value::Map(fault));
            (reserved_outcome(state, ABORTED_OUTCOME_ID), outputs)
        }
    }
}

// ============================================================================
// SECTION: Hierarchy Execution
// ============================================================================

/// One rewindable step of a hierarchy run.
struct StepRecord {
    /// Child executed by this step.
    child_id: StateId,
    /// Plane snapshot before the child ran.
    plane_before: ScopedData,
    /// History length before the child's items.
    history_len: usize,
}

/// Advances a hierarchy container one child at a time.
fn run_hierarchy(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    path_by_name: &str,
    inputs: &BTreeMap<String, Value>,
    history: &ExecutionHistory,
    preempt: Option<&AtomicBool>,
) -> (Outcome, BTreeMap<String, Value>) {
    let mut plane = ScopedData::initialize(state, inputs);
    plane.route_container_inputs(state);

    if state.children().next().is_none() {
        return (reserved_outcome(state, SUCCESS_OUTCOME_ID), plane.container_outputs(state));
    }
    let Some(start) = state.start_state_id().cloned() else {
        log::warn!("container {path} has no start state");
        return (reserved_outcome(state, ABORTED_OUTCOME_ID), plane.container_outputs(state));
    };

    let mut current = start;
    let mut trail: Vec<StepRecord> = Vec::new();

    'drive: loop {
        match ctx.control.checkpoint(path, preempt, true) {
            Passage::Preempt => {
                return (reserved_outcome(state, PREEMPTED_OUTCOME_ID), plane.container_outputs(state));
            }
            Passage::Rewind => {
                if let Some(record) = trail.pop() {
                    plane = record.plane_before;
                    current = record.child_id;
                    history.truncate(record.history_len);
                } else {
                    log::debug!("no recorded step to unwind at {path}");
                }
                continue;
            }
            Passage::Proceed => {}
        }

        let Some(child) = state.child(&current) else {
            log::warn!("container {path} references missing child {current}");
            return (reserved_outcome(state, ABORTED_OUTCOME_ID), plane.container_outputs(state));
        };

        let child_inputs = plane.child_inputs(state, child);
        trail.push(StepRecord {
            child_id: current.clone(),
            plane_before: plane.clone(),
            history_len: history.len(),
        });

        let child_path = path.join(current.clone());
        let child_pbn = format!("{path_by_name}/{}", child.name());
        let execution = ChildExecution::new(child, child_path.clone(), child_pbn.clone());
        execution.begin(history, ctx, &child_inputs, &plane);
        let (mut outcome, outputs) = execute_body(
            ctx,
            child,
            &child_path,
            &child_pbn,
            execution.run_id(),
            &child_inputs,
            history,
            preempt,
            None,
        );
        if cancelled(ctx, preempt) {
            outcome = reserved_outcome(child, PREEMPTED_OUTCOME_ID);
        }
        plane.write_child_outputs(state, child, &outputs);
        execution.finish(history, ctx, &outputs, &plane, &outcome);

        /// Continuation after resolving the child's transition.
        enum NextStep {
            /// Leave the container through an outcome.
            Leave(Outcome),
            /// Advance to the next child.
            Goto(StateId),
        }
        let next = {
            let transition = state.transitions().iter().find(|transition| {
                transition.from_state == current
                    && transition.from_outcome == Some(outcome.outcome_id)
            });
            match transition {
                Some(transition) if transition.leaves(state.state_id()) => {
                    let exit = transition
                        .to_outcome
                        .and_then(|id| state.outcome(id))
                        .cloned()
                        .unwrap_or_else(|| reserved_outcome(state, ABORTED_OUTCOME_ID));
                    NextStep::Leave(exit)
                }
                Some(transition) => NextStep::Goto(transition.to_state.clone()),
                None => {
                    if outcome.outcome_id == PREEMPTED_OUTCOME_ID {
                        NextStep::Leave(reserved_outcome(state, PREEMPTED_OUTCOME_ID))
                    } else if outcome.outcome_id == ABORTED_OUTCOME_ID {
                        NextStep::Leave(reserved_outcome(state, ABORTED_OUTCOME_ID))
                    } else {
                        log::warn!(
                            "unhandled outcome '{}' of {child_path}; container aborts",
                            outcome.name
                        );
                        NextStep::Leave(reserved_outcome(state, ABORTED_OUTCOME_ID))
                    }
                }
            }
        };
        match next {
            NextStep::Leave(exit) => {
                // The exit is itself a boundary; pause, stepping, and
                // backward steps apply before the container is left.
                loop {
                    match ctx.control.checkpoint(path, preempt, true) {
                        Passage::Preempt => {
                            return (
                                reserved_outcome(state, PREEMPTED_OUTCOME_ID),
                                plane.container_outputs(state),
                            );
                        }
                        Passage::Proceed => {
                            return (exit, plane.container_outputs(state));
                        }
                        Passage::Rewind => {
                            if let Some(record) = trail.pop() {
                                plane = record.plane_before;
                                current = record.child_id;
                                history.truncate(record.history_len);
                                continue 'drive;
                            }
                            log::debug!("no recorded step to unwind at {path}");
                        }
                    }
                }
            }
            NextStep::Goto(next_child) => current = next_child,
        }
    }
}

// ============================================================================
// SECTION: Concurrency Execution
// ============================================================================

/// Result of one concurrency branch.
struct BranchResult {
    /// Child id of the branch.
    child_id: StateId,
    /// Final outcome of the branch.
    outcome: Outcome,
    /// Final outputs of the branch.
    outputs: BTreeMap<String, Value>,
}

/// Runs one concurrency branch inside its scoped thread.
#[allow(
    clippy::too_many_arguments,
    reason = "Branches thread the full boundary context."
)]
fn run_branch(
    ctx: &RunContext,
    child: &State,
    child_path: StatePath,
    child_pbn: String,
    inputs: BTreeMap<String, Value>,
    fork_plane: &ScopedData,
    branch_history: &ExecutionHistory,
    preempt: &AtomicBool,
) -> BranchResult {
    let execution = ChildExecution::new(child, child_path.clone(), child_pbn.clone());
    execution.begin(branch_history, ctx, &inputs, fork_plane);
    let (mut outcome, outputs) = execute_body(
        ctx,
        child,
        &child_path,
        &child_pbn,
        execution.run_id(),
        &inputs,
        branch_history,
        Some(preempt),
        None,
    );
    if cancelled(ctx, Some(preempt)) {
        outcome = reserved_outcome(child, PREEMPTED_OUTCOME_ID);
    }
    execution.finish(branch_history, ctx, &outputs, fork_plane, &outcome);
    BranchResult {
        child_id: child.state_id().clone(),
        outcome,
        outputs,
    }
}

/// Runs a barrier-concurrency container: all children, then the decider.
#[allow(
    clippy::too_many_arguments,
    reason = "Concurrency runners thread the full boundary context."
)]
fn run_barrier(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    path_by_name: &str,
    run_id: &RunId,
    inputs: &BTreeMap<String, Value>,
    history: &ExecutionHistory,
    preempt: Option<&AtomicBool>,
) -> (Outcome, BTreeMap<String, Value>) {
    let mut plane = ScopedData::initialize(state, inputs);
    plane.route_container_inputs(state);

    if ctx.control.checkpoint(path, preempt, false) == Passage::Preempt {
        return (reserved_outcome(state, PREEMPTED_OUTCOME_ID), plane.container_outputs(state));
    }

    let children: Vec<&State> =
        state.children().filter(|child| !child.state_id().is_decider()).collect();
    let item_ctx = ItemContext {
        path: path.clone(),
        path_by_name: path_by_name.to_string(),
        state_name: state.name().to_string(),
        state_type: state.kind().into(),
        run_id: run_id.clone(),
    };
    let (_, branch_histories) =
        history.push_concurrency(&item_ctx, ctx.clock.now(), children.len());

    let branch_preempt = AtomicBool::new(false);
    let results: Vec<BranchResult> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(children.len());
        for (child, branch_history) in children.iter().copied().zip(branch_histories.iter()) {
            let child_inputs = plane.child_inputs(state, child);
            let child_path = path.join(child.state_id().clone());
            let child_pbn = format!("{path_by_name}/{}", child.name());
            let fork_plane = &plane;
            let branch_preempt = &branch_preempt;
            handles.push((
                child.state_id().clone(),
                scope.spawn(move || {
                    run_branch(
                        ctx,
                        child,
                        child_path,
                        child_pbn,
                        child_inputs,
                        fork_plane,
                        branch_history,
                        branch_preempt,
                    )
                }),
            ));
        }
        handles
            .into_iter()
            .map(|(child_id, handle)| {
                handle.join().unwrap_or_else(|_| {
                    log::warn!("concurrency branch {child_id} panicked; treated as aborted");
                    BranchResult {
                        child_id: child_id.clone(),
                        outcome: Outcome::aborted(),
                        outputs: BTreeMap::new(),
                    }
                })
            })
            .collect()
    });

    let mut branch_outcomes = Vec::with_capacity(results.len());
    for result in &results {
        if let Some(child) = state.child(&result.child_id) {
            plane.write_child_outputs(state, child, &result.outputs);
        }
        branch_outcomes.push((result.child_id.clone(), result.outcome.clone()));
    }

    if ctx.control.checkpoint(path, preempt, false) == Passage::Preempt {
        return (reserved_outcome(state, PREEMPTED_OUTCOME_ID), plane.container_outputs(state));
    }

    let Some(decider) = state.child(&StateId::decider()) else {
        log::warn!("barrier container {path} has no decider child");
        return (reserved_outcome(state, ABORTED_OUTCOME_ID), plane.container_outputs(state));
    };
    let decider_inputs = plane.child_inputs(state, decider);
    let decider_path = path.join(decider.state_id().clone());
    let decider_pbn = format!("{path_by_name}/{}", decider.name());
    let execution = ChildExecution::new(decider, decider_path.clone(), decider_pbn.clone());
    execution.begin(history, ctx, &decider_inputs, &plane);
    let (mut decider_outcome, decider_outputs) = execute_body(
        ctx,
        decider,
        &decider_path,
        &decider_pbn,
        execution.run_id(),
        &decider_inputs,
        history,
        preempt,
        Some(&branch_outcomes),
    );
    if cancelled(ctx, preempt) {
        decider_outcome = reserved_outcome(decider, PREEMPTED_OUTCOME_ID);
    }
    plane.write_child_outputs(state, decider, &decider_outputs);
    execution.finish(history, ctx, &decider_outputs, &plane, &decider_outcome);

    let outcome = state.outcome(decider_outcome.outcome_id).cloned().unwrap_or_else(|| {
        log::warn!(
            "decider outcome '{}' has no counterpart on {path}; container aborts",
            decider_outcome.name
        );
        reserved_outcome(state, ABORTED_OUTCOME_ID)
    });
    (outcome, plane.container_outputs(state))
}

/// Runs a preemptive-concurrency container: first finisher wins.
#[allow(
    clippy::too_many_arguments,
    reason = "Concurrency runners thread the full boundary context."
)]
fn run_preemptive(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    path_by_name: &str,
    run_id: &RunId,
    inputs: &BTreeMap<String, Value>,
    history: &ExecutionHistory,
    preempt: Option<&AtomicBool>,
) -> (Outcome, BTreeMap<String, Value>) {
    let mut plane = ScopedData::initialize(state, inputs);
    plane.route_container_inputs(state);

    if ctx.control.checkpoint(path, preempt, false) == Passage::Preempt {
        return (reserved_outcome(state, PREEMPTED_OUTCOME_ID), plane.container_outputs(state));
    }

    let children: Vec<&State> = state.children().collect();
    if children.is_empty() {
        return (reserved_outcome(state, SUCCESS_OUTCOME_ID), plane.container_outputs(state));
    }

    let item_ctx = ItemContext {
        path: path.clone(),
        path_by_name: path_by_name.to_string(),
        state_name: state.name().to_string(),
        state_type: state.kind().into(),
        run_id: run_id.clone(),
    };
    let (_, branch_histories) =
        history.push_concurrency(&item_ctx, ctx.clock.now(), children.len());

    let branch_preempt = AtomicBool::new(false);
    let (sender, receiver) = mpsc::channel::<BranchResult>();
    let mut results: Vec<BranchResult> = Vec::with_capacity(children.len());
    let mut winner_id: Option<StateId> = None;

    thread::scope(|scope| {
        for (child, branch_history) in children.iter().copied().zip(branch_histories.iter()) {
            let child_inputs = plane.child_inputs(state, child);
            let child_path = path.join(child.state_id().clone());
            let child_pbn = format!("{path_by_name}/{}", child.name());
            let fork_plane = &plane;
            let branch_preempt = &branch_preempt;
            let sender = sender.clone();
            scope.spawn(move || {
                let result = run_branch(
                    ctx,
                    child,
                    child_path,
                    child_pbn,
                    child_inputs,
                    fork_plane,
                    branch_history,
                    branch_preempt,
                );
                let _ = sender.send(result);
            });
        }
        drop(sender);
        while let Ok(result) = receiver.recv() {
            if winner_id.is_none() {
                winner_id = Some(result.child_id.clone());
                branch_preempt.store(true, Ordering::Release);
            }
            results.push(result);
        }
    });

    for result in &results {
        if let Some(child) = state.child(&result.child_id) {
            plane.write_child_outputs(state, child, &result.outputs);
        }
    }

    let winner = winner_id
        .as_ref()
        .and_then(|id| results.iter().find(|result| result.child_id == *id));
    let Some(winner) = winner else {
        log::warn!("every branch of {path} died; container aborts");
        return (reserved_outcome(state, ABORTED_OUTCOME_ID), plane.container_outputs(state));
    };

    let transition = state.transitions().iter().find(|transition| {
        transition.from_state == winner.child_id
            && transition.from_outcome == Some(winner.outcome.outcome_id)
    });
    let outcome = match transition {
        Some(transition) if transition.leaves(state.state_id()) => transition
            .to_outcome
            .and_then(|id| state.outcome(id))
            .cloned()
            .unwrap_or_else(|| reserved_outcome(state, ABORTED_OUTCOME_ID)),
        Some(_) | None => {
            if winner.outcome.outcome_id == PREEMPTED_OUTCOME_ID
                || winner.outcome.outcome_id == ABORTED_OUTCOME_ID
            {
                state
                    .outcome(winner.outcome.outcome_id)
                    .cloned()
                    .unwrap_or_else(|| reserved_outcome(state, ABORTED_OUTCOME_ID))
            } else {
                log::warn!(
                    "unhandled winner outcome '{}' of {path}; container aborts",
                    winner.outcome.name
                );
                reserved_outcome(state, ABORTED_OUTCOME_ID)
            }
        }
    };
    (outcome, plane.container_outputs(state))
}

// ============================================================================
// SECTION: Library Execution
// ============================================================================

/// Delegates a library state to its loaded inner root.
fn run_library(
    ctx: &RunContext,
    state: &State,
    path: &StatePath,
    path_by_name: &str,
    inputs: &BTreeMap<String, Value>,
    history: &ExecutionHistory,
    preempt: Option<&AtomicBool>,
) -> (Outcome, BTreeMap<String, Value>) {
    let Some(inner) = ctx.libraries.get(path) else {
        log::warn!("library state {path} has no loaded root; aborting");
        return (reserved_outcome(state, ABORTED_OUTCOME_ID), BTreeMap::new());
    };
    let inner_inputs: BTreeMap<String, Value> = inner
        .input_ports()
        .iter()
        .map(|port| {
            let value =
                inputs.get(&port.name).cloned().unwrap_or_else(|| port.default_value.clone());
            (port.name.clone(), value)
        })
        .collect();
    let inner_path = path.join(inner.state_id().clone());
    let inner_pbn = format!("{path_by_name}/{}", inner.name());
    let execution = ChildExecution::new(inner, inner_path.clone(), inner_pbn.clone());
    let empty_plane = ScopedData::default();
    execution.begin(history, ctx, &inner_inputs, &empty_plane);
    let (mut inner_outcome, outputs) = execute_body(
        ctx,
        inner,
        &inner_path,
        &inner_pbn,
        execution.run_id(),
        &inner_inputs,
        history,
        preempt,
        None,
    );
    if cancelled(ctx, preempt) {
        inner_outcome = reserved_outcome(inner, PREEMPTED_OUTCOME_ID);
    }
    execution.finish(history, ctx, &outputs, &empty_plane, &inner_outcome);

    let outcome = state
        .outcome_by_name(&inner_outcome.name)
        .or_else(|| state.outcome(inner_outcome.outcome_id))
        .cloned()
        .unwrap_or_else(|| reserved_outcome(state, ABORTED_OUTCOME_ID));
    (outcome, outputs)
}

// ============================================================================
// SECTION: Library Resolution
// ============================================================================

/// Recursively resolves library states under a subtree.
fn resolve_libraries(
    state: &State,
    path: &StatePath,
    provider: Option<&Arc<dyn LibraryProvider>>,
    out: &mut BTreeMap<StatePath, State>,
    depth: usize,
) -> Result<(), EngineError> {
    if depth > MAX_LIBRARY_DEPTH {
        return Err(EngineError::Library(LibraryError::LoadFailed {
            path: path.to_string(),
            reason: "library nesting too deep".to_string(),
        }));
    }
    if let Some(reference) = state.library_reference() {
        let provider = provider.ok_or_else(|| {
            EngineError::Library(LibraryError::NotFound(reference.library_path.clone()))
        })?;
        let loaded = provider.load(&reference.library_path)?;
        validate_tree(&loaded)?;
        let loaded_path = path.join(loaded.state_id().clone());
        resolve_libraries(&loaded, &loaded_path, Some(provider), out, depth + 1)?;
        out.insert(path.clone(), loaded);
        return Ok(());
    }
    for child in state.children() {
        let child_path = path.join(child.state_id().clone());
        resolve_libraries(child, &child_path, provider, out, depth)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns a reserved outcome of a state, tolerating malformed outcome sets.
fn reserved_outcome(state: &State, id: OutcomeId) -> Outcome {
    state.outcome(id).cloned().unwrap_or_else(|| {
        if id == PREEMPTED_OUTCOME_ID {
            Outcome::preempted()
        } else if id == ABORTED_OUTCOME_ID {
            Outcome::aborted()
        } else {
            Outcome::success()
        }
    })
}

/// Locks the worker slot, recovering from poisoning.
fn lock_worker(
    worker: &Mutex<Option<JoinHandle<RunReport>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<RunReport>>> {
    match worker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Read-locks the machine, recovering from poisoning.
fn read_machine(machine: &Arc<RwLock<StateMachine>>) -> std::sync::RwLockReadGuard<'_, StateMachine> {
    match machine.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
