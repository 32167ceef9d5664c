// stateflow-core/src/runtime/control.rs
// ============================================================================
// Module: Stateflow Execution Control
// Description: Engine mode machine, cancellation flag, and step directives.
// Purpose: Mediate run/pause/stop/step decisions at state boundaries.
// Dependencies: crate::core::path, serde
// ============================================================================

//! ## Overview
//! The control is an explicit state machine consulted at every entry/exit
//! boundary. Worker threads block here while paused; stop and preemption are
//! flags observed at the next boundary; step directives grant passage
//! through a bounded set of boundaries before pausing again. Backward steps
//! are delivered as a rewind passage to the enclosing hierarchy loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

use crate::core::path::StatePath;

// ============================================================================
// SECTION: Engine Mode
// ============================================================================

/// Global mode of the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// No run is active.
    Stopped,
    /// The run advances freely.
    Running,
    /// The run is parked at boundaries.
    Paused,
    /// A step directive is draining.
    Stepping,
}

/// Step directives accepted while paused or running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Stop at the next boundary regardless of depth.
    Into,
    /// Stop at the next boundary at or above the current depth.
    Over,
    /// Stop when leaving the current container.
    Out,
}

/// Decision returned by a boundary checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passage {
    /// Continue executing.
    Proceed,
    /// Unwind one recorded step; honored by hierarchy loops.
    Rewind,
    /// Exit via the preempted outcome.
    Preempt,
}

/// Engine status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Current engine mode.
    pub mode: EngineMode,
    /// Path of the state at the most recent boundary.
    pub active_state_path: Option<StatePath>,
}

// ============================================================================
// SECTION: Execution Control
// ============================================================================

/// Pending step grant.
#[derive(Debug, Clone, Copy)]
struct StepGrant {
    /// Requested step mode.
    mode: StepMode,
    /// Boundary depth at request time.
    reference_depth: usize,
    /// Set once the boundary the engine was parked at has been passed.
    started: bool,
}

/// Mutable control state guarded by the mutex.
#[derive(Debug)]
struct ControlInner {
    /// Current engine mode.
    mode: EngineMode,
    /// Pending step grant while stepping.
    grant: Option<StepGrant>,
    /// Pending backward-step request.
    backstep: bool,
    /// Path of the most recent boundary.
    active_path: Option<StatePath>,
}

/// Shared control consulted by every boundary checkpoint.
#[derive(Debug)]
pub struct ExecutionControl {
    /// Mode machine state.
    inner: Mutex<ControlInner>,
    /// Wakes boundary waiters on mode changes.
    wakeup: Condvar,
    /// Cancellation flag set by `stop`.
    stop_flag: AtomicBool,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionControl {
    /// Creates a stopped control.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlInner {
                mode: EngineMode::Stopped,
                grant: None,
                backstep: false,
                active_path: None,
            }),
            wakeup: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        }
    }

    /// Arms the control for a fresh run.
    pub fn begin_run(&self) {
        self.stop_flag.store(false, Ordering::Release);
        let mut inner = self.lock();
        inner.mode = EngineMode::Running;
        inner.grant = None;
        inner.backstep = false;
        inner.active_path = None;
    }

    /// Marks the run finished and releases every waiter.
    pub fn finish_run(&self) {
        let mut inner = self.lock();
        inner.mode = EngineMode::Stopped;
        inner.grant = None;
        inner.backstep = false;
        drop(inner);
        self.wakeup.notify_all();
    }

    /// Requests cancellation; every branch exits via `preempted` at its
    /// next boundary.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wakeup.notify_all();
    }

    /// Parks the run at the next boundary of every worker.
    pub fn pause(&self) {
        let mut inner = self.lock();
        if matches!(inner.mode, EngineMode::Running | EngineMode::Stepping) {
            inner.mode = EngineMode::Paused;
            inner.grant = None;
        }
        drop(inner);
        self.wakeup.notify_all();
    }

    /// Resumes free execution.
    pub fn resume(&self) {
        let mut inner = self.lock();
        if matches!(inner.mode, EngineMode::Paused | EngineMode::Stepping) {
            inner.mode = EngineMode::Running;
            inner.grant = None;
            inner.backstep = false;
        }
        drop(inner);
        self.wakeup.notify_all();
    }

    /// Grants passage until the step directive is exhausted.
    pub fn step(&self, mode: StepMode) {
        let mut inner = self.lock();
        if inner.mode == EngineMode::Stopped {
            return;
        }
        let reference_depth = inner.active_path.as_ref().map_or(0, StatePath::depth);
        inner.grant = Some(StepGrant {
            mode,
            reference_depth,
            started: inner.mode == EngineMode::Running,
        });
        inner.mode = EngineMode::Stepping;
        drop(inner);
        self.wakeup.notify_all();
    }

    /// Requests one backward step; honored at the next paused hierarchy
    /// boundary.
    pub fn request_backstep(&self) {
        let mut inner = self.lock();
        if inner.mode == EngineMode::Stopped {
            return;
        }
        inner.backstep = true;
        drop(inner);
        self.wakeup.notify_all();
    }

    /// Returns the current status snapshot.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let inner = self.lock();
        EngineStatus {
            mode: inner.mode,
            active_state_path: inner.active_path.clone(),
        }
    }

    /// Returns true once the run finished or was stopped.
    #[must_use]
    pub fn finished_or_stopped(&self) -> bool {
        self.lock().mode == EngineMode::Stopped
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Consults the control at a state boundary.
    ///
    /// Blocks while paused; returns [`Passage::Preempt`] on cancellation or
    /// a set branch-preemption flag, and [`Passage::Rewind`] when a backward
    /// step is pending and `allow_rewind` is set.
    pub fn checkpoint(
        &self,
        path: &StatePath,
        preempt: Option<&AtomicBool>,
        allow_rewind: bool,
    ) -> Passage {
        let mut inner = self.lock();
        inner.active_path = Some(path.clone());
        loop {
            if self.stop_flag.load(Ordering::Acquire)
                || preempt.is_some_and(|flag| flag.load(Ordering::Acquire))
            {
                return Passage::Preempt;
            }
            match inner.mode {
                EngineMode::Stopped => return Passage::Preempt,
                EngineMode::Running => return Passage::Proceed,
                EngineMode::Paused => {
                    if inner.backstep && allow_rewind {
                        inner.backstep = false;
                        return Passage::Rewind;
                    }
                    inner = self.wait(inner);
                }
                EngineMode::Stepping => {
                    let Some(grant) = inner.grant.as_mut() else {
                        inner.mode = EngineMode::Paused;
                        continue;
                    };
                    if !grant.started {
                        grant.started = true;
                        return Passage::Proceed;
                    }
                    let depth = path.depth();
                    let stop_here = match grant.mode {
                        StepMode::Into => true,
                        StepMode::Over => depth <= grant.reference_depth,
                        StepMode::Out => depth < grant.reference_depth,
                    };
                    if stop_here {
                        inner.grant = None;
                        inner.mode = EngineMode::Paused;
                    } else {
                        return Passage::Proceed;
                    }
                }
            }
        }
    }

    /// Locks the inner state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, ControlInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Waits for a wakeup, recovering from poisoning.
    fn wait<'a>(&'a self, guard: MutexGuard<'a, ControlInner>) -> MutexGuard<'a, ControlInner> {
        match self.wakeup.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
