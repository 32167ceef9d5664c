// stateflow-core/src/runtime/script.rs
// ============================================================================
// Module: Stateflow Routine Script Host
// Description: Registry-backed script host routing sources to routines.
// Purpose: Bind execution-state scripts to named host routines.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The routine script host resolves a script source to a registered routine
//! by name. Empty sources fall back to the built-in behavior: plain states
//! finish with `success` and no outputs; decider invocations apply the
//! default decider rule, selecting `success` only when every branch
//! succeeded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::outcomes::ABORTED_OUTCOME_ID;
use crate::core::outcomes::SUCCESS_OUTCOME_ID;
use crate::core::state::ScriptSource;
use crate::interfaces::ScriptContext;
use crate::interfaces::ScriptError;
use crate::interfaces::ScriptHost;
use crate::interfaces::ScriptResult;

// ============================================================================
// SECTION: Routine Type
// ============================================================================

/// Host routine bound to a script source name.
pub type Routine = Box<dyn Fn(&ScriptContext<'_>) -> Result<ScriptResult, ScriptError> + Send + Sync>;

// ============================================================================
// SECTION: Routine Script Host
// ============================================================================

/// Script host dispatching sources to registered routines by name.
#[derive(Default)]
pub struct RoutineScriptHost {
    /// Registered routines by name.
    routines: BTreeMap<String, Routine>,
}

impl RoutineScriptHost {
    /// Creates a host with no registered routines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a routine under a name, replacing any previous binding.
    #[must_use]
    pub fn with_routine(
        mut self,
        name: impl Into<String>,
        routine: impl Fn(&ScriptContext<'_>) -> Result<ScriptResult, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        self.routines.insert(name.into(), Box::new(routine));
        self
    }

    /// Applies the default decider rule to branch outcomes.
    fn default_decide(ctx: &ScriptContext<'_>) -> ScriptResult {
        let all_succeeded = ctx
            .branch_outcomes
            .is_some_and(|outcomes| {
                outcomes.iter().all(|(_, outcome)| outcome.outcome_id == SUCCESS_OUTCOME_ID)
            });
        ScriptResult {
            outcome: if all_succeeded {
                SUCCESS_OUTCOME_ID
            } else {
                ABORTED_OUTCOME_ID
            },
            outputs: BTreeMap::new(),
        }
    }
}

impl ScriptHost for RoutineScriptHost {
    fn call(
        &self,
        script: &ScriptSource,
        ctx: &ScriptContext<'_>,
    ) -> Result<ScriptResult, ScriptError> {
        if script.is_empty() {
            if ctx.branch_outcomes.is_some() {
                return Ok(Self::default_decide(ctx));
            }
            return Ok(ScriptResult {
                outcome: SUCCESS_OUTCOME_ID,
                outputs: BTreeMap::new(),
            });
        }
        let routine = self
            .routines
            .get(&script.source)
            .ok_or_else(|| ScriptError::UnknownRoutine(script.source.clone()))?;
        routine(ctx)
    }
}
