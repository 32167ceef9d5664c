// stateflow-core/src/storage/mod.rs
// ============================================================================
// Module: Stateflow Model Storage
// Description: On-disk layout of a state machine with per-state folders.
// Purpose: Save and load machines so that load(save(m)) is structurally m.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A machine is stored as `statemachine.json` holding the machine metadata
//! plus one folder per state, named by its state id: `core_data.json` with
//! the state's fields and linkage, `script.json` for execution states, and
//! one subfolder per child. Loads are fail-closed: size limits are enforced
//! and the loaded tree is re-validated against the structural invariants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::identifiers::MachineId;
use crate::core::identifiers::StateId;
use crate::core::linkage::DataFlow;
use crate::core::linkage::Transition;
use crate::core::machine::StateMachine;
use crate::core::outcomes::Outcome;
use crate::core::ports::DataPort;
use crate::core::ports::ScopedVariable;
use crate::core::state::ContainerCore;
use crate::core::state::LibraryReference;
use crate::core::state::ScriptSource;
use crate::core::state::State;
use crate::core::state::StateKind;
use crate::core::state::StateVariant;
use crate::core::time::Timestamp;
use crate::core::validate::StructureError;
use crate::core::validate::validate_tree;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Metadata filename at the machine root.
const MACHINE_FILE: &str = "statemachine.json";

/// Per-state core data filename.
const CORE_DATA_FILE: &str = "core_data.json";

/// Per-state script filename, present for execution states only.
const SCRIPT_FILE: &str = "script.json";

/// Maximum accepted size of a single stored file.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Model storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("storage io error at {path}: {reason}")]
    Io {
        /// Offending path.
        path: String,
        /// Failure description.
        reason: String,
    },
    /// A stored file does not parse.
    #[error("storage parse error at {path}: {reason}")]
    Parse {
        /// Offending path.
        path: String,
        /// Failure description.
        reason: String,
    },
    /// A stored file exceeds the size limit.
    #[error("stored file too large: {path}")]
    TooLarge {
        /// Offending path.
        path: String,
    },
    /// The directory does not hold a state machine.
    #[error("no state machine at {path}")]
    NotAStateMachine {
        /// Offending path.
        path: String,
    },
    /// The loaded tree violates the structural invariants.
    #[error(transparent)]
    Structure(#[from] StructureError),
}

// ============================================================================
// SECTION: Stored Shapes
// ============================================================================

/// Root metadata stored in `statemachine.json`.
#[derive(Debug, Serialize, Deserialize)]
struct MachineMeta {
    /// Machine identifier.
    machine_id: MachineId,
    /// Runtime version that saved the machine.
    version: String,
    /// Creation timestamp.
    creation_time: Timestamp,
    /// Timestamp of the save.
    last_update: Timestamp,
    /// Storage id of the root state folder.
    root_state_storage_id: StateId,
}

/// Per-state fields stored in `core_data.json`.
#[derive(Debug, Serialize, Deserialize)]
struct CoreData {
    /// State identifier.
    state_id: StateId,
    /// State name.
    name: String,
    /// Variant discriminant.
    kind: StateKind,
    /// Ordered input ports.
    input_ports: Vec<DataPort>,
    /// Ordered output ports.
    output_ports: Vec<DataPort>,
    /// Ordered outcomes.
    outcomes: Vec<Outcome>,
    /// Container transitions.
    #[serde(default)]
    transitions: Vec<Transition>,
    /// Container data flows.
    #[serde(default)]
    data_flows: Vec<DataFlow>,
    /// Container scoped variables.
    #[serde(default)]
    scoped_variables: Vec<ScopedVariable>,
    /// Container start state.
    #[serde(default)]
    start_state_id: Option<StateId>,
    /// Library reference path.
    #[serde(default)]
    library_path: Option<String>,
}

// ============================================================================
// SECTION: Save
// ============================================================================

/// Saves a machine under a root directory, clearing its dirty flag.
///
/// # Errors
///
/// Returns [`StorageError`] when a file cannot be written.
pub fn save_state_machine(machine: &mut StateMachine, root: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(root).map_err(|err| io_error(root, &err))?;
    let meta = MachineMeta {
        machine_id: machine.machine_id().clone(),
        version: machine.version().to_string(),
        creation_time: machine.creation_time(),
        last_update: Timestamp::now_wall(),
        root_state_storage_id: machine.root().state_id().clone(),
    };
    write_json(&root.join(MACHINE_FILE), &meta)?;
    save_state(machine.root(), &root.join(machine.root().state_id().as_str()))?;
    machine.set_file_system_path(Some(root.to_path_buf()));
    machine.clear_dirty();
    Ok(())
}

/// Saves one state folder recursively.
fn save_state(state: &State, dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;
    let core = CoreData {
        state_id: state.state_id().clone(),
        name: state.name().to_string(),
        kind: state.kind(),
        input_ports: state.input_ports().to_vec(),
        output_ports: state.output_ports().to_vec(),
        outcomes: state.outcomes().to_vec(),
        transitions: state.transitions().to_vec(),
        data_flows: state.data_flows().to_vec(),
        scoped_variables: state.scoped_variables().to_vec(),
        start_state_id: state.start_state_id().cloned(),
        library_path: state.library_reference().map(|reference| reference.library_path.clone()),
    };
    write_json(&dir.join(CORE_DATA_FILE), &core)?;
    if let Some(script) = state.script() {
        write_json(&dir.join(SCRIPT_FILE), script)?;
    }
    for child in state.children() {
        save_state(child, &dir.join(child.state_id().as_str()))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Load
// ============================================================================

/// Loads a machine from a root directory and re-validates it.
///
/// # Errors
///
/// Returns [`StorageError`] on unreadable, malformed, or invalid layouts.
pub fn load_state_machine(root: &Path) -> Result<StateMachine, StorageError> {
    let meta_path = root.join(MACHINE_FILE);
    if !meta_path.is_file() {
        return Err(StorageError::NotAStateMachine {
            path: root.display().to_string(),
        });
    }
    let meta: MachineMeta = read_json(&meta_path)?;
    let root_state = load_state(&root.join(meta.root_state_storage_id.as_str()))?;
    validate_tree(&root_state)?;
    let mut machine = StateMachine::with_machine_id(meta.machine_id, root_state);
    machine.set_version(meta.version);
    machine.set_creation_time(meta.creation_time);
    machine.set_file_system_path(Some(root.to_path_buf()));
    Ok(machine)
}

/// Loads one state folder recursively.
fn load_state(dir: &Path) -> Result<State, StorageError> {
    let core: CoreData = read_json(&dir.join(CORE_DATA_FILE))?;
    let variant = match core.kind {
        StateKind::Execution => {
            let script_path = dir.join(SCRIPT_FILE);
            let script: ScriptSource =
                if script_path.is_file() { read_json(&script_path)? } else { ScriptSource::default() };
            StateVariant::Execution {
                script,
            }
        }
        StateKind::Library => {
            let library_path = core.library_path.clone().ok_or_else(|| StorageError::Parse {
                path: dir.display().to_string(),
                reason: "library state without library_path".to_string(),
            })?;
            StateVariant::Library(LibraryReference::new(library_path))
        }
        StateKind::Hierarchy | StateKind::BarrierConcurrency | StateKind::PreemptiveConcurrency => {
            let mut container = ContainerCore {
                transitions: core.transitions.clone(),
                data_flows: core.data_flows.clone(),
                scoped_variables: core.scoped_variables.clone(),
                start_state_id: core.start_state_id.clone(),
                ..ContainerCore::default()
            };
            let entries = fs::read_dir(dir).map_err(|err| io_error(dir, &err))?;
            for entry in entries {
                let entry = entry.map_err(|err| io_error(dir, &err))?;
                let child_dir = entry.path();
                if child_dir.is_dir() && child_dir.join(CORE_DATA_FILE).is_file() {
                    let child = load_state(&child_dir)?;
                    container.children.insert(child.state_id().clone(), child);
                }
            }
            match core.kind {
                StateKind::BarrierConcurrency => StateVariant::BarrierConcurrency(container),
                StateKind::PreemptiveConcurrency => StateVariant::PreemptiveConcurrency(container),
                _ => StateVariant::Hierarchy(container),
            }
        }
    };
    Ok(State::from_parts(
        core.state_id,
        core.name,
        core.input_ports,
        core.output_ports,
        core.outcomes,
        variant,
    ))
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Writes a value as pretty JSON.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| StorageError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    fs::write(path, rendered).map_err(|err| io_error(path, &err))
}

/// Reads a size-limited JSON file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let metadata = fs::metadata(path).map_err(|err| io_error(path, &err))?;
    if metadata.len() > MAX_FILE_BYTES {
        return Err(StorageError::TooLarge {
            path: path.display().to_string(),
        });
    }
    let raw = fs::read_to_string(path).map_err(|err| io_error(path, &err))?;
    serde_json::from_str(&raw).map_err(|err| StorageError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Maps an I/O failure with path context.
fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
