#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// stateflow-cli/src/main.rs
// ============================================================================
// Module: Stateflow CLI Entry Point
// Description: Command dispatcher for machine validation, runs, and logs.
// Purpose: Provide a safe, localized CLI over the core surfaces.
// Dependencies: clap, env_logger, serde_json, stateflow-config, stateflow-core,
// stateflow-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! The Stateflow CLI validates persisted machines, runs them to completion
//! with the configured history store and library paths, and collapses
//! persisted execution logs into per-state records. Inputs are untrusted and
//! validated fail-closed by the underlying crates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::RwLock;

use clap::Parser;
use clap::Subcommand;
use stateflow_config::FileLibraryProvider;
use stateflow_config::StateflowConfig;
use stateflow_core::ExecutionEngine;
use stateflow_core::LogicalClock;
use stateflow_core::RoutineScriptHost;
use stateflow_core::WallClock;
use stateflow_core::load_state_machine;
use stateflow_core::runtime::collapsed_structure;
use stateflow_core::runtime::parse_records;
use stateflow_core::validate_tree;
use stateflow_store_sqlite::SqliteHistoryStore;
use stateflow_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stateflow", version, arg_required_else_help = true)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Validates a persisted state machine.
    Validate {
        /// Directory holding the machine layout.
        machine: PathBuf,
    },
    /// Runs a persisted state machine to completion.
    Run {
        /// Directory holding the machine layout.
        machine: PathBuf,
    },
    /// Collapses a persisted execution log into per-state records.
    History {
        /// Path of the `SQLite` execution log.
        log: PathBuf,
        /// Keep next relations crossing container exits.
        #[arg(long)]
        full_next: bool,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures mapped to exit codes.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load.
    #[error("config error: {0}")]
    Config(#[from] stateflow_config::ConfigError),
    /// A machine failed to load or validate.
    #[error("machine error: {0}")]
    Machine(String),
    /// The engine failed to start or join.
    #[error("engine error: {0}")]
    Engine(#[from] stateflow_core::EngineError),
    /// The history store failed.
    #[error("store error: {0}")]
    Store(String),
    /// Output rendering failed.
    #[error("render error: {0}")]
    Render(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            emit_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Routes a parsed invocation to its handler.
fn dispatch(cli: &Cli) -> Result<(), CliError> {
    let config = StateflowConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Validate {
            machine,
        } => run_validate(machine),
        Command::Run {
            machine,
        } => run_machine(&config, machine),
        Command::History {
            log,
            full_next,
        } => run_history(log, *full_next),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Loads and validates a machine.
fn run_validate(machine_dir: &Path) -> Result<(), CliError> {
    let machine = load_state_machine(machine_dir).map_err(|err| CliError::Machine(err.to_string()))?;
    validate_tree(machine.root()).map_err(|err| CliError::Machine(err.to_string()))?;
    emit(&format!(
        "machine {} is structurally valid (root state {})",
        machine.machine_id(),
        machine.root().state_id()
    ));
    Ok(())
}

/// Runs a machine to completion under the configured setup.
fn run_machine(config: &StateflowConfig, machine_dir: &Path) -> Result<(), CliError> {
    let machine = load_state_machine(machine_dir).map_err(|err| CliError::Machine(err.to_string()))?;

    let mut engine = ExecutionEngine::new(Arc::new(RoutineScriptHost::new()));
    engine = if config.engine.logical_clock {
        engine.with_clock(Arc::new(LogicalClock::new()))
    } else {
        engine.with_clock(Arc::new(WallClock))
    };
    if !config.libraries.search_paths.is_empty() {
        engine = engine.with_library_provider(Arc::new(FileLibraryProvider::new(
            config.libraries.search_paths.clone(),
        )));
    }
    let store = match &config.history.log_path {
        Some(log_path) => {
            let mut store_config = SqliteStoreConfig::new(log_path.clone());
            store_config.busy_timeout_ms = config.history.busy_timeout_ms;
            store_config.journal_mode = config.history.journal_mode;
            store_config.sync_mode = config.history.sync_mode;
            let store = SqliteHistoryStore::open(&store_config)
                .map_err(|err| CliError::Store(err.to_string()))?;
            Some(Arc::new(store))
        }
        None => None,
    };
    if let Some(store) = &store {
        let shared: Arc<dyn stateflow_core::HistoryStore> = Arc::clone(store) as Arc<dyn stateflow_core::HistoryStore>;
        engine = engine.with_store(shared);
    }

    let report = engine.run_to_completion(Arc::new(RwLock::new(machine)))?;
    emit(&format!("outcome: {} ({})", report.outcome.name, report.outcome.outcome_id));
    for (name, value) in &report.outputs {
        emit(&format!("output {name} = {value}"));
    }
    emit(&format!("history items recorded: {}", report.history.len()));
    Ok(())
}

/// Collapses a persisted log into per-state records.
fn run_history(log_path: &Path, full_next: bool) -> Result<(), CliError> {
    let store = SqliteHistoryStore::open_read_only(log_path)
        .map_err(|err| CliError::Store(err.to_string()))?;
    let raw = store.records().map_err(|err| CliError::Store(err.to_string()))?;
    let items = parse_records(&raw).map_err(|err| CliError::Store(err.to_string()))?;
    let collapsed = collapsed_structure(&items, full_next);
    for record in collapsed.records.values() {
        let rendered =
            serde_json::to_string(record).map_err(|err| CliError::Render(err.to_string()))?;
        emit(&rendered);
    }
    emit(&format!("collapsed records: {}", collapsed.records.len()));
    Ok(())
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one line to stdout.
#[allow(clippy::print_stdout, reason = "User-facing CLI output is localized here.")]
fn emit(line: &str) {
    println!("{line}");
}

/// Writes one line to stderr.
#[allow(clippy::print_stderr, reason = "User-facing CLI errors are localized here.")]
fn emit_error(line: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "error: {line}");
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::Parser;

    use super::Cli;
    use super::Command;

    /// Tests that the CLI definition is internally consistent.
    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    /// Tests subcommand parsing.
    #[test]
    fn history_flags_parse() {
        let cli = Cli::try_parse_from(["stateflow", "history", "run/log.db", "--full-next"])
            .unwrap();
        match cli.command {
            Command::History {
                log,
                full_next,
            } => {
                assert!(full_next);
                assert_eq!(log, std::path::PathBuf::from("run/log.db"));
            }
            Command::Validate {
                ..
            }
            | Command::Run {
                ..
            } => panic!("unexpected command"),
        }
    }
}
