// stateflow-config/src/library.rs
// ============================================================================
// Module: Stateflow File Library Provider
// Description: Library resolution against configured search directories.
// Purpose: Load persisted library machines referenced by library states.
// Dependencies: log, stateflow-core
// ============================================================================

//! ## Overview
//! The file library provider resolves a library path against the configured
//! search directories in order and loads the first matching persisted
//! machine. Path traversal components are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use stateflow_core::LibraryError;
use stateflow_core::LibraryProvider;
use stateflow_core::State;
use stateflow_core::load_state_machine;

// ============================================================================
// SECTION: File Library Provider
// ============================================================================

/// Library provider resolving references against search directories.
#[derive(Debug, Clone)]
pub struct FileLibraryProvider {
    /// Search directories in resolution order.
    search_paths: Vec<PathBuf>,
}

impl FileLibraryProvider {
    /// Creates a provider over the given search directories.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
        }
    }

    /// Returns the directory a library path resolves to, if any.
    #[must_use]
    pub fn resolve(&self, library_path: &str) -> Option<PathBuf> {
        if !is_safe_relative(Path::new(library_path)) {
            return None;
        }
        self.search_paths
            .iter()
            .map(|base| base.join(library_path))
            .find(|candidate| candidate.join("statemachine.json").is_file())
    }
}

impl LibraryProvider for FileLibraryProvider {
    fn load(&self, library_path: &str) -> Result<State, LibraryError> {
        let resolved = self
            .resolve(library_path)
            .ok_or_else(|| LibraryError::NotFound(library_path.to_string()))?;
        let machine = load_state_machine(&resolved).map_err(|err| LibraryError::LoadFailed {
            path: library_path.to_string(),
            reason: err.to_string(),
        })?;
        log::debug!("library {library_path} loaded from {}", resolved.display());
        Ok(machine.root().clone())
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Returns true for relative paths without traversal components.
fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
