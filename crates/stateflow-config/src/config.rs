// stateflow-config/src/config.rs
// ============================================================================
// Module: Stateflow Configuration
// Description: Configuration loading and validation for Stateflow.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, stateflow-store-sqlite, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits. Missing or invalid configuration fails closed; every section has
//! conservative defaults so an absent file yields a usable in-memory setup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use stateflow_store_sqlite::SqliteStoreMode;
use stateflow_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "stateflow.toml";

/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "STATEFLOW_CONFIG";

/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;

/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Maximum number of library search paths.
pub(crate) const MAX_LIBRARY_SEARCH_PATHS: usize = 64;

/// Default busy timeout for the history database (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file cannot be read.
    #[error("config io error at {path}: {reason}")]
    Io {
        /// Offending path.
        path: String,
        /// Failure description.
        reason: String,
    },
    /// The config file exceeds the size limit.
    #[error("config file too large: {path}")]
    TooLarge {
        /// Offending path.
        path: String,
    },
    /// The config file does not parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A configured path violates the limits.
    #[error("invalid config path: {0}")]
    InvalidPath(String),
    /// A configured limit is out of range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// SECTION: Config Sections
// ============================================================================

/// History log configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct HistorySection {
    /// Path of the `SQLite` execution log; in-memory history when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Library resolution configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LibrarySection {
    /// Directories searched for persisted library machines.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Use a logical clock instead of wall time for history items.
    #[serde(default)]
    pub logical_clock: bool,
}

/// Top-level Stateflow runtime configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StateflowConfig {
    /// History log settings.
    #[serde(default)]
    pub history: HistorySection,
    /// Library resolution settings.
    #[serde(default)]
    pub libraries: LibrarySection,
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineSection,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl StateflowConfig {
    /// Loads configuration from an explicit path, the `STATEFLOW_CONFIG`
    /// environment variable, or `stateflow.toml` in the working directory.
    ///
    /// A missing file yields the defaults; an unreadable or invalid file
    /// fails closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map(Path::to_path_buf).or_else(|| {
            env::var_os(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_NAME)))
        });
        let Some(resolved) = resolved else {
            return Ok(Self::default());
        };
        if !resolved.is_file() {
            if path.is_some() {
                return Err(ConfigError::Io {
                    path: resolved.display().to_string(),
                    reason: "file not found".to_string(),
                });
            }
            return Ok(Self::default());
        }

        let metadata = fs::metadata(&resolved).map_err(|err| ConfigError::Io {
            path: resolved.display().to_string(),
            reason: err.to_string(),
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: resolved.display().to_string(),
            });
        }
        let raw = fs::read_to_string(&resolved).map_err(|err| ConfigError::Io {
            path: resolved.display().to_string(),
            reason: err.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configured paths and limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on limit violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(log_path) = &self.history.log_path {
            validate_path(log_path)?;
        }
        if self.libraries.search_paths.len() > MAX_LIBRARY_SEARCH_PATHS {
            return Err(ConfigError::InvalidValue(format!(
                "too many library search paths (max {MAX_LIBRARY_SEARCH_PATHS})"
            )));
        }
        for search_path in &self.libraries.search_paths {
            validate_path(search_path)?;
        }
        if self.history.busy_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("busy_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Enforces path length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let rendered = path.display().to_string();
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::InvalidPath(rendered));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::InvalidPath(rendered));
        }
    }
    Ok(())
}
