// stateflow-config/src/lib.rs
// ============================================================================
// Module: Stateflow Config Library
// Description: Public API surface for runtime configuration.
// Purpose: Expose config loading and the file-based library provider.
// Dependencies: crate::{config, library}
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits; missing or invalid configuration fails closed. The crate also
//! provides the file-based library provider resolving library references
//! against the configured search paths.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod library;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::EngineSection;
pub use config::HistorySection;
pub use config::LibrarySection;
pub use config::StateflowConfig;
pub use library::FileLibraryProvider;
