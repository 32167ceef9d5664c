// stateflow-core/src/core/ports.rs
// ============================================================================
// Module: Stateflow Data Ports
// Description: Typed data ports and scoped variables attached to states.
// Purpose: Describe the data surface of states for flows and execution.
// Dependencies: crate::core::{identifiers, value}, serde
// ============================================================================

//! ## Overview
//! Data ports describe the typed inputs and outputs of a state; scoped
//! variables are container-owned cells with the same shape and a lifetime
//! bound to one container execution. Port names are unique per state and
//! direction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PortId;
use crate::core::value::TypeName;
use crate::core::value::Value;

// ============================================================================
// SECTION: Port Direction
// ============================================================================

/// Direction of a data port relative to its owning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Input port.
    Input,
    /// Output port.
    Output,
    /// Scoped variable of a container.
    Scoped,
}

// ============================================================================
// SECTION: Data Port
// ============================================================================

/// Typed data port of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPort {
    /// Port identifier, unique within the owning state.
    pub data_port_id: PortId,
    /// Port name, unique per state and direction.
    pub name: String,
    /// Declared type of the port.
    pub data_type: TypeName,
    /// Default value used when no data flow drives the port.
    pub default_value: Value,
}

impl DataPort {
    /// Creates a new data port.
    #[must_use]
    pub fn new(
        data_port_id: PortId,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Self {
        Self {
            data_port_id,
            name: name.into(),
            data_type,
            default_value,
        }
    }
}

// ============================================================================
// SECTION: Scoped Variable
// ============================================================================

/// Scoped variable owned by a container state.
///
/// # Invariants
/// - The identifier shares the port id space of the owning state.
/// - Lifetime equals one execution of the owning container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedVariable {
    /// Variable identifier, unique within the owning state's port id space.
    pub data_port_id: PortId,
    /// Variable name, unique among the container's scoped variables.
    pub name: String,
    /// Declared type of the variable.
    pub data_type: TypeName,
    /// Default value assigned at container entry.
    pub default_value: Value,
}

impl ScopedVariable {
    /// Creates a new scoped variable.
    #[must_use]
    pub fn new(
        data_port_id: PortId,
        name: impl Into<String>,
        data_type: TypeName,
        default_value: Value,
    ) -> Self {
        Self {
            data_port_id,
            name: name.into(),
            data_type,
            default_value,
        }
    }
}
