// stateflow-core/src/runtime/scoped_data.rs
// ============================================================================
// Module: Stateflow Scoped Data Plane
// Description: Per-container runtime map of port and variable values.
// Purpose: Resolve data-flow routing during one container execution.
// Dependencies: crate::core, log, serde
// ============================================================================

//! ## Overview
//! Each container execution owns one scoped data plane: a map from
//! `(state id, port id)` keys to named, typed values. Container inputs and
//! scoped-variable defaults seed the plane at entry; child outputs are
//! staged into it at exit and routed onward to scoped variables and
//! container outputs. Only the container's controlling task mutates the
//! plane; concurrency branches read their inputs before fork and write
//! outputs after join.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PortId;
use crate::core::identifiers::StateId;
use crate::core::ports::PortDirection;
use crate::core::state::State;
use crate::core::value::TypeName;
use crate::core::value::Value;

// ============================================================================
// SECTION: Scoped Key
// ============================================================================

/// Key of one scoped data entry: a port or scoped variable of one state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScopedKey {
    /// State owning the port or scoped variable.
    pub state_id: StateId,
    /// Port or scoped-variable identifier.
    pub port_id: PortId,
}

impl ScopedKey {
    /// Creates a scoped key.
    #[must_use]
    pub const fn new(state_id: StateId, port_id: PortId) -> Self {
        Self {
            state_id,
            port_id,
        }
    }

    /// Renders the key as `state:port` for snapshots.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}:{}", self.state_id, self.port_id)
    }

    /// Parses a rendered key.
    #[must_use]
    pub fn parse(rendered: &str) -> Option<Self> {
        let (state, port) = rendered.rsplit_once(':')?;
        let port_id = port.parse::<u64>().ok()?;
        Some(Self::new(StateId::from(state), PortId::from_raw(port_id)))
    }
}

// ============================================================================
// SECTION: Scoped Data Item
// ============================================================================

/// One named, typed value held by the plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedDataItem {
    /// Port or variable name.
    pub name: String,
    /// Declared type.
    pub data_type: TypeName,
    /// Current value.
    pub value: Value,
    /// Direction of the originating port.
    pub direction: PortDirection,
}

/// Serializable snapshot of a plane, keyed by rendered scoped keys.
pub type ScopedDataSnapshot = BTreeMap<String, ScopedDataItem>;

// ============================================================================
// SECTION: Scoped Data Plane
// ============================================================================

/// Scoped data plane of one container execution.
#[derive(Debug, Clone, Default)]
pub struct ScopedData {
    /// Entries keyed by owning state and port.
    entries: BTreeMap<ScopedKey, ScopedDataItem>,
}

impl ScopedData {
    /// Seeds a plane from container inputs and scoped-variable defaults.
    #[must_use]
    pub fn initialize(container: &State, inputs: &BTreeMap<String, Value>) -> Self {
        let mut plane = Self::default();
        let container_id = container.state_id().clone();
        for port in container.input_ports() {
            let value = inputs.get(&port.name).cloned().unwrap_or_else(|| port.default_value.clone());
            plane.entries.insert(
                ScopedKey::new(container_id.clone(), port.data_port_id),
                ScopedDataItem {
                    name: port.name.clone(),
                    data_type: port.data_type,
                    value,
                    direction: PortDirection::Input,
                },
            );
        }
        for variable in container.scoped_variables() {
            plane.entries.insert(
                ScopedKey::new(container_id.clone(), variable.data_port_id),
                ScopedDataItem {
                    name: variable.name.clone(),
                    data_type: variable.data_type,
                    value: variable.default_value.clone(),
                    direction: PortDirection::Scoped,
                },
            );
        }
        plane
    }

    /// Returns the value stored under a key, if any.
    #[must_use]
    pub fn value(&self, key: &ScopedKey) -> Option<&Value> {
        self.entries.get(key).map(|item| &item.value)
    }

    /// Resolves the inputs of a child by following the container's data
    /// flows; ports without a driving flow or staged source fall back to
    /// their defaults.
    #[must_use]
    pub fn child_inputs(&self, container: &State, child: &State) -> BTreeMap<String, Value> {
        let mut inputs = BTreeMap::new();
        for port in child.input_ports() {
            // Structural validation already rejected double-driven targets.
            debug_assert!(
                container
                    .data_flows()
                    .iter()
                    .filter(|flow| flow.to_state == *child.state_id()
                        && flow.to_key == port.data_port_id)
                    .count()
                    <= 1
            );
            let flow = container.data_flows().iter().find(|flow| {
                flow.to_state == *child.state_id() && flow.to_key == port.data_port_id
            });
            let staged = flow.and_then(|flow| {
                self.value(&ScopedKey::new(flow.from_state.clone(), flow.from_key))
            });
            let value = match staged {
                Some(value) => coerce(value, port.data_type, &port.name),
                None => port.default_value.clone(),
            };
            inputs.insert(port.name.clone(), value);
        }
        inputs
    }

    /// Stages child outputs into the plane and routes them to scoped
    /// variables and container outputs per the data flows.
    pub fn write_child_outputs(
        &mut self,
        container: &State,
        child: &State,
        outputs: &BTreeMap<String, Value>,
    ) {
        let container_id = container.state_id().clone();
        for port in child.output_ports() {
            let Some(value) = outputs.get(&port.name) else {
                continue;
            };
            self.entries.insert(
                ScopedKey::new(child.state_id().clone(), port.data_port_id),
                ScopedDataItem {
                    name: port.name.clone(),
                    data_type: port.data_type,
                    value: value.clone(),
                    direction: PortDirection::Output,
                },
            );
            for flow in container.data_flows() {
                if flow.from_state != *child.state_id() || flow.from_key != port.data_port_id {
                    continue;
                }
                if flow.to_state != container_id {
                    continue;
                }
                self.route_to_container(container, flow.to_key, value);
            }
        }
    }

    /// Routes a container input into scoped variables it drives.
    pub fn route_container_inputs(&mut self, container: &State) {
        let container_id = container.state_id().clone();
        let mut routed = Vec::new();
        for flow in container.data_flows() {
            if flow.from_state != container_id || flow.to_state != container_id {
                continue;
            }
            if container.scoped_variable(flow.to_key).is_none() {
                continue;
            }
            if let Some(value) = self.value(&ScopedKey::new(container_id.clone(), flow.from_key)) {
                routed.push((flow.to_key, value.clone()));
            }
        }
        for (key, value) in routed {
            self.route_to_container(container, key, &value);
        }
    }

    /// Collects the container's outputs from the plane; unset outputs fall
    /// back to their defaults or to scoped variables routed into them.
    #[must_use]
    pub fn container_outputs(&self, container: &State) -> BTreeMap<String, Value> {
        let container_id = container.state_id().clone();
        let mut outputs = BTreeMap::new();
        for port in container.output_ports() {
            let staged = self.value(&ScopedKey::new(container_id.clone(), port.data_port_id));
            let routed = container
                .data_flows()
                .iter()
                .find(|flow| {
                    flow.to_state == container_id
                        && flow.to_key == port.data_port_id
                        && flow.from_state == container_id
                })
                .and_then(|flow| self.value(&ScopedKey::new(container_id.clone(), flow.from_key)));
            let value = staged
                .or(routed)
                .cloned()
                .unwrap_or_else(|| port.default_value.clone());
            outputs.insert(port.name.clone(), value);
        }
        outputs
    }

    /// Writes one value into a container-side target (scoped variable or
    /// output port).
    fn route_to_container(&mut self, container: &State, target: PortId, value: &Value) {
        let container_id = container.state_id().clone();
        if let Some(variable) = container.scoped_variable(target) {
            self.entries.insert(
                ScopedKey::new(container_id, target),
                ScopedDataItem {
                    name: variable.name.clone(),
                    data_type: variable.data_type,
                    value: coerce(value, variable.data_type, &variable.name),
                    direction: PortDirection::Scoped,
                },
            );
        } else if let Some(port) = container.output_port(target) {
            self.entries.insert(
                ScopedKey::new(container_id, target),
                ScopedDataItem {
                    name: port.name.clone(),
                    data_type: port.data_type,
                    value: coerce(value, port.data_type, &port.name),
                    direction: PortDirection::Output,
                },
            );
        }
    }

    /// Returns a serializable snapshot of the plane.
    #[must_use]
    pub fn snapshot(&self) -> ScopedDataSnapshot {
        self.entries.iter().map(|(key, item)| (key.render(), item.clone())).collect()
    }

    /// Rebuilds a plane from a snapshot, e.g. for backward stepping.
    #[must_use]
    pub fn from_snapshot(snapshot: &ScopedDataSnapshot) -> Self {
        let mut plane = Self::default();
        for (rendered, item) in snapshot {
            if let Some(key) = ScopedKey::parse(rendered) {
                plane.entries.insert(key, item.clone());
            }
        }
        plane
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Converts a routed value to the declared target type, keeping the raw
/// value when the runtime shape disagrees with the declaration.
fn coerce(value: &Value, declared: TypeName, name: &str) -> Value {
    value.convert_to(declared).unwrap_or_else(|err| {
        log::warn!("scoped data for '{name}' keeps unconverted value: {err}");
        value.clone()
    })
}
