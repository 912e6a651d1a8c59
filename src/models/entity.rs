//! Host-facing projection types: entity descriptors and value snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic role of a normalized input on the host platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BinarySensor,
    Sensor,
    Switch,
    Number,
}

impl EntityKind {
    pub fn is_writable(self) -> bool {
        matches!(self, EntityKind::Switch | EntityKind::Number)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Sensor => "sensor",
            EntityKind::Switch => "switch",
            EntityKind::Number => "number",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    // numeric
    Humidity,
    Monetary,
    Power,
    Temperature,
    Duration,
    Energy,
    Frequency,
    Voltage,
    Current,
    VolumeFlowRate,
    // boolean
    Cold,
    Problem,
    Running,
    Window,
    Presence,
    Switch,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous reading.
    Measurement,
    /// Cumulative total (energy counters, costs).
    Total,
}

/// A value as reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl StateValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Integer(v) => Some(*v as f64),
            StateValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(v) => write!(f, "{}", v),
            StateValue::Integer(v) => write!(f, "{}", v),
            StateValue::Float(v) => write!(f, "{}", v),
            StateValue::Text(v) => f.write_str(v),
        }
    }
}

/// Registry record of the device/thing pair owning a set of entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub manufacturer: Option<String>,
    pub model: String,
    pub name: String,
}

/// Static description of one entity, computed once at discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub key: String,
    pub label: String,
    pub unit: String,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub kind: EntityKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub device: DeviceInfo,
}

/// Complete projection of every known input, never a partial delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub values: BTreeMap<String, Option<StateValue>>,
    /// Time of the last successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Set when the most recent refresh failed; values are the last known ones.
    pub stale: bool,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key).and_then(Option::as_ref)
    }
}
