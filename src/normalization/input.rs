//! The normalized input: one classified, typed, unit-resolved vendor resource.

use crate::models::entity::{DeviceClass, DeviceInfo, EntityDescriptor, EntityKind, StateClass, StateValue};
use crate::models::febos::{DeviceId, Input, InputType, InstallationId, ThingId};
use crate::normalization::resolver::{ClassificationError, ResolverTables, Scale};
use log::debug;
use serde_json::Value;
use std::fmt;

pub const CATEGORY_PARAMETER: &str = "C_PARAMETER";
pub const CATEGORY_DATA: &str = "C_DATA";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RawType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl RawType {
    pub fn name(self) -> &'static str {
        match self {
            RawType::Integer => "integer",
            RawType::Float => "float",
            RawType::Boolean => "boolean",
            RawType::Text => "text",
        }
    }

    /// Convert a vendor JSON value into this type.
    pub fn convert(self, value: &Value) -> Result<RawValue, ConversionError> {
        let err = || ConversionError {
            expected: self,
            value: value.to_string(),
        };
        match self {
            RawType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .map(RawValue::Integer)
                    .ok_or_else(err),
                Value::String(s) => s.trim().parse().map(RawValue::Integer).map_err(|_| err()),
                Value::Bool(b) => Ok(RawValue::Integer(i64::from(*b))),
                _ => Err(err()),
            },
            RawType::Float => match value {
                Value::Number(n) => n.as_f64().map(RawValue::Float).ok_or_else(err),
                Value::String(s) => s.trim().parse().map(RawValue::Float).map_err(|_| err()),
                _ => Err(err()),
            },
            RawType::Boolean => match value {
                Value::Bool(b) => Ok(RawValue::Boolean(*b)),
                Value::Number(n) => Ok(RawValue::Boolean(n.as_f64().is_some_and(|f| f != 0.0))),
                Value::String(s) => match s.trim() {
                    "" | "0" | "false" => Ok(RawValue::Boolean(false)),
                    "1" | "true" => Ok(RawValue::Boolean(true)),
                    _ => Err(err()),
                },
                _ => Err(err()),
            },
            RawType::Text => match value {
                Value::String(s) => Ok(RawValue::Text(s.clone())),
                Value::Null | Value::Array(_) | Value::Object(_) => Err(err()),
                other => Ok(RawValue::Text(other.to_string())),
            },
        }
    }
}

/// A raw value stored before scaling.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl RawValue {
    fn as_bool(&self) -> bool {
        match self {
            RawValue::Integer(v) => *v != 0,
            RawValue::Float(v) => *v != 0.0,
            RawValue::Boolean(v) => *v,
            RawValue::Text(s) => !s.is_empty(),
        }
    }

    /// JSON form sent to the vendor. Booleans travel as 0/1.
    pub fn to_json(&self) -> Value {
        match self {
            RawValue::Integer(v) => Value::from(*v),
            RawValue::Float(v) => Value::from(*v),
            RawValue::Boolean(v) => Value::from(i64::from(*v)),
            RawValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(v) => write!(f, "{}", v),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Boolean(v) => write!(f, "{}", v),
            RawValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub expected: RawType,
    pub value: String,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot convert {} to {}", self.value, self.expected.name())
    }
}

impl std::error::Error for ConversionError {}

/// Composite identity of an input within the whole session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputIdentity {
    pub installation_id: InstallationId,
    pub device_id: DeviceId,
    pub thing_id: ThingId,
    pub code: String,
}

pub struct NormalizedInput {
    pub key: String,
    pub identity: InputIdentity,
    pub thing_model_id: Option<i64>,
    pub device: DeviceInfo,
    pub category: String,
    pub raw_type: RawType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    // derived once at construction; inputs are immutable afterwards
    label: String,
    unit: String,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    kind: EntityKind,
    scale: Scale,
    inverted: bool,
    raw_value: Option<RawValue>,
}

impl fmt::Debug for NormalizedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedInput")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("raw_type", &self.raw_type)
            .field("raw_value", &self.raw_value)
            .finish_non_exhaustive()
    }
}

impl NormalizedInput {
    pub fn new(
        key: String,
        installation_id: InstallationId,
        thing_model_id: Option<i64>,
        device: DeviceInfo,
        input: &Input,
        tables: &ResolverTables,
    ) -> Result<Self, ClassificationError> {
        let code = input.code.as_str();
        let raw_type = if tables.forces_boolean(code) {
            RawType::Boolean
        } else {
            match input.input_type {
                InputType::Int => RawType::Integer,
                InputType::Float => RawType::Float,
                InputType::Bool => RawType::Boolean,
                InputType::String => RawType::Text,
            }
        };

        let kind = entity_kind(tables, &input.category, raw_type, code, thing_model_id)?;
        let unit = match kind {
            EntityKind::Sensor | EntityKind::Number => tables.resolve_unit(code, input.meas_unit.as_deref()),
            EntityKind::BinarySensor | EntityKind::Switch => String::new(),
        };
        let (device_class, state_class) = match kind {
            EntityKind::BinarySensor => (Some(tables.boolean_class(code)?), None),
            EntityKind::Switch => (Some(DeviceClass::Switch), None),
            EntityKind::Number => (tables.numeric_class(code, &unit)?, None),
            EntityKind::Sensor => {
                let class = tables.numeric_class(code, &unit)?;
                (class, Some(ResolverTables::state_class(class)))
            }
        };

        let raw_value = match (raw_type, input.default_int_value) {
            (RawType::Integer, Some(v)) => Some(RawValue::Integer(v)),
            _ => None,
        };

        Ok(NormalizedInput {
            key,
            identity: InputIdentity {
                installation_id,
                device_id: input.device_id,
                thing_id: input.thing_id,
                code: input.code.clone(),
            },
            thing_model_id,
            device,
            category: input.category.clone(),
            raw_type,
            min: input.min,
            max: input.max,
            label: tables.label(code, input.name.as_deref()),
            unit,
            device_class,
            state_class,
            kind,
            scale: tables.scale(code),
            inverted: !tables.polarity(device_class, true),
            raw_value,
        })
    }

    pub fn code(&self) -> &str {
        &self.identity.code
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        self.device_class
    }

    pub fn state_class(&self) -> Option<StateClass> {
        self.state_class
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn raw_value(&self) -> Option<&RawValue> {
        self.raw_value.as_ref()
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor {
            key: self.key.clone(),
            label: self.label.clone(),
            unit: self.unit.clone(),
            device_class: self.device_class,
            state_class: self.state_class,
            kind: self.kind,
            min: self.min,
            max: self.max,
            device: self.device.clone(),
        }
    }

    /// Convert and store a vendor value. Returns whether the stored value changed.
    /// Callers use the result to notify listeners once their own locks are released.
    pub fn set_raw_value(&mut self, value: Option<&Value>) -> Result<bool, ConversionError> {
        let converted = match value {
            None | Some(Value::Null) => None,
            Some(v) => Some(self.raw_type.convert(v)?),
        };
        Ok(self.store(converted))
    }

    pub(crate) fn store(&mut self, value: Option<RawValue>) -> bool {
        if self.raw_value == value {
            return false;
        }
        debug!(
            "{}: {} ==> {}",
            self.key,
            display_opt(self.raw_value.as_ref()),
            display_opt(value.as_ref())
        );
        self.raw_value = value;
        true
    }

    /// The raw value with the code-specific numeric transform applied.
    pub fn scaled_value(&self) -> Option<StateValue> {
        let raw = self.raw_value.as_ref()?;
        Some(match raw {
            RawValue::Text(s) => StateValue::Text(s.clone()),
            RawValue::Boolean(b) => StateValue::Bool(*b),
            RawValue::Integer(v) if self.scale.is_identity() => StateValue::Integer(*v),
            RawValue::Integer(v) => StateValue::Float(self.scale.apply(*v as f64)),
            RawValue::Float(v) => StateValue::Float(self.scale.apply(*v)),
        })
    }

    /// The value as the host sees it for this entity kind.
    pub fn normalized_value(&self) -> Option<StateValue> {
        match self.kind {
            EntityKind::BinarySensor => {
                let raw = self.raw_value.as_ref()?;
                Some(StateValue::Bool(raw.as_bool() != self.inverted))
            }
            EntityKind::Switch => self.raw_value.as_ref().map(|raw| StateValue::Bool(raw.as_bool())),
            EntityKind::Sensor | EntityKind::Number => self.scaled_value(),
        }
    }

    /// Convert a host-side value back to the vendor's raw scale and type.
    pub fn raw_from_state(&self, value: &StateValue) -> Result<RawValue, ConversionError> {
        let err = || ConversionError {
            expected: self.raw_type,
            value: value.to_string(),
        };
        match (self.raw_type, value) {
            (RawType::Boolean, StateValue::Bool(b)) => Ok(RawValue::Boolean(*b != self.inverted)),
            (RawType::Text, StateValue::Text(s)) => Ok(RawValue::Text(s.clone())),
            (RawType::Integer | RawType::Float, v) => {
                let scaled = v.as_f64().ok_or_else(err)?;
                if !scaled.is_finite() {
                    return Err(err());
                }
                let raw = self.scale.invert(scaled);
                Ok(match self.raw_type {
                    RawType::Integer => RawValue::Integer(raw.round() as i64),
                    _ => RawValue::Float(raw),
                })
            }
            _ => Err(err()),
        }
    }
}

fn display_opt(v: Option<&RawValue>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}

/// Entity kind as a pure function of category, raw type, code and thing model.
pub fn entity_kind(
    tables: &ResolverTables,
    category: &str,
    raw_type: RawType,
    code: &str,
    thing_model_id: Option<i64>,
) -> Result<EntityKind, ClassificationError> {
    let force_read_only = tables.forces_read_only(thing_model_id, code);
    if category == CATEGORY_PARAMETER && !force_read_only {
        match raw_type {
            RawType::Boolean => Ok(EntityKind::Switch),
            RawType::Integer | RawType::Float => Ok(EntityKind::Number),
            RawType::Text => Err(ClassificationError::UnsupportedParameterType {
                code: code.to_string(),
                raw_type: raw_type.name(),
            }),
        }
    } else if category == CATEGORY_DATA || force_read_only {
        match raw_type {
            RawType::Boolean => Ok(EntityKind::BinarySensor),
            _ => Ok(EntityKind::Sensor),
        }
    } else {
        Err(ClassificationError::UnknownCategory {
            code: code.to_string(),
            category: category.to_string(),
        })
    }
}
