//! Fixed lookup tables mapping vendor codes and unit strings to semantic classifications.
//!
//! The built-in tables are immutable and built once; every consumer takes a
//! `&ResolverTables` so tests can substitute smaller fixtures.

use crate::models::entity::{DeviceClass, StateClass};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

// =====================
// Semantic units
// =====================

pub mod units {
    pub const PERCENTAGE: &str = "%";
    pub const EURO: &str = "€";

    pub const WATT: &str = "W";
    pub const KILO_WATT: &str = "kW";
    pub const CELSIUS: &str = "°C";
    pub const HOURS: &str = "h";
    pub const MINUTES: &str = "min";
    pub const SECONDS: &str = "s";
    pub const MILLISECONDS: &str = "ms";
    pub const WATT_HOUR: &str = "Wh";
    pub const KILO_WATT_HOUR: &str = "kWh";
    pub const HERTZ: &str = "Hz";
    pub const VOLT: &str = "V";
    pub const AMPERE: &str = "A";
    pub const LITERS_PER_MINUTE: &str = "L/min";
    pub const LITERS_PER_HOUR: &str = "L/h";

    pub const POWER: &[&str] = &[WATT, KILO_WATT];
    pub const TEMPERATURE: &[&str] = &[CELSIUS];
    pub const DURATION: &[&str] = &[HOURS, MINUTES, SECONDS, MILLISECONDS];
    pub const ENERGY: &[&str] = &[WATT_HOUR, KILO_WATT_HOUR];
    pub const FREQUENCY: &[&str] = &[HERTZ];
    pub const VOLTAGE: &[&str] = &[VOLT];
    pub const CURRENT: &[&str] = &[AMPERE];
    pub const VOLUME_FLOW_RATE: &[&str] = &[LITERS_PER_MINUTE, LITERS_PER_HOUR];
}

// =====================
// Errors
// =====================

/// A vendor resource the tables cannot classify. Never defaulted silently.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationError {
    UnmappedUnit { code: String, unit: String },
    MissingBooleanClass(String),
    UnknownCategory { code: String, category: String },
    UnsupportedParameterType { code: String, raw_type: &'static str },
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationError::UnmappedUnit { code, unit } => {
                write!(f, "invalid measurement unit '{}' for '{}'", unit, code)
            }
            ClassificationError::MissingBooleanClass(code) => {
                write!(f, "no boolean device class known for '{}'", code)
            }
            ClassificationError::UnknownCategory { code, category } => {
                write!(f, "unknown input category '{}' for '{}'", category, code)
            }
            ClassificationError::UnsupportedParameterType { code, raw_type } => {
                write!(f, "parameter '{}' has unsupported value type {}", code, raw_type)
            }
        }
    }
}

impl std::error::Error for ClassificationError {}

// =====================
// Scaling
// =====================

/// Numeric post-processing applied to a raw value before it reaches the host.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Scale {
    Identity,
    Divide(f64),
    Multiply(f64),
    /// Two's-complement 16-bit correction.
    Int16,
    /// Two's-complement 16-bit correction, then divide.
    Int16Divide(f64),
}

fn int16(v: i64) -> i64 {
    if v < 32768 { v } else { v - 65536 }
}

fn uint16(v: i64) -> i64 {
    if v < 0 { v + 65536 } else { v }
}

impl Scale {
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Scale::Identity => raw,
            Scale::Divide(n) => raw / n,
            Scale::Multiply(n) => raw * n,
            Scale::Int16 => int16(raw as i64) as f64,
            Scale::Int16Divide(n) => int16(raw as i64) as f64 / n,
        }
    }

    /// Exact inverse of [`Scale::apply`], back to the vendor's raw scale.
    pub fn invert(self, scaled: f64) -> f64 {
        match self {
            Scale::Identity => scaled,
            Scale::Divide(n) => scaled * n,
            Scale::Multiply(n) => scaled / n,
            Scale::Int16 => uint16(scaled.round() as i64) as f64,
            Scale::Int16Divide(n) => uint16((scaled * n).round() as i64) as f64,
        }
    }

    pub fn is_identity(self) -> bool {
        self == Scale::Identity
    }
}

// =====================
// Tables
// =====================

#[derive(Clone)]
pub struct ResolverTables {
    /// Codes whose vendor unit string is wrong or missing, mapped to a semantic unit.
    pub unit_overrides: HashMap<&'static str, &'static str>,
    /// Vendor unit string to semantic unit.
    pub raw_units: HashMap<&'static str, &'static str>,
    pub scales: HashMap<&'static str, Scale>,
    pub boolean_classes: HashMap<&'static str, DeviceClass>,
    /// Boolean classes whose raw value reads inverted.
    pub inverted_classes: HashSet<DeviceClass>,
    /// Codes typed as integers by the vendor that carry a boolean.
    pub forced_boolean: HashSet<&'static str>,
    /// Nominal parameters that must never be written.
    pub forced_read_only: HashSet<&'static str>,
    pub read_only_thing_model: i64,
    pub label_substitutions: Vec<(&'static str, &'static str)>,
    pub unknown_label: &'static str,
}

static BUILTIN: LazyLock<ResolverTables> = LazyLock::new(ResolverTables::build_builtin);

impl ResolverTables {
    pub fn builtin() -> &'static ResolverTables {
        &BUILTIN
    }

    fn build_builtin() -> ResolverTables {
        use units::*;

        let unit_overrides = HashMap::from([
            ("CT_UPTIME", HOURS),
            ("R16493", MINUTES),
            ("R16494", CELSIUS),
            ("R16495", CELSIUS),
            ("R16496", CELSIUS),
            ("R16497", CELSIUS),
            ("R16515", CELSIUS),
            ("R8680", CELSIUS),
            ("R8002", KILO_WATT),
            ("R8005", KILO_WATT),
            ("R8008", KILO_WATT),
            ("R8011", KILO_WATT),
            ("R8100", VOLT),
            ("R8105", WATT),
            ("R8110", WATT),
            ("R8111", AMPERE),
            ("R8112", AMPERE),
            ("R8113", HERTZ),
            ("R8114", HERTZ),
            ("R8203", CELSIUS),
            ("R8204", CELSIUS),
            ("R8208", MILLISECONDS),
            ("R8209", MILLISECONDS),
            ("R8211", MILLISECONDS),
            ("R8212", MILLISECONDS),
            ("R8214", MILLISECONDS),
            ("R8215", MILLISECONDS),
            ("R8217", MILLISECONDS),
            ("R8218", MILLISECONDS),
            ("R8400", VOLT),
            ("R8401", AMPERE),
            ("R8402", AMPERE),
            ("R8403", WATT),
            ("R8404", WATT),
            ("R8405", HERTZ),
            ("R8406", HERTZ),
            ("R8407", HERTZ),
            ("R8660", PERCENTAGE),
            ("R8661", PERCENTAGE),
            ("R8665", KILO_WATT),
            ("R8666", KILO_WATT),
            ("R8756", KILO_WATT),
            ("R8757", KILO_WATT),
            ("R8758", KILO_WATT),
            ("R8759", KILO_WATT),
            ("R8760", KILO_WATT),
            ("R8761", KILO_WATT),
            ("R8762", KILO_WATT),
            ("R8763", KILO_WATT),
            ("R8764", KILO_WATT),
            ("R8765", WATT_HOUR),
            ("R8766", WATT_HOUR),
            ("R8767", WATT_HOUR),
            ("R8768", WATT_HOUR),
            ("R8769", WATT_HOUR),
            ("R8770", WATT_HOUR),
            ("R8771", WATT_HOUR),
            ("R8772", WATT_HOUR),
            ("R8773", WATT_HOUR),
            ("R9042", CELSIUS),
            ("R9051", CELSIUS),
            ("R9052", CELSIUS),
            ("R9120", LITERS_PER_MINUTE),
            ("R9121", WATT),
            ("R9122", WATT),
            ("R9123", WATT),
            ("R9126", WATT),
            ("R9127", WATT),
            ("R9128", WATT),
            ("R9129", WATT),
        ]);

        let raw_units = HashMap::from([
            ("kW", KILO_WATT),
            ("W", WATT),
            ("V", VOLT),
            ("A", AMPERE),
            ("Hz", HERTZ),
            ("°C", CELSIUS),
            ("°", CELSIUS),
            ("h", HOURS),
            ("min", MINUTES),
            ("s", SECONDS),
            ("HH:mm", MINUTES),
            ("watt/h", WATT_HOUR),
            ("Wh", WATT_HOUR),
            ("kWh", KILO_WATT_HOUR),
            ("L/h", LITERS_PER_HOUR),
            ("L/min", LITERS_PER_MINUTE),
            ("e/kw", EURO),
            ("%", PERCENTAGE),
        ]);

        let mut scales = HashMap::from([
            ("R9120", Scale::Multiply(60.0)),
            ("R8684", Scale::Divide(100.0)),
            ("R8686", Scale::Divide(100.0)),
            ("R8688", Scale::Divide(100.0)),
            ("R8690", Scale::Divide(100.0)),
            ("R16534", Scale::Divide(100.0)),
            ("R8002", Scale::Int16Divide(1000.0)),
            ("R8005", Scale::Int16Divide(1000.0)),
            ("R8008", Scale::Int16Divide(1000.0)),
            ("R8011", Scale::Int16Divide(1000.0)),
            ("R8105", Scale::Int16),
            ("R8110", Scale::Int16),
        ]);
        for code in [
            "R8100", "R8665", "R8666", "R8678", "R8680", "R8698", "R8702", "R8703", "R8986", "R8987", "R8988",
            "R8989", "R9042", "R9051", "R9052", "R16444", "R16446", "R16448", "R16450", "R16451", "R16453",
            "R16455", "R16457", "R16494", "R16495", "R16496", "R16497", "R16515",
        ] {
            scales.insert(code, Scale::Divide(10.0));
        }
        for code in [
            "R8208", "R8209", "R8211", "R8212", "R8214", "R8215", "R8217", "R8218", "R8111", "R8112", "R8220",
            "R8221", "R8222", "R8223",
        ] {
            scales.insert(code, Scale::Divide(1000.0));
        }
        for code in ["R9121", "R9122", "R9123", "R9126", "R9127", "R9128", "R9129"] {
            scales.insert(code, Scale::Multiply(10.0));
        }

        let mut boolean_classes = HashMap::new();
        for code in ["R8648", "R8683", "R8684", "R16385"] {
            boolean_classes.insert(code, DeviceClass::Cold);
        }
        for code in [
            "R9089", "R9090", "R9095", "R9096", "R9097", "R9098", "R9099", "R9102", "R9103", "R9104",
        ] {
            boolean_classes.insert(code, DeviceClass::Problem);
        }
        for code in [
            "R16384", "R8681", "R8682", "R8692", "R8967", "R9071", "R9072", "R9073", "R9074", "R9076", "R9078",
            "R9079",
        ] {
            boolean_classes.insert(code, DeviceClass::Running);
        }
        boolean_classes.insert("R8672", DeviceClass::Window);
        boolean_classes.insert("R8673", DeviceClass::Presence);
        boolean_classes.insert("R8676", DeviceClass::Presence);

        ResolverTables {
            unit_overrides,
            raw_units,
            scales,
            boolean_classes,
            inverted_classes: HashSet::from([DeviceClass::Cold, DeviceClass::Presence]),
            forced_boolean: HashSet::from(["R8648", "R8967", "R9071", "R9072", "R9076", "R9078", "R9079"]),
            forced_read_only: HashSet::from(["R8681", "R8682", "R16515"]),
            read_only_thing_model: 8,
            label_substitutions: vec![
                (" (in KW)", ""),
                ("(la tensione è unica per i due canali)", ""),
                ("Pdc", "PdC"),
                ("PcD", "PdC"),
                ("PDC", "PdC"),
                ("Acs", "ACS"),
                ("Risc_", "Riscaldamento "),
                ("Raff_", "Raffreddamento "),
                ("Home", "Casa"),
                ("(SetRh_E)", ""),
                ("(SetRh_I)", ""),
                ("On/ Off", "On/Off"),
                ("CASA", "Casa"),
                ("PRESA", "Presa"),
                ("Presa1", "Presa"),
                ("not used", "Non utilizzato"),
                ("_", " "),
            ],
            unknown_label: "Sconosciuto",
        }
    }

    /// Per-code override first, then the vendor string through the raw unit table.
    /// Empty only when the vendor gives no unit; an unknown one is returned as is
    /// so that classification rejects it.
    pub fn resolve_unit(&self, code: &str, raw_unit: Option<&str>) -> String {
        if let Some(unit) = self.unit_overrides.get(code) {
            return unit.to_string();
        }
        let raw = raw_unit.map(str::trim).unwrap_or_default();
        match self.raw_units.get(raw) {
            Some(unit) => unit.to_string(),
            None => raw.to_string(),
        }
    }

    /// Device class of a numeric resource, derived from its resolved unit.
    pub fn numeric_class(&self, code: &str, unit: &str) -> Result<Option<DeviceClass>, ClassificationError> {
        if unit.is_empty() {
            return Ok(None);
        }
        if unit == units::PERCENTAGE {
            return Ok(Some(DeviceClass::Humidity));
        }
        if unit == units::EURO {
            return Ok(Some(DeviceClass::Monetary));
        }
        let families: [(&[&str], DeviceClass); 8] = [
            (units::POWER, DeviceClass::Power),
            (units::TEMPERATURE, DeviceClass::Temperature),
            (units::DURATION, DeviceClass::Duration),
            (units::ENERGY, DeviceClass::Energy),
            (units::FREQUENCY, DeviceClass::Frequency),
            (units::VOLTAGE, DeviceClass::Voltage),
            (units::CURRENT, DeviceClass::Current),
            (units::VOLUME_FLOW_RATE, DeviceClass::VolumeFlowRate),
        ];
        families
            .iter()
            .find(|(family, _)| family.contains(&unit))
            .map(|(_, class)| Some(*class))
            .ok_or_else(|| ClassificationError::UnmappedUnit {
                code: code.to_string(),
                unit: unit.to_string(),
            })
    }

    pub fn boolean_class(&self, code: &str) -> Result<DeviceClass, ClassificationError> {
        self.boolean_classes
            .get(code)
            .copied()
            .ok_or_else(|| ClassificationError::MissingBooleanClass(code.to_string()))
    }

    pub fn state_class(class: Option<DeviceClass>) -> StateClass {
        match class {
            Some(DeviceClass::Monetary | DeviceClass::Energy) => StateClass::Total,
            _ => StateClass::Measurement,
        }
    }

    pub fn scale(&self, code: &str) -> Scale {
        self.scales.get(code).copied().unwrap_or(Scale::Identity)
    }

    /// Boolean polarity for a device class. Self-inverse: the same transform
    /// converts raw to displayed and displayed to raw.
    pub fn polarity(&self, class: Option<DeviceClass>, value: bool) -> bool {
        match class {
            Some(c) if self.inverted_classes.contains(&c) => !value,
            _ => value,
        }
    }

    pub fn forces_boolean(&self, code: &str) -> bool {
        self.forced_boolean.contains(code)
    }

    pub fn forces_read_only(&self, thing_model_id: Option<i64>, code: &str) -> bool {
        thing_model_id == Some(self.read_only_thing_model) || self.forced_read_only.contains(code)
    }

    /// Display label: substitutions in order, placeholder when empty, code prefix.
    pub fn label(&self, code: &str, name: Option<&str>) -> String {
        let mut label = name.unwrap_or_default().to_string();
        for (from, to) in &self.label_substitutions {
            label = label.replace(from, to);
        }
        let label = label.trim();
        let label = if label.is_empty() { self.unknown_label } else { label };
        format!("{}: {}", code, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn every_scale_round_trips() {
        let tables = ResolverTables::builtin();
        for (code, scale) in &tables.scales {
            let raws: &[f64] = match scale {
                Scale::Int16 | Scale::Int16Divide(_) => &[0.0, 1.0, 32767.0, 32768.0, 65535.0],
                _ => &[0.0, 1.0, 235.0, -40.0, 65535.0],
            };
            for raw in raws {
                let back = scale.invert(scale.apply(*raw));
                assert!((back - raw).abs() < EPS, "{}: {} -> {}", code, raw, back);
            }
        }
    }

    #[test]
    fn twos_complement_boundaries() {
        let scale = ResolverTables::builtin().scale("R8002");
        assert!((scale.apply(65535.0) - (-0.001)).abs() < EPS);
        assert!((scale.apply(32767.0) - 32.767).abs() < EPS);
        assert!((scale.apply(32768.0) - (-32.768)).abs() < EPS);
        assert_eq!(scale.invert(-0.001), 65535.0);
        assert_eq!(scale.invert(-1.0), 64536.0);
        assert_eq!(Scale::Int16.invert(-1.0), 65535.0);
        assert_eq!(Scale::Int16.apply(65535.0), -1.0);
    }

    #[test]
    fn unlisted_codes_use_identity() {
        let tables = ResolverTables::builtin();
        assert!(tables.scale("R0000").is_identity());
        assert_eq!(tables.scale("R0000").apply(42.0), 42.0);
    }

    #[test]
    fn polarity_is_self_inverse() {
        let tables = ResolverTables::builtin();
        let classes: Vec<Option<DeviceClass>> = tables
            .boolean_classes
            .values()
            .copied()
            .map(Some)
            .chain([None, Some(DeviceClass::Switch)])
            .collect();
        for class in classes {
            for v in [true, false] {
                assert_eq!(tables.polarity(class, tables.polarity(class, v)), v, "{:?}", class);
            }
        }
        assert!(!tables.polarity(Some(DeviceClass::Cold), true));
        assert!(!tables.polarity(Some(DeviceClass::Presence), true));
        assert!(tables.polarity(Some(DeviceClass::Window), true));
    }

    #[test]
    fn override_wins_over_vendor_unit() {
        let tables = ResolverTables::builtin();
        assert_eq!(tables.resolve_unit("R8002", Some("W")), units::KILO_WATT);
        assert_eq!(tables.resolve_unit("R1", Some("watt/h")), units::WATT_HOUR);
        assert_eq!(tables.resolve_unit("R1", Some("HH:mm")), units::MINUTES);
        assert_eq!(tables.resolve_unit("R1", None), "");
        assert_eq!(tables.resolve_unit("R1", Some("  ")), "");
    }

    #[test]
    fn unknown_vendor_unit_is_kept_and_rejected() {
        let tables = ResolverTables::builtin();
        let unit = tables.resolve_unit("R1", Some(" bar "));
        assert_eq!(unit, "bar");
        assert_eq!(
            tables.numeric_class("R1", &unit),
            Err(ClassificationError::UnmappedUnit {
                code: "R1".into(),
                unit: "bar".into()
            })
        );
    }

    #[test]
    fn classifies_units_by_family() {
        let tables = ResolverTables::builtin();
        assert_eq!(tables.numeric_class("R1", "%"), Ok(Some(DeviceClass::Humidity)));
        assert_eq!(tables.numeric_class("R1", "€"), Ok(Some(DeviceClass::Monetary)));
        assert_eq!(tables.numeric_class("R1", "kW"), Ok(Some(DeviceClass::Power)));
        assert_eq!(tables.numeric_class("R1", "ms"), Ok(Some(DeviceClass::Duration)));
        assert_eq!(tables.numeric_class("R1", "L/min"), Ok(Some(DeviceClass::VolumeFlowRate)));
        assert_eq!(tables.numeric_class("R1", ""), Ok(None));
        assert_eq!(
            tables.numeric_class("R1", "furlong"),
            Err(ClassificationError::UnmappedUnit {
                code: "R1".into(),
                unit: "furlong".into()
            })
        );
    }

    #[test]
    fn every_resolvable_unit_has_a_class() {
        let tables = ResolverTables::builtin();
        for unit in tables.unit_overrides.values().chain(tables.raw_units.values()) {
            assert!(tables.numeric_class("R1", unit).is_ok(), "{}", unit);
        }
    }

    #[test]
    fn state_class_marks_totals() {
        assert_eq!(ResolverTables::state_class(Some(DeviceClass::Energy)), StateClass::Total);
        assert_eq!(ResolverTables::state_class(Some(DeviceClass::Monetary)), StateClass::Total);
        assert_eq!(ResolverTables::state_class(Some(DeviceClass::Power)), StateClass::Measurement);
        assert_eq!(ResolverTables::state_class(None), StateClass::Measurement);
    }

    #[test]
    fn boolean_class_requires_table_entry() {
        let tables = ResolverTables::builtin();
        assert_eq!(tables.boolean_class("R8672"), Ok(DeviceClass::Window));
        assert_eq!(
            tables.boolean_class("R1"),
            Err(ClassificationError::MissingBooleanClass("R1".into()))
        );
    }

    #[test]
    fn labels_are_cleaned_and_prefixed() {
        let tables = ResolverTables::builtin();
        assert_eq!(tables.label("R8763", Some("Potenza_Risc_Pdc")), "R8763: Potenza Riscaldamento PdC");
        assert_eq!(tables.label("R8002", Some("Potenza media DIE1 (in KW)")), "R8002: Potenza media DIE1");
        assert_eq!(tables.label("R8205", Some("not used")), "R8205: Non utilizzato");
        assert_eq!(tables.label("R8660", Some("(SetRh_E)")), "R8660: Sconosciuto");
        assert_eq!(tables.label("R1", None), "R1: Sconosciuto");
    }

    #[test]
    fn read_only_by_model_or_code() {
        let tables = ResolverTables::builtin();
        assert!(tables.forces_read_only(Some(8), "R9052"));
        assert!(tables.forces_read_only(Some(3), "R16515"));
        assert!(!tables.forces_read_only(Some(3), "R9052"));
        assert!(!tables.forces_read_only(None, "R9052"));
    }
}
