//! Models of the Febos webapp payloads consumed by the bridge.
//!
//! Scope: types only, no API client code.
//!
//! Notes
//! - The webapp is loosely typed: most collections may be missing, so they default to empty.
//! - Maps in the page configuration are keyed by the stringified numeric id.
//! - `pageMap` keeps document order: the first page to list an input owns it.
//! - Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(pub i64);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(pub i64);

// =====================
// Enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputType {
    Int,
    Float,
    Bool,
    String,
}

// =====================
// Login
// =====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub installation_id_list: Vec<InstallationId>,
}

// =====================
// Page configuration
// =====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    #[serde(default)]
    pub device_map: BTreeMap<String, Device>,
    #[serde(default)]
    pub thing_map: BTreeMap<String, Thing>,
    #[serde(default, with = "ordered_pages")]
    pub page_map: Vec<(String, Page)>,
}

impl PageConfig {
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.device_map.get(&id.0.to_string())
    }

    pub fn thing(&self, id: ThingId) -> Option<&Thing> {
        self.thing_map.get(&id.0.to_string())
    }
}

mod ordered_pages {
    use super::Page;
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(pages: &[(String, Page)], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(pages.iter().map(|(id, page)| (id, page)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, Page)>, D::Error> {
        struct Pages;

        impl<'de> Visitor<'de> for Pages {
            type Value = Vec<(String, Page)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of pages keyed by id")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let mut pages = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    pages.push(entry);
                }
                Ok(pages)
            }
        }

        deserializer.deserialize_map(Pages)
    }
}

/// A physical controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

/// A logical service hosted by a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    pub id: ThingId,
    pub device_id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model_id: Option<i64>,
    #[serde(default)]
    pub model_code: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub input_group_get_code_list: Vec<String>,
    #[serde(default)]
    pub tab_list: Vec<Tab>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default)]
    pub input_group_get_code_map: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub widget_list: Vec<Widget>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(default)]
    pub input_group_get_code_list: Vec<String>,
    #[serde(default)]
    pub widget_input_group_list: Vec<WidgetInputGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetInputGroup {
    pub input_group_get_code: String,
    #[serde(default)]
    pub input_list: Vec<Input>,
}

/// A single vendor data point or setting definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub device_id: DeviceId,
    pub thing_id: ThingId,
    pub input_type: InputType,
    pub category: String,
    #[serde(default)]
    pub meas_unit: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub default_int_value: Option<i64>,
}

// =====================
// Realtime values
// =====================

/// Value envelope; the webapp carries the raw value in `i` regardless of type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeValue {
    #[serde(default)]
    pub i: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeData {
    pub device_id: DeviceId,
    pub thing_id: ThingId,
    #[serde(default)]
    pub data: BTreeMap<String, RealtimeValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    #[serde(default)]
    pub err_code: i64,
    #[serde(default)]
    pub msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_config_fixture() {
        let json = std::fs::read_to_string("tests/data/page-config.json").expect("fixture present");
        let cfg: PageConfig = serde_json::from_str(&json).expect("parse page config");
        assert_eq!(cfg.device_map.len(), 1);
        assert!(cfg.device(DeviceId(1001)).is_some());
        let thing = cfg.thing(ThingId(2001)).expect("thing present");
        assert_eq!(thing.device_id, DeviceId(1001));
        assert_eq!(thing.model_id, Some(3));
    }

    #[test]
    fn page_map_keeps_document_order() {
        let json = r#"{"pageMap": {"10": {"inputGroupGetCodeList": ["G_B"]}, "2": {"inputGroupGetCodeList": ["G_A"]}}}"#;
        let cfg: PageConfig = serde_json::from_str(json).expect("parse page config");
        let ids: Vec<&str> = cfg.page_map.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["10", "2"]);

        let back = serde_json::to_string(&cfg).expect("serialize");
        assert!(back.find("\"10\"").unwrap() < back.find("\"2\"").unwrap());
    }

    #[test]
    fn realtime_payload_tolerates_missing_fields() {
        let json = r#"[{"deviceId": 1, "thingId": 2, "data": {"R8100": {"i": 2301}, "R1": {}}}]"#;
        let rows: Vec<RealtimeData> = serde_json::from_str(json).expect("parse realtime");
        assert_eq!(rows[0].data["R8100"].i, Some(Value::from(2301)));
        assert_eq!(rows[0].data["R1"].i, None);
    }

    #[test]
    fn write_response_defaults_to_success_code() {
        let ok: WriteResponse = serde_json::from_str("{}").expect("parse");
        assert_eq!(ok.err_code, 0);
        let ko: WriteResponse = serde_json::from_str(r#"{"errCode": 5, "msg": "denied"}"#).expect("parse");
        assert_eq!(ko.err_code, 5);
        assert_eq!(ko.msg.as_deref(), Some("denied"));
    }
}
