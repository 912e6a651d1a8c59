use crate::models::febos::{DeviceId, InstallationId, ThingId};
use serde::Serialize;

pub const DOMAIN: &str = "febos";

/// Stable key of a device/thing pair, or of one of its inputs when `code` is given.
///
/// Ids are numeric, so the first four `_`-separated parts are unambiguous even
/// when the code itself contains underscores (e.g. `CT_UPTIME`).
pub fn unique_key(installation_id: InstallationId, device_id: DeviceId, thing_id: ThingId, code: Option<&str>) -> String {
    let mut key = format!("{}_{}_{}_{}", DOMAIN, installation_id.0, device_id.0, thing_id.0);
    if let Some(code) = code {
        key.push('_');
        key.push_str(code);
    }
    key
}

/// Serialize a value as compact JSON for output lines.
pub fn to_json_line<T: Serialize>(val: &T) -> String {
    serde_json::to_string(val).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}
