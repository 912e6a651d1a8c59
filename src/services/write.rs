//! Write path: convert a host value back to the vendor's raw scale, submit it
//! and commit locally only once the vendor confirmed it.

use crate::client::{FebosApi, FebosClientError};
use crate::models::entity::{EntityKind, StateValue};
use crate::normalization::input::ConversionError;
use crate::services::discovery::{Applied, InputTable};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Why a write was not applied. Local state is untouched in every case.
#[derive(Debug)]
pub enum WriteRefusal {
    UnknownKey(String),
    NotWritable { key: String, kind: EntityKind },
    InvalidValue { key: String, source: ConversionError },
    Transport { key: String, source: FebosClientError },
    /// The webapp answered with a non-zero application error code.
    Vendor { key: String, code: i64, message: Option<String> },
}

impl Display for WriteRefusal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WriteRefusal::UnknownKey(key) => write!(f, "cannot set value for unknown key '{}'", key),
            WriteRefusal::NotWritable { key, kind } => write!(f, "{} is a read-only {}", key, kind),
            WriteRefusal::InvalidValue { key, source } => write!(f, "invalid value for {}: {}", key, source),
            WriteRefusal::Transport { key, source } => {
                write!(f, "value update for {} failed due to remote error: {}", key, source)
            }
            WriteRefusal::Vendor { key, code, message } => write!(
                f,
                "value update for {} failed due to remote error: {} (error code: {})",
                key,
                message.as_deref().unwrap_or("-"),
                code
            ),
        }
    }
}

impl Error for WriteRefusal {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WriteRefusal::InvalidValue { source, .. } => Some(source),
            WriteRefusal::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Write one value and return the full updated projection.
pub fn write<A: FebosApi + ?Sized>(
    api: &A,
    table: &mut InputTable,
    key: &str,
    value: &StateValue,
) -> Result<Applied, WriteRefusal> {
    debug!("Setting value {} for {}", value, key);

    let input = table
        .by_key_mut(key)
        .ok_or_else(|| WriteRefusal::UnknownKey(key.to_string()))
        .inspect_err(|e| warn!("{}", e))?;
    if !input.kind().is_writable() {
        return Err(WriteRefusal::NotWritable {
            key: key.to_string(),
            kind: input.kind(),
        });
    }
    let raw = input.raw_from_state(value).map_err(|source| WriteRefusal::InvalidValue {
        key: key.to_string(),
        source,
    })?;

    let identity = &input.identity;
    let response = api
        .write_realtime_value(
            identity.installation_id,
            identity.device_id,
            identity.thing_id,
            &identity.code,
            &raw.to_json(),
        )
        .map_err(|source| WriteRefusal::Transport {
            key: key.to_string(),
            source,
        })
        .inspect_err(|e| warn!("{}", e))?;
    if response.err_code != 0 {
        let refusal = WriteRefusal::Vendor {
            key: key.to_string(),
            code: response.err_code,
            message: response.msg,
        };
        warn!("{}", refusal);
        return Err(refusal);
    }

    info!("{} set to {} (raw {})", key, value, raw);
    let changed = if input.store(Some(raw)) {
        vec![key.to_string()]
    } else {
        Vec::new()
    };
    Ok(table.applied(changed))
}
