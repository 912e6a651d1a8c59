//! Update engine: one batched realtime request per installation, applied to the
//! input table only after every installation answered.

use crate::client::{FebosApi, FebosClientError};
use crate::config::Credentials;
use crate::models::febos::{InstallationId, RealtimeData};
use crate::normalization::input::InputIdentity;
use crate::services::discovery::{Applied, InputTable};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug)]
pub enum RefreshError {
    /// The fetch failed (after the single re-login retry, if the session had expired).
    Api(FebosClientError),
    /// The session expired and logging in again failed.
    Relogin(FebosClientError),
}

impl Display for RefreshError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::Api(e) => write!(f, "refresh failed: {}", e),
            RefreshError::Relogin(e) => write!(f, "re-login after session expiry failed: {}", e),
        }
    }
}

impl Error for RefreshError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RefreshError::Api(e) | RefreshError::Relogin(e) => Some(e),
        }
    }
}

impl From<FebosClientError> for RefreshError {
    fn from(value: FebosClientError) -> Self {
        RefreshError::Api(value)
    }
}

type Batches = Vec<(InstallationId, Vec<RealtimeData>)>;

/// Refresh every known input and return the full projection with the changed keys.
///
/// An expired session triggers exactly one re-login followed by one retry of
/// the whole fetch. Nothing is applied unless every installation answered.
pub fn refresh<A: FebosApi + ?Sized>(
    api: &A,
    credentials: &Credentials,
    table: &mut InputTable,
) -> Result<Applied, RefreshError> {
    let batches = match fetch_all(api, table) {
        Ok(batches) => batches,
        Err(e) if e.is_unauthorized() => {
            warn!("Session expired ({}), logging in again", e);
            api.login(&credentials.username, &credentials.password)
                .map_err(RefreshError::Relogin)?;
            fetch_all(api, table)?
        }
        Err(e) => return Err(e.into()),
    };

    let changed = apply(table, &batches);
    debug!("Refresh applied, {} value(s) changed", changed.len());
    Ok(table.applied(changed))
}

fn fetch_all<A: FebosApi + ?Sized>(api: &A, table: &InputTable) -> Result<Batches, FebosClientError> {
    let mut batches = Vec::with_capacity(table.groups.len());
    for (installation_id, groups) in &table.groups {
        if groups.is_empty() {
            debug!("Installation {} has no input groups, skipping", installation_id.0);
            continue;
        }
        let codes: Vec<String> = groups.iter().cloned().collect();
        let rows = api.get_realtime_values(*installation_id, &codes)?;
        batches.push((*installation_id, rows));
    }
    Ok(batches)
}

/// Store every returned value; unknown resources are reported and skipped.
/// Returns the keys of the inputs whose value changed.
fn apply(table: &mut InputTable, batches: &Batches) -> Vec<String> {
    let mut changed = Vec::new();
    for (installation_id, rows) in batches {
        for row in rows {
            for (code, value) in &row.data {
                let identity = InputIdentity {
                    installation_id: *installation_id,
                    device_id: row.device_id,
                    thing_id: row.thing_id,
                    code: code.clone(),
                };
                let Some(input) = table.get_mut(&identity) else {
                    warn!(
                        "Received value '{}' for unknown input: installation_id={}, device_id={}, thing_id={}, code={}",
                        value.i.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "None".to_string()),
                        installation_id.0,
                        row.device_id.0,
                        row.thing_id.0,
                        code
                    );
                    continue;
                };
                match input.set_raw_value(value.i.as_ref()) {
                    Ok(true) => changed.push(input.key.clone()),
                    Ok(false) => {}
                    Err(e) => warn!("{}: {}", input.key, e),
                }
            }
        }
    }
    changed
}
