//! A logged-in view of one webapp account: owns the input table and serializes
//! discovery, refresh and writes against it.

use crate::client::{FebosApi, FebosClientError};
use crate::config::Credentials;
use crate::models::entity::{EntityDescriptor, EntityKind, Snapshot, StateValue};
use crate::models::febos::InstallationId;
use crate::normalization::resolver::ResolverTables;
use crate::services::discovery::{self, Applied, DiscoveryError, InputTable};
use crate::services::update::{self, RefreshError};
use crate::services::write::{self, WriteRefusal};
use chrono::Utc;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Called with the key and the new normalized value of an input whose value changed.
pub type Listener = Arc<dyn Fn(&str, Option<&StateValue>) + Send + Sync>;

type Pending = Vec<(Listener, String, Option<StateValue>)>;

#[derive(Default)]
struct State {
    installations: Vec<InstallationId>,
    table: InputTable,
    snapshot: Snapshot,
    listeners: BTreeMap<String, Listener>,
}

impl State {
    fn pending(&self, applied: &Applied) -> Pending {
        applied
            .changed
            .iter()
            .filter_map(|key| {
                let listener = self.listeners.get(key)?;
                let value = applied.values.get(key).cloned().flatten();
                Some((Arc::clone(listener), key.clone(), value))
            })
            .collect()
    }
}

// runs with the state lock released
fn notify(pending: Pending) {
    for (listener, key, value) in pending {
        listener(&key, value.as_ref());
    }
}

pub struct Session<A: FebosApi> {
    api: A,
    credentials: Credentials,
    tables: ResolverTables,
    // held for the whole of every discover/refresh/write
    state: Mutex<State>,
}

impl<A: FebosApi> Session<A> {
    pub fn new(api: A, credentials: Credentials) -> Self {
        Self::with_tables(api, credentials, ResolverTables::builtin().clone())
    }

    pub fn with_tables(api: A, credentials: Credentials, tables: ResolverTables) -> Self {
        Session {
            api,
            credentials,
            tables,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn login(&self) -> Result<Vec<InstallationId>, FebosClientError> {
        let installations = self.api.login(&self.credentials.username, &self.credentials.password)?;
        info!(
            "Logged in as '{}', {} installation(s)",
            self.credentials.username,
            installations.len()
        );
        self.state().installations = installations.clone();
        Ok(installations)
    }

    /// Rebuild the input table from scratch. On failure the previous table stays.
    pub fn discover(&self) -> Result<usize, DiscoveryError> {
        let mut state = self.state();
        let table = discovery::discover(&self.api, &state.installations, &self.tables)?;
        let count = table.len();
        state.snapshot = Snapshot {
            values: table.projection(),
            refreshed_at: None,
            stale: false,
        };
        state.table = table;
        Ok(count)
    }

    /// Login followed by discovery.
    pub fn connect(&self) -> Result<usize, String> {
        self.login().map_err(|e| format!("login failed: {}", e))?;
        self.discover().map_err(|e| format!("discovery failed: {}", e))
    }

    /// Installations whose configuration failed to discover in the last pass.
    pub fn failed_installations(&self) -> Vec<InstallationId> {
        self.state().table.failed.iter().map(|(id, _)| *id).collect()
    }

    /// On failure the snapshot keeps its values and is marked stale.
    pub fn refresh(&self) -> Result<Snapshot, RefreshError> {
        let mut state = self.state();
        match update::refresh(&self.api, &self.credentials, &mut state.table) {
            Ok(applied) => {
                let pending = state.pending(&applied);
                state.snapshot = Snapshot {
                    values: applied.values,
                    refreshed_at: Some(Utc::now()),
                    stale: false,
                };
                let snapshot = state.snapshot.clone();
                drop(state);
                notify(pending);
                Ok(snapshot)
            }
            Err(e) => {
                state.snapshot.stale = true;
                Err(e)
            }
        }
    }

    pub fn write(&self, key: &str, value: &StateValue) -> Result<Snapshot, WriteRefusal> {
        let mut state = self.state();
        let applied = write::write(&self.api, &mut state.table, key, value)?;
        let pending = state.pending(&applied);
        state.snapshot.values = applied.values;
        let snapshot = state.snapshot.clone();
        drop(state);
        notify(pending);
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().snapshot.clone()
    }

    pub fn descriptor(&self, key: &str) -> Option<EntityDescriptor> {
        self.state().table.by_key(key).map(|i| i.descriptor())
    }

    pub fn entities(&self, kind: EntityKind) -> Vec<EntityDescriptor> {
        self.state().table.descriptors(Some(kind))
    }

    /// Register a change callback for `key`, replacing any earlier one. It
    /// survives rediscovery; returns whether the key is currently known.
    pub fn subscribe(&self, key: &str, listener: Listener) -> bool {
        let mut state = self.state();
        state.listeners.insert(key.to_string(), listener);
        state.table.by_key(key).is_some()
    }
}
