//! Scripted in-memory `FebosApi` used by unit tests.

use crate::client::{FebosApi, FebosClientError};
use crate::models::febos::*;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender};

pub const FIXTURE_INSTALLATION: InstallationId = InstallationId(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Login,
    PageConfig(InstallationId),
    Realtime(InstallationId, Vec<String>),
    Write {
        installation_id: InstallationId,
        device_id: DeviceId,
        thing_id: ThingId,
        code: String,
        raw_value: Value,
    },
}

/// Holds the next write inside the call: `entered` is signalled once the
/// request is recorded, then the call blocks until `release` receives.
pub struct WriteGate {
    pub entered: Sender<()>,
    pub release: Receiver<()>,
}

#[derive(Default)]
pub struct FakeApi {
    pub installations: Vec<InstallationId>,
    pub page_configs: BTreeMap<InstallationId, PageConfig>,
    /// Consumed first, one per realtime call.
    pub scripted_realtime: Mutex<VecDeque<Result<Vec<RealtimeData>, FebosClientError>>>,
    pub realtime: Mutex<BTreeMap<InstallationId, Vec<RealtimeData>>>,
    pub write_responses: Mutex<VecDeque<Result<WriteResponse, FebosClientError>>>,
    pub calls: Mutex<Vec<Call>>,
    pub write_gate: Mutex<Option<WriteGate>>,
}

pub fn fixture_page_config() -> PageConfig {
    let json = std::fs::read_to_string("tests/data/page-config.json").expect("fixture present");
    serde_json::from_str(&json).expect("parse page config")
}

pub fn realtime_row(device: i64, thing: i64, values: &[(&str, Value)]) -> RealtimeData {
    RealtimeData {
        device_id: DeviceId(device),
        thing_id: ThingId(thing),
        data: values
            .iter()
            .map(|(code, v)| (code.to_string(), RealtimeValue { i: Some(v.clone()) }))
            .collect(),
    }
}

impl FakeApi {
    pub fn with_fixture() -> Self {
        FakeApi {
            installations: vec![FIXTURE_INSTALLATION],
            page_configs: BTreeMap::from([(FIXTURE_INSTALLATION, fixture_page_config())]),
            ..FakeApi::default()
        }
    }

    pub fn set_realtime(&self, installation_id: InstallationId, rows: Vec<RealtimeData>) {
        self.realtime.lock().unwrap().insert(installation_id, rows);
    }

    pub fn script_realtime(&self, result: Result<Vec<RealtimeData>, FebosClientError>) {
        self.scripted_realtime.lock().unwrap().push_back(result);
    }

    pub fn script_write(&self, result: Result<WriteResponse, FebosClientError>) {
        self.write_responses.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FebosApi for FakeApi {
    fn login(&self, _username: &str, password: &str) -> Result<Vec<InstallationId>, FebosClientError> {
        self.record(Call::Login);
        if password == "wrong" {
            return Err(FebosClientError::Unauthorized("bad credentials".into()));
        }
        Ok(self.installations.clone())
    }

    fn get_page_config(&self, installation_id: InstallationId) -> Result<PageConfig, FebosClientError> {
        self.record(Call::PageConfig(installation_id));
        self.page_configs
            .get(&installation_id)
            .cloned()
            .ok_or_else(|| FebosClientError::Http {
                status: 404,
                message: "no such installation".into(),
            })
    }

    fn get_realtime_values(
        &self,
        installation_id: InstallationId,
        group_codes: &[String],
    ) -> Result<Vec<RealtimeData>, FebosClientError> {
        self.record(Call::Realtime(installation_id, group_codes.to_vec()));
        if let Some(scripted) = self.scripted_realtime.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(self.realtime.lock().unwrap().get(&installation_id).cloned().unwrap_or_default())
    }

    fn write_realtime_value(
        &self,
        installation_id: InstallationId,
        device_id: DeviceId,
        thing_id: ThingId,
        code: &str,
        raw_value: &Value,
    ) -> Result<WriteResponse, FebosClientError> {
        self.record(Call::Write {
            installation_id,
            device_id,
            thing_id,
            code: code.to_string(),
            raw_value: raw_value.clone(),
        });
        let gate = self.write_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        self.write_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(WriteResponse::default()))
    }
}
