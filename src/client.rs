//! Blocking HTTP client for the Febos webapp.
//!
//! - Blocking client using `ureq` (no async).
//! - Session is kept by the agent's cookie jar after `login`.
//! - Covers exactly what the bridge consumes: login, page configuration,
//!   realtime values and realtime value writes.
//! - No retry/backoff: callers decide what to do with a failed call.

use http::StatusCode;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::febos::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum FebosClientError {
    /// Bad credentials or an expired session.
    Unauthorized(String),
    Transport(String),
    Http { status: u16, message: String },
    Json(String),
}

impl FebosClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FebosClientError::Unauthorized(_))
    }
}

impl core::fmt::Display for FebosClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FebosClientError::Unauthorized(s) => write!(f, "unauthorized: {}", s),
            FebosClientError::Transport(s) => write!(f, "transport error: {}", s),
            FebosClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            FebosClientError::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for FebosClientError {}

impl From<ureq::Error> for FebosClientError {
    fn from(value: ureq::Error) -> Self {
        match value {
            ureq::Error::StatusCode(status)
                if status == StatusCode::UNAUTHORIZED.as_u16() || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                FebosClientError::Unauthorized(format!("http {}", status))
            }
            ureq::Error::StatusCode(status) => FebosClientError::Http {
                status,
                message: StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("<no reason>")
                    .to_string(),
            },
            other => FebosClientError::Transport(other.to_string()),
        }
    }
}

/// What the bridge needs from the vendor webapp.
pub trait FebosApi {
    fn login(&self, username: &str, password: &str) -> Result<Vec<InstallationId>, FebosClientError>;

    fn get_page_config(&self, installation_id: InstallationId) -> Result<PageConfig, FebosClientError>;

    fn get_realtime_values(
        &self,
        installation_id: InstallationId,
        group_codes: &[String],
    ) -> Result<Vec<RealtimeData>, FebosClientError>;

    fn write_realtime_value(
        &self,
        installation_id: InstallationId,
        device_id: DeviceId,
        thing_id: ThingId,
        code: &str,
        raw_value: &Value,
    ) -> Result<WriteResponse, FebosClientError>;
}

pub struct FebosClient {
    agent: ureq::Agent,
    base_url: String,
}

impl FebosClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        FebosClient {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, FebosClientError> {
        let de = &mut serde_json::Deserializer::from_str(body);
        serde_path_to_error::deserialize(de).map_err(|e| FebosClientError::Json(format!("{}: {}", path, e)))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, FebosClientError> {
        let url = self.url(path);
        let mut req = self.agent.get(&url).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        let mut res = req.call()?;
        let body = res.body_mut().read_to_string()?;
        Self::decode(path, &body)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, FebosClientError> {
        let url = self.url(path);
        let mut req = self.agent.post(&url).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        let mut res = req.send_json(body)?;
        let text = res.body_mut().read_to_string()?;
        Self::decode(path, &text)
    }
}

impl FebosApi for FebosClient {
    fn login(&self, username: &str, password: &str) -> Result<Vec<InstallationId>, FebosClientError> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let res: LoginResponse = self.post_json("/login", &[], &req)?;
        debug!("Login successful for user '{}'", username);
        Ok(res.installation_id_list)
    }

    fn get_page_config(&self, installation_id: InstallationId) -> Result<PageConfig, FebosClientError> {
        self.get_json("/pageConfig", &[("installationId", installation_id.0.to_string())])
    }

    fn get_realtime_values(
        &self,
        installation_id: InstallationId,
        group_codes: &[String],
    ) -> Result<Vec<RealtimeData>, FebosClientError> {
        self.get_json(
            "/realtimeData",
            &[
                ("installationId", installation_id.0.to_string()),
                ("inputGroupList", group_codes.join(",")),
            ],
        )
    }

    fn write_realtime_value(
        &self,
        installation_id: InstallationId,
        device_id: DeviceId,
        thing_id: ThingId,
        code: &str,
        raw_value: &Value,
    ) -> Result<WriteResponse, FebosClientError> {
        let body = RealtimeData {
            device_id,
            thing_id,
            data: BTreeMap::from([(
                code.to_string(),
                RealtimeValue {
                    i: Some(raw_value.clone()),
                },
            )]),
        };
        self.post_json(
            "/realtimeData",
            &[("installationId", installation_id.0.to_string())],
            &body,
        )
    }
}
