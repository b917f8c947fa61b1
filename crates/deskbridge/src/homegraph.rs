//! Outbound calls to the assistant platform (Home Graph).
//!
//! Two calls exist: request sync, asking the platform to re-pull the device
//! catalog, and report state, pushing a confirmed device state (or an error
//! code) after the store changed.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::smarthome::ErrorCode;
use crate::smarthome::ErrorPayload;

/// Service account key material
///
/// Only the fields used here are read. The token is expected to be minted by
/// whatever provisions the key file.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub client_email: String,
    pub access_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_email", &self.client_email)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Failed to read key file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Invalid key file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CredentialsError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&contents).map_err(|e| CredentialsError::Parse(path.to_path_buf(), e))
    }
}

/// Body of a report state call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStateRequest {
    pub request_id: String,
    pub agent_user_id: String,
    pub payload: ReportPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportPayload {
    States(StatesPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatesPayload {
    pub devices: ReportedDevices,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportedDevices {
    pub states: BTreeMap<String, ReportedState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportedState {
    pub on: bool,
}

impl ReportStateRequest {
    /// Report carrying the confirmed on/off state of one device
    pub fn states(request_id: String, agent_user_id: String, device_id: &str, on: bool) -> Self {
        let mut states = BTreeMap::new();
        states.insert(device_id.to_string(), ReportedState { on });
        Self {
            request_id,
            agent_user_id,
            payload: ReportPayload::States(StatesPayload {
                devices: ReportedDevices { states },
            }),
        }
    }

    /// Report carrying only an error code
    pub fn error(request_id: String, agent_user_id: String, error_code: ErrorCode) -> Self {
        Self {
            request_id,
            agent_user_id,
            payload: ReportPayload::Error(ErrorPayload { error_code }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestSyncBody<'a> {
    agent_user_id: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("No credentials configured for the assistant platform")]
    CredentialsUnavailable,

    #[error("Request to assistant platform failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Assistant platform answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Trait for the push side of the assistant platform
#[async_trait]
pub trait AssistantPlatform: Send + Sync {
    async fn request_sync(&self, agent_user_id: &str) -> Result<(), PlatformError>;

    async fn report_state(&self, report: &ReportStateRequest) -> Result<(), PlatformError>;
}

/// Home Graph REST client
pub struct HomeGraphClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HomeGraphClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<(), PlatformError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(PlatformError::CredentialsUnavailable)?;

        let url = format!("{}/v1/devices:{}", self.base_url, method);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PlatformError::Status { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl AssistantPlatform for HomeGraphClient {
    async fn request_sync(&self, agent_user_id: &str) -> Result<(), PlatformError> {
        self.post("requestSync", &RequestSyncBody { agent_user_id })
            .await
    }

    async fn report_state(&self, report: &ReportStateRequest) -> Result<(), PlatformError> {
        self.post("reportStateAndNotification", report).await
    }
}

/// Recording platform for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub request_syncs: std::sync::Mutex<Vec<String>>,
    pub reports: std::sync::Mutex<Vec<ReportStateRequest>>,
    pub fail: bool,
}

#[cfg(test)]
impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<ReportStateRequest> {
        self.reports.lock().unwrap().clone()
    }

    pub fn request_syncs(&self) -> Vec<String> {
        self.request_syncs.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<(), PlatformError> {
        if self.fail {
            Err(PlatformError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[async_trait]
impl AssistantPlatform for MockPlatform {
    async fn request_sync(&self, agent_user_id: &str) -> Result<(), PlatformError> {
        self.request_syncs
            .lock()
            .unwrap()
            .push(agent_user_id.to_string());
        self.outcome()
    }

    async fn report_state(&self, report: &ReportStateRequest) -> Result<(), PlatformError> {
        self.reports.lock().unwrap().push(report.clone());
        self.outcome()
    }
}
