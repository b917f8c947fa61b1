//! Client for the desk's own HTTP control API.
//!
//! The desk exposes `GET /mode/{mode}`. It answers 404 when the controller
//! behind the tunnel is not reachable, otherwise a JSON status body.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// Mode code understood by the desk controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Desk down, reported as off
    Lower,
    /// Desk up, reported as on
    Raise,
}

impl Mode {
    pub fn from_on(on: bool) -> Self {
        if on { Mode::Raise } else { Mode::Lower }
    }

    pub fn code(self) -> &'static str {
        match self {
            Mode::Lower => "1",
            Mode::Raise => "3",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of probing the desk
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// The endpoint answered 404
    NotFound,

    /// Parsed response body; `None` when empty or `null`
    Body(Option<serde_json::Value>),
}

impl Probe {
    /// The payload confirming the device state, if any
    pub fn confirmed(&self) -> Option<&serde_json::Value> {
        match self {
            Probe::Body(Some(body)) => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Request to device failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Device answered with status {0}")]
    Status(StatusCode),

    #[error("Device answered with invalid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),
}

/// Trait for the device control surface
#[async_trait]
pub trait DeviceEndpoint: Send + Sync {
    async fn probe(&self, mode: Mode) -> Result<Probe, EndpointError>;
}

/// Device endpoint reached over HTTP
pub struct HttpDeviceEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDeviceEndpoint {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn mode_url(&self, mode: Mode) -> String {
        format!("{}/mode/{}", self.base_url, mode)
    }
}

#[async_trait]
impl DeviceEndpoint for HttpDeviceEndpoint {
    async fn probe(&self, mode: Mode) -> Result<Probe, EndpointError> {
        let url = self.mode_url(mode);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        debug!(
            "Device probe {} -> {} (content-type: {:?})",
            url,
            status,
            response.headers().get(reqwest::header::CONTENT_TYPE)
        );

        if status == StatusCode::NOT_FOUND {
            return Ok(Probe::NotFound);
        }
        if !status.is_success() {
            return Err(EndpointError::Status(status));
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Probe::Body(None));
        }

        let body: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(EndpointError::InvalidBody)?;
        Ok(Probe::Body((!body.is_null()).then_some(body)))
    }
}

/// Recording endpoint for tests
#[cfg(test)]
#[derive(Debug)]
pub struct MockDeviceEndpoint {
    pub probes: std::sync::Mutex<Vec<Mode>>,
    pub response: Probe,
}

#[cfg(test)]
impl MockDeviceEndpoint {
    pub fn new(response: Probe) -> Self {
        Self {
            probes: std::sync::Mutex::new(Vec::new()),
            response,
        }
    }

    pub fn probed(&self) -> Vec<Mode> {
        self.probes.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl DeviceEndpoint for MockDeviceEndpoint {
    async fn probe(&self, mode: Mode) -> Result<Probe, EndpointError> {
        self.probes.lock().unwrap().push(mode);
        Ok(self.response.clone())
    }
}
