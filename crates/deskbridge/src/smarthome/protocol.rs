//! Wire types for the smart home fulfillment webhook.
//!
//! Requests carry `{requestId, inputs: [{intent, payload}]}`. The payload shape
//! depends on the intent, so it is kept as raw JSON until the intent is known.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::device::Device;

/// Intents the webhook understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Intent {
    #[strum(serialize = "action.devices.SYNC")]
    Sync,
    #[strum(serialize = "action.devices.QUERY")]
    Query,
    #[strum(serialize = "action.devices.EXECUTE")]
    Execute,
    #[strum(serialize = "action.devices.DISCONNECT")]
    Disconnect,
}

/// Error codes understood by the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ErrorCode {
    DeviceOffline,
    DeviceNotFound,
    NotSupported,
    TransientError,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartHomeRequest {
    pub request_id: String,
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Input {
    pub intent: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Input {
    pub fn intent(&self) -> Option<Intent> {
        self.intent.parse().ok()
    }

    /// Decode the payload for the intent's expected shape
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryPayload {
    pub devices: Vec<DeviceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutePayload {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub devices: Vec<DeviceRef>,
    pub execution: Vec<Execution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Execution {
    /// Informational only, `params.on` drives the write
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub params: ExecutionParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionParams {
    pub on: Option<bool>,
}

/// `{requestId, payload}` wrapper shared by every intent response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<P> {
    pub request_id: String,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub agent_user_id: String,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueriedState {
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponsePayload {
    pub devices: BTreeMap<String, QueriedState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutedStates {
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub ids: Vec<String>,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<ExecutedStates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl CommandResult {
    pub fn success(id: String) -> Self {
        Self {
            ids: vec![id],
            status: CommandStatus::Success,
            states: Some(ExecutedStates { online: true }),
            error_code: None,
        }
    }

    pub fn error(id: String, error_code: ErrorCode) -> Self {
        Self {
            ids: vec![id],
            status: CommandStatus::Error,
            states: None,
            error_code: Some(error_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResponsePayload {
    pub commands: Vec<CommandResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
}

/// Empty acknowledgement returned on DISCONNECT
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {}

pub type SyncResponse = Envelope<SyncPayload>;
pub type QueryResponse = Envelope<QueryResponsePayload>;
pub type ExecuteResponse = Envelope<ExecuteResponsePayload>;
pub type ErrorResponse = Envelope<ErrorPayload>;
