use serde::Deserialize;
use serde::Serialize;

/// Mutable state of a device, keyed by device id in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// Commanded/actual power state. For the desk, on means raised.
    pub on: bool,

    /// Last-known reachability as seen by the report-state flow.
    pub online: bool,
}

/// A partial write. Absent fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartialState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
}

impl PartialState {
    pub fn on(on: bool) -> Self {
        Self {
            on: Some(on),
            online: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.online.is_none()
    }

    /// Apply this partial on top of `state`
    pub fn apply_to(&self, state: &mut DeviceState) {
        if let Some(on) = self.on {
            state.on = on;
        }
        if let Some(online) = self.online {
            state.online = online;
        }
    }
}

/// Notification emitted by the store after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub device_id: String,
    pub state: DeviceState,

    /// Per-device write counter, strictly increasing.
    pub revision: u64,
}
