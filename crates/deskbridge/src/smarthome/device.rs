use serde::Serialize;

/// Device type as advertised to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    #[serde(rename = "action.devices.types.SWITCH")]
    Switch,
}

/// Capability advertised to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceTrait {
    #[serde(rename = "action.devices.traits.OnOff")]
    OnOff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceName {
    pub default_names: Vec<String>,
    pub name: String,
    pub nicknames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub hw_version: String,
    pub sw_version: String,
}

/// A device in the static catalog returned on SYNC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub traits: Vec<DeviceTrait>,
    pub name: DeviceName,
    pub will_report_state: bool,
    pub device_info: DeviceInfo,
}

impl Device {
    /// An on/off switch that pushes its state through report state
    pub fn switch(id: String, name: DeviceName, device_info: DeviceInfo) -> Self {
        Self {
            id,
            device_type: DeviceType::Switch,
            traits: vec![DeviceTrait::OnOff],
            name,
            will_report_state: true,
            device_info,
        }
    }
}
