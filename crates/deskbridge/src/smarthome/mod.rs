//! Smart home fulfillment for the assistant platform.
//!
//! The assistant calls in with SYNC, QUERY, EXECUTE and DISCONNECT intents.
//! The bridge calls out with request sync and report state. All six share the
//! device catalog and the store, and live in [`SyncProtocolHandler`].

mod device;
mod handler;
mod protocol;
mod report;

#[cfg(test)]
mod tests;

pub use device::Device;
pub use device::DeviceInfo;
pub use device::DeviceName;
pub use device::DeviceTrait;
pub use device::DeviceType;
pub use handler::HandlerConfig;
pub use handler::ReportOutcome;
pub use handler::SmartHomeError;
pub use handler::SyncProtocolHandler;
pub use protocol::Acknowledgement;
pub use protocol::CommandResult;
pub use protocol::CommandStatus;
pub use protocol::ErrorCode;
pub use protocol::ErrorPayload;
pub use protocol::ErrorResponse;
pub use protocol::ExecutePayload;
pub use protocol::ExecuteResponse;
pub use protocol::Input;
pub use protocol::Intent;
pub use protocol::QueryPayload;
pub use protocol::QueryResponse;
pub use protocol::SmartHomeRequest;
pub use protocol::SyncResponse;
pub use protocol::Envelope;
