pub mod api;
pub mod config;
pub mod endpoint;
pub mod homegraph;
pub mod logging;
pub mod smarthome;
pub mod state;
pub mod store;

pub use config::Config;
pub use config::LogLevel;
pub use smarthome::HandlerConfig;
pub use smarthome::SyncProtocolHandler;
pub use state::DeviceState;
pub use state::PartialState;
pub use state::StateChange;
