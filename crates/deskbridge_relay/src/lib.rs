//! Standalone HTTP relay.
//!
//! Two independent listeners: one forwards every request untouched to a fixed
//! upstream, the other echoes the request headers back as plain text so the
//! relay can be checked end to end.

pub mod echo;
pub mod relay;

pub use echo::create_echo_router;
pub use relay::RelayError;
pub use relay::create_relay_router;
