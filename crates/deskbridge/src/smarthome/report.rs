//! Per-device ordering of report state attempts.
//!
//! Store changes can be handled concurrently, so two attempts for the same
//! device may race. Attempts for one device run one at a time, and an attempt
//! for a revision at or below the last one handled is dropped so a stale state
//! never overwrites a fresher one at the assistant.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::OwnedMutexGuard;

/// Last handled revision per device, each behind its own async lock
#[derive(Debug, Default)]
pub struct ReportSequencer {
    devices: Mutex<HashMap<String, Arc<tokio::sync::Mutex<u64>>>>,
}

/// Held for the duration of one report attempt
#[derive(Debug)]
pub struct ReportTicket {
    _guard: OwnedMutexGuard<u64>,
}

impl ReportSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the device's turn. Returns `None` if `revision` is stale.
    pub async fn begin(&self, device_id: &str, revision: u64) -> Option<ReportTicket> {
        let slot = {
            let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            devices.entry(device_id.to_string()).or_default().clone()
        };

        let mut last = slot.lock_owned().await;
        if revision <= *last {
            return None;
        }
        *last = revision;

        Some(ReportTicket { _guard: last })
    }
}
