//! Device state store.
//!
//! The store is the single source of truth for device state. Writes that touch
//! `on` (the device's `state` sub-path) are broadcast to subscribers, which is
//! what drives report state. `online` is bookkeeping written by report state
//! itself, so writing it alone stays silent.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::state::DeviceState;
use crate::state::PartialState;
use crate::state::StateChange;

/// Capacity of the change broadcast. Slow subscribers see `Lagged` past this.
const CHANGE_CHANNEL_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Update for {0} carries no fields")]
    EmptyUpdate(String),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

/// Key-value mapping from device id to device state
///
/// Kept behind a trait so the protocol handler does not care where the state
/// actually lives.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Read the state of a device, `None` if it was never written
    async fn get(&self, device_id: &str) -> Result<Option<DeviceState>, StoreError>;

    /// Apply a partial update, creating the state on first write
    async fn update(
        &self,
        device_id: &str,
        partial: PartialState,
    ) -> Result<StateChange, StoreError>;

    /// Stream of changes, one per successful update touching `on`
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
}

#[derive(Debug, Default)]
struct Entry {
    state: DeviceState,
    revision: u64,
}

/// In-process store
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    changes: broadcast::Sender<StateChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get(&self, device_id: &str) -> Result<Option<DeviceState>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(entries.get(device_id).map(|entry| entry.state))
    }

    async fn update(
        &self,
        device_id: &str,
        partial: PartialState,
    ) -> Result<StateChange, StoreError> {
        if partial.is_empty() {
            return Err(StoreError::EmptyUpdate(device_id.to_string()));
        }

        let change = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            let entry = entries.entry(device_id.to_string()).or_default();
            partial.apply_to(&mut entry.state);
            entry.revision += 1;

            StateChange {
                device_id: device_id.to_string(),
                state: entry.state,
                revision: entry.revision,
            }
        };

        debug!(
            "State written: {} -> on={}, online={} (rev {})",
            change.device_id, change.state.on, change.state.online, change.revision
        );

        if partial.on.is_some() {
            // No subscribers is fine, the write itself succeeded
            let _ = self.changes.send(change.clone());
        }

        Ok(change)
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }
}
