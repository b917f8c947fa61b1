use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::protocol::Acknowledgement;
use super::protocol::CommandResult;
use super::protocol::Envelope;
use super::protocol::ErrorCode;
use super::protocol::ExecutePayload;
use super::protocol::ExecuteResponse;
use super::protocol::ExecuteResponsePayload;
use super::protocol::QueriedState;
use super::protocol::QueryPayload;
use super::protocol::QueryResponse;
use super::protocol::QueryResponsePayload;
use super::protocol::SyncPayload;
use super::protocol::SyncResponse;
use super::report::ReportSequencer;
use crate::endpoint::DeviceEndpoint;
use crate::endpoint::Mode;
use crate::homegraph::AssistantPlatform;
use crate::homegraph::PlatformError;
use crate::homegraph::ReportStateRequest;
use crate::state::PartialState;
use crate::state::StateChange;
use crate::store::DeviceStore;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SmartHomeError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device offline: {0}")]
    DeviceOffline(String),

    #[error("Service account key is not configured, report state is unavailable")]
    CredentialsUnavailable,

    #[error("Call to assistant platform failed: {0}")]
    UpstreamCallFailure(#[from] PlatformError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one store change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No credentials, nothing was called
    Skipped,
    /// A newer revision was already handled for this device
    Stale,
    /// The device confirmed and its state was pushed
    Reported,
    /// The device was unreachable and an error report was pushed
    ErrorReported,
    /// The push to the assistant platform itself failed
    PushFailed,
}

/// Static settings for the handler, built once at startup
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub agent_user_id: String,
    pub devices: Vec<Device>,

    /// Whether service account credentials were loaded
    pub has_credentials: bool,
}

/// Smart home fulfillment: translates assistant intents into store and device
/// operations, and pushes store changes back to the assistant.
pub struct SyncProtocolHandler {
    config: HandlerConfig,
    store: Arc<dyn DeviceStore>,
    endpoint: Arc<dyn DeviceEndpoint>,
    platform: Arc<dyn AssistantPlatform>,
    sequencer: ReportSequencer,
}

impl SyncProtocolHandler {
    pub fn new(
        config: HandlerConfig,
        store: Arc<dyn DeviceStore>,
        endpoint: Arc<dyn DeviceEndpoint>,
        platform: Arc<dyn AssistantPlatform>,
    ) -> Self {
        Self {
            config,
            store,
            endpoint,
            platform,
            sequencer: ReportSequencer::new(),
        }
    }

    pub fn agent_user_id(&self) -> &str {
        &self.config.agent_user_id
    }

    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    /// Whether the device is part of the catalog
    pub fn knows(&self, device_id: &str) -> bool {
        self.config.devices.iter().any(|d| d.id == device_id)
    }

    /// SYNC: the static device catalog
    pub fn sync(&self, request_id: String) -> SyncResponse {
        debug!("SYNC {}", request_id);
        Envelope {
            request_id,
            payload: SyncPayload {
                agent_user_id: self.config.agent_user_id.clone(),
                devices: self.config.devices.clone(),
            },
        }
    }

    /// QUERY: the stored `on` state of every requested device
    pub async fn query(
        &self,
        request_id: String,
        payload: QueryPayload,
    ) -> Result<QueryResponse, SmartHomeError> {
        if payload.devices.is_empty() {
            return Err(SmartHomeError::InvalidRequest(
                "QUERY names no devices".to_string(),
            ));
        }

        let mut devices = BTreeMap::new();
        for device in payload.devices {
            let state = self
                .store
                .get(&device.id)
                .await?
                .ok_or_else(|| SmartHomeError::DeviceNotFound(device.id.clone()))?;
            devices.insert(device.id, QueriedState { on: state.on });
        }

        Ok(Envelope {
            request_id,
            payload: QueryResponsePayload { devices },
        })
    }

    /// EXECUTE: write the commanded `on` state into the store
    ///
    /// Success is reported as soon as the store accepts the write. The device
    /// confirms later, through report state.
    pub async fn execute(&self, request_id: String, payload: ExecutePayload) -> ExecuteResponse {
        let mut commands = Vec::new();

        for command in payload.commands {
            let on = command.execution.first().and_then(|e| e.params.on);

            for device in command.devices {
                if !self.knows(&device.id) {
                    warn!("EXECUTE for unknown device {}", device.id);
                    commands.push(CommandResult::error(device.id, ErrorCode::DeviceNotFound));
                    continue;
                }

                let Some(on) = on else {
                    warn!("EXECUTE for {} carries no on parameter", device.id);
                    commands.push(CommandResult::error(device.id, ErrorCode::NotSupported));
                    continue;
                };

                match self.store.update(&device.id, PartialState::on(on)).await {
                    Ok(change) => {
                        info!("EXECUTE {} -> on={} (rev {})", device.id, on, change.revision);
                        commands.push(CommandResult::success(device.id));
                    }
                    Err(e) => {
                        error!("EXECUTE failed to write state for {}: {}", device.id, e);
                        commands.push(CommandResult::error(device.id, ErrorCode::TransientError));
                    }
                }
            }
        }

        Envelope {
            request_id,
            payload: ExecuteResponsePayload { commands },
        }
    }

    /// DISCONNECT: acknowledge, nothing else
    pub fn disconnect(&self, request_id: String) -> Acknowledgement {
        info!("DISCONNECT {}", request_id);
        Acknowledgement {}
    }

    /// Ask the assistant to pull the catalog again. Failures are only logged.
    pub async fn request_sync(&self, agent_user_id: &str) {
        match self.platform.request_sync(agent_user_id).await {
            Ok(()) => info!("Request sync was successful"),
            Err(e) => error!("{}", SmartHomeError::UpstreamCallFailure(e)),
        }
    }

    /// Confirm a store change with the device and push the result to the
    /// assistant. Never fails; every failure becomes an error report.
    pub async fn report_state(&self, change: StateChange) -> ReportOutcome {
        if !self.config.has_credentials {
            warn!("{}", SmartHomeError::CredentialsUnavailable);
            return ReportOutcome::Skipped;
        }

        let Some(_ticket) = self
            .sequencer
            .begin(&change.device_id, change.revision)
            .await
        else {
            debug!(
                "Dropping stale change for {} (rev {})",
                change.device_id, change.revision
            );
            return ReportOutcome::Stale;
        };

        let request_id = format!("report-{}-{}", change.device_id, change.revision);
        let agent_user_id = self.config.agent_user_id.clone();

        let (report, outcome) = match self.confirm(&change).await {
            Ok(()) => (
                ReportStateRequest::states(
                    request_id,
                    agent_user_id,
                    &change.device_id,
                    change.state.on,
                ),
                ReportOutcome::Reported,
            ),
            Err(e) => {
                warn!("{}", e);
                (
                    ReportStateRequest::error(request_id, agent_user_id, ErrorCode::DeviceOffline),
                    ReportOutcome::ErrorReported,
                )
            }
        };

        self.record_reachability(&change, outcome == ReportOutcome::Reported)
            .await;

        match self.platform.report_state(&report).await {
            Ok(()) => {
                info!(
                    "Report state for {} (rev {}) came back",
                    change.device_id, change.revision
                );
                outcome
            }
            Err(e) => {
                error!(
                    "Report state for {} failed: {}",
                    change.device_id,
                    SmartHomeError::UpstreamCallFailure(e)
                );
                ReportOutcome::PushFailed
            }
        }
    }

    /// Probe the device in the mode matching the new state
    async fn confirm(&self, change: &StateChange) -> Result<(), SmartHomeError> {
        let mode = Mode::from_on(change.state.on);
        let offline = || SmartHomeError::DeviceOffline(change.device_id.clone());

        let probe = self.endpoint.probe(mode).await.map_err(|e| {
            warn!("Probe of {} in mode {} failed: {}", change.device_id, mode, e);
            offline()
        })?;

        let body = probe.confirmed().ok_or_else(offline)?;
        debug!("Device {} confirmed with {}", change.device_id, body);
        Ok(())
    }

    /// Keep `online` in the store in line with the last probe
    ///
    /// Compared against the stored state, not the change being reported: an
    /// earlier report for the same device may have moved it since.
    async fn record_reachability(&self, change: &StateChange, online: bool) {
        match self.store.get(&change.device_id).await {
            Ok(Some(current)) if current.online == online => return,
            Ok(_) => {}
            Err(e) => warn!("Failed to read state of {}: {}", change.device_id, e),
        }

        let partial = PartialState {
            on: None,
            online: Some(online),
        };
        if let Err(e) = self.store.update(&change.device_id, partial).await {
            warn!(
                "Failed to record reachability of {}: {}",
                change.device_id, e
            );
        }
    }
}
