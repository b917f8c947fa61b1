use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::config::DeviceConfig;
use crate::endpoint::DeviceEndpoint;
use crate::endpoint::EndpointError;
use crate::endpoint::MockDeviceEndpoint;
use crate::endpoint::Mode;
use crate::endpoint::Probe;
use crate::homegraph::MockPlatform;
use crate::homegraph::ReportPayload;
use crate::state::DeviceState;
use crate::state::PartialState;
use crate::state::StateChange;
use crate::store::DeviceStore;
use crate::store::MemoryStore;

struct Harness {
    handler: SyncProtocolHandler,
    store: Arc<MemoryStore>,
    endpoint: Arc<MockDeviceEndpoint>,
    platform: Arc<MockPlatform>,
}

fn device(id: &str) -> Device {
    DeviceConfig {
        id: id.to_string(),
        ..DeviceConfig::default()
    }
    .to_device()
}

fn harness_with(probe: Probe, has_credentials: bool, platform: MockPlatform) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let endpoint = Arc::new(MockDeviceEndpoint::new(probe));
    let platform = Arc::new(platform);
    let handler = SyncProtocolHandler::new(
        HandlerConfig {
            agent_user_id: "agent-1".to_string(),
            devices: vec![device("d1")],
            has_credentials,
        },
        store.clone(),
        endpoint.clone(),
        platform.clone(),
    );
    Harness {
        handler,
        store,
        endpoint,
        platform,
    }
}

fn harness(probe: Probe) -> Harness {
    harness_with(probe, true, MockPlatform::new())
}

fn ok_probe() -> Probe {
    Probe::Body(Some(serde_json::json!({"state": "ok"})))
}

fn query_payload(ids: &[&str]) -> QueryPayload {
    serde_json::from_value(serde_json::json!({
        "devices": ids.iter().map(|id| serde_json::json!({"id": id})).collect::<Vec<_>>()
    }))
    .unwrap()
}

fn execute_payload(id: &str, params: serde_json::Value) -> ExecutePayload {
    serde_json::from_value(serde_json::json!({
        "commands": [{
            "devices": [{"id": id}],
            "execution": [{"command": "action.devices.commands.OnOff", "params": params}]
        }]
    }))
    .unwrap()
}

fn change(id: &str, on: bool, revision: u64) -> StateChange {
    StateChange {
        device_id: id.to_string(),
        state: DeviceState { on, online: false },
        revision,
    }
}

#[test]
fn test_sync_is_pure() {
    let h = harness(ok_probe());

    let first = h.handler.sync("r1".to_string());
    let second = h.handler.sync("r2".to_string());

    assert_eq!(first.request_id, "r1");
    assert_eq!(second.request_id, "r2");
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.payload.agent_user_id, "agent-1");
    assert_eq!(first.payload.devices.len(), 1);
}

#[test]
fn test_sync_payload_shape() {
    let store = Arc::new(MemoryStore::new());
    let handler = SyncProtocolHandler::new(
        HandlerConfig {
            agent_user_id: "23213213131321321321".to_string(),
            devices: vec![DeviceConfig::default().to_device()],
            has_credentials: false,
        },
        store,
        Arc::new(MockDeviceEndpoint::new(Probe::NotFound)),
        Arc::new(MockPlatform::new()),
    );

    let json = serde_json::to_string_pretty(&handler.sync("sync-1".to_string())).unwrap();
    insta::assert_snapshot!(json, @r#"
    {
      "requestId": "sync-1",
      "payload": {
        "agentUserId": "23213213131321321321",
        "devices": [
          {
            "id": "standing-desk-123",
            "type": "action.devices.types.SWITCH",
            "traits": [
              "action.devices.traits.OnOff"
            ],
            "name": {
              "defaultNames": [
                "My Standing Desk"
              ],
              "name": "Standing Desk",
              "nicknames": [
                "Standing Desk"
              ]
            },
            "willReportState": true,
            "deviceInfo": {
              "manufacturer": "Wassim Chegham",
              "model": "123456789",
              "hwVersion": "1.0",
              "swVersion": "1.0"
            }
          }
        ]
      }
    }
    "#);
}

#[tokio::test]
async fn test_execute_then_query() {
    let h = harness(ok_probe());

    for on in [true, false] {
        let response = h
            .handler
            .execute("e".to_string(), execute_payload("d1", serde_json::json!({"on": on})))
            .await;
        assert_eq!(response.payload.commands, vec![CommandResult::success("d1".to_string())]);

        let query = h
            .handler
            .query("q".to_string(), query_payload(&["d1"]))
            .await
            .unwrap();
        assert_eq!(query.payload.devices["d1"].on, on);
    }
}

#[tokio::test]
async fn test_execute_leaves_online_untouched() {
    let h = harness(ok_probe());
    h.store
        .update(
            "d1",
            PartialState {
                on: Some(false),
                online: Some(true),
            },
        )
        .await
        .unwrap();

    h.handler
        .execute("e".to_string(), execute_payload("d1", serde_json::json!({"on": true})))
        .await;

    assert_eq!(
        h.store.get("d1").await.unwrap(),
        Some(DeviceState {
            on: true,
            online: true
        })
    );
}

#[tokio::test]
async fn test_execute_reports_success_without_probing() {
    let h = harness(Probe::NotFound);

    let response = h
        .handler
        .execute("e".to_string(), execute_payload("d1", serde_json::json!({"on": true})))
        .await;

    let result = &response.payload.commands[0];
    assert_eq!(result.status, CommandStatus::Success);
    assert!(result.states.unwrap().online);
    assert!(h.endpoint.probed().is_empty());
}

#[tokio::test]
async fn test_execute_unknown_device() {
    let h = harness(ok_probe());

    let response = h
        .handler
        .execute("e".to_string(), execute_payload("nope", serde_json::json!({"on": true})))
        .await;

    assert_eq!(
        response.payload.commands,
        vec![CommandResult::error("nope".to_string(), ErrorCode::DeviceNotFound)]
    );
    assert_eq!(h.store.get("nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_execute_without_on_param() {
    let h = harness(ok_probe());

    let response = h
        .handler
        .execute(
            "e".to_string(),
            execute_payload("d1", serde_json::json!({"brightness": 10})),
        )
        .await;

    assert_eq!(
        response.payload.commands,
        vec![CommandResult::error("d1".to_string(), ErrorCode::NotSupported)]
    );
    assert_eq!(h.store.get("d1").await.unwrap(), None);
}

#[tokio::test]
async fn test_execute_uses_first_execution_entry() {
    let h = harness(ok_probe());
    let payload: ExecutePayload = serde_json::from_value(serde_json::json!({
        "commands": [{
            "devices": [{"id": "d1"}],
            "execution": [
                {"command": "action.devices.commands.OnOff", "params": {"on": true}},
                {"command": "action.devices.commands.OnOff", "params": {"on": false}}
            ]
        }]
    }))
    .unwrap();

    h.handler.execute("e".to_string(), payload).await;

    assert!(h.store.get("d1").await.unwrap().unwrap().on);
}

#[tokio::test]
async fn test_query_unknown_device() {
    let h = harness(ok_probe());

    let err = h
        .handler
        .query("q".to_string(), query_payload(&["d1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SmartHomeError::DeviceNotFound(id) if id == "d1"));
}

#[tokio::test]
async fn test_query_without_devices() {
    let h = harness(ok_probe());

    let err = h
        .handler
        .query("q".to_string(), query_payload(&[]))
        .await
        .unwrap_err();

    assert!(matches!(err, SmartHomeError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_query_does_not_mutate() {
    let h = harness(ok_probe());
    h.store.update("d1", PartialState::on(true)).await.unwrap();
    let mut rx = h.store.subscribe();

    h.handler
        .query("q".to_string(), query_payload(&["d1"]))
        .await
        .unwrap();

    assert!(rx.try_recv().is_err());
    assert!(h.store.get("d1").await.unwrap().unwrap().on);
}

#[tokio::test]
async fn test_disconnect_acknowledges() {
    let h = harness(ok_probe());

    assert_eq!(h.handler.disconnect("x".to_string()), Acknowledgement {});
    assert_eq!(h.store.get("d1").await.unwrap(), None);
}

#[tokio::test]
async fn test_request_sync_calls_platform() {
    let h = harness(ok_probe());

    h.handler.request_sync("agent-1").await;

    assert_eq!(h.platform.request_syncs(), vec!["agent-1".to_string()]);
}

#[tokio::test]
async fn test_request_sync_swallows_failure() {
    let h = harness_with(ok_probe(), true, MockPlatform::failing());

    // Must return normally even though the platform call fails
    h.handler.request_sync("agent-1").await;

    assert_eq!(h.platform.request_syncs().len(), 1);
}

#[tokio::test]
async fn test_report_state_mode_mapping() {
    let h = harness(ok_probe());

    h.handler.report_state(change("d1", true, 1)).await;
    h.handler.report_state(change("d1", false, 2)).await;

    assert_eq!(h.endpoint.probed(), vec![Mode::Raise, Mode::Lower]);
    let codes: Vec<_> = h.endpoint.probed().into_iter().map(Mode::code).collect();
    assert_eq!(codes, vec!["3", "1"]);
}

#[tokio::test]
async fn test_report_state_confirmed() {
    let h = harness(ok_probe());
    h.store.update("d1", PartialState::on(false)).await.unwrap();
    let mut rx = h.store.subscribe();

    h.store.update("d1", PartialState::on(true)).await.unwrap();
    let event = rx.recv().await.unwrap();
    let outcome = h.handler.report_state(event).await;

    assert_eq!(outcome, ReportOutcome::Reported);
    assert_eq!(h.endpoint.probed(), vec![Mode::Raise]);

    let reports = h.platform.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].agent_user_id, "agent-1");
    assert_eq!(
        serde_json::to_value(&reports[0].payload).unwrap(),
        serde_json::json!({"devices": {"states": {"d1": {"on": true}}}})
    );
}

#[tokio::test]
async fn test_report_state_not_found_is_offline() {
    let h = harness(Probe::NotFound);

    let outcome = h.handler.report_state(change("d1", true, 1)).await;

    assert_eq!(outcome, ReportOutcome::ErrorReported);
    let reports = h.platform.reports();
    assert_eq!(reports.len(), 1);
    let json = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(json["payload"], serde_json::json!({"errorCode": "deviceOffline"}));
    assert!(json["payload"].get("devices").is_none());
}

#[tokio::test]
async fn test_report_state_empty_body_is_offline() {
    let h = harness(Probe::Body(None));

    let outcome = h.handler.report_state(change("d1", false, 1)).await;

    assert_eq!(outcome, ReportOutcome::ErrorReported);
    assert!(matches!(
        h.platform.reports()[0].payload,
        ReportPayload::Error(ErrorPayload {
            error_code: ErrorCode::DeviceOffline
        })
    ));
}

struct UnreachableEndpoint;

#[async_trait]
impl DeviceEndpoint for UnreachableEndpoint {
    async fn probe(&self, _mode: Mode) -> Result<Probe, EndpointError> {
        Err(EndpointError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }
}

#[tokio::test]
async fn test_report_state_endpoint_error_is_offline() {
    let platform = Arc::new(MockPlatform::new());
    let handler = SyncProtocolHandler::new(
        HandlerConfig {
            agent_user_id: "agent-1".to_string(),
            devices: vec![device("d1")],
            has_credentials: true,
        },
        Arc::new(MemoryStore::new()),
        Arc::new(UnreachableEndpoint),
        platform.clone(),
    );

    let outcome = handler.report_state(change("d1", true, 1)).await;

    assert_eq!(outcome, ReportOutcome::ErrorReported);
    assert_eq!(platform.reports().len(), 1);
}

#[tokio::test]
async fn test_report_state_without_credentials() {
    let h = harness_with(ok_probe(), false, MockPlatform::new());

    let outcome = h.handler.report_state(change("d1", true, 1)).await;

    assert_eq!(outcome, ReportOutcome::Skipped);
    assert!(h.endpoint.probed().is_empty());
    assert!(h.platform.reports().is_empty());
}

#[tokio::test]
async fn test_report_state_drops_stale_revision() {
    let h = harness(ok_probe());

    assert_eq!(
        h.handler.report_state(change("d1", false, 2)).await,
        ReportOutcome::Reported
    );
    assert_eq!(
        h.handler.report_state(change("d1", true, 1)).await,
        ReportOutcome::Stale
    );

    assert_eq!(h.endpoint.probed(), vec![Mode::Lower]);
    assert_eq!(h.platform.reports().len(), 1);
}

#[tokio::test]
async fn test_report_state_push_failure() {
    let h = harness_with(ok_probe(), true, MockPlatform::failing());

    let outcome = h.handler.report_state(change("d1", true, 1)).await;

    assert_eq!(outcome, ReportOutcome::PushFailed);
    assert_eq!(h.platform.reports().len(), 1);
}

#[tokio::test]
async fn test_report_state_records_reachability() {
    let h = harness(ok_probe());
    let event = h.store.update("d1", PartialState::on(true)).await.unwrap();

    h.handler.report_state(event).await;
    assert!(h.store.get("d1").await.unwrap().unwrap().online);

    let offline = harness(Probe::NotFound);
    offline
        .store
        .update(
            "d1",
            PartialState {
                on: None,
                online: Some(true),
            },
        )
        .await
        .unwrap();
    let event = offline.store.update("d1", PartialState::on(true)).await.unwrap();

    offline.handler.report_state(event).await;
    assert!(!offline.store.get("d1").await.unwrap().unwrap().online);
}

/// Answers for the raised desk only, as if lowering had unplugged it
struct RaiseOnlyEndpoint;

#[async_trait]
impl DeviceEndpoint for RaiseOnlyEndpoint {
    async fn probe(&self, mode: Mode) -> Result<Probe, EndpointError> {
        match mode {
            Mode::Raise => Ok(Probe::Body(Some(serde_json::json!({"state": "ok"})))),
            Mode::Lower => Ok(Probe::NotFound),
        }
    }
}

#[tokio::test]
async fn test_reachability_follows_last_report_not_captured_change() {
    let store = Arc::new(MemoryStore::new());
    let handler = SyncProtocolHandler::new(
        HandlerConfig {
            agent_user_id: "agent-1".to_string(),
            devices: vec![device("d1")],
            has_credentials: true,
        },
        store.clone(),
        Arc::new(RaiseOnlyEndpoint),
        Arc::new(MockPlatform::new()),
    );

    // Both writes land before either report runs, so both carry online=false
    let raised = store.update("d1", PartialState::on(true)).await.unwrap();
    let lowered = store.update("d1", PartialState::on(false)).await.unwrap();
    assert!(!lowered.state.online);

    assert_eq!(handler.report_state(raised).await, ReportOutcome::Reported);
    assert!(store.get("d1").await.unwrap().unwrap().online);

    assert_eq!(
        handler.report_state(lowered).await,
        ReportOutcome::ErrorReported
    );
    let state = store.get("d1").await.unwrap().unwrap();
    assert!(!state.online);
    assert!(!state.on);
}

#[tokio::test]
async fn test_report_request_ids_are_unique() {
    let h = harness(ok_probe());

    h.handler.report_state(change("d1", true, 1)).await;
    h.handler.report_state(change("d1", false, 2)).await;

    let reports = h.platform.reports();
    assert_ne!(reports[0].request_id, reports[1].request_id);
}
