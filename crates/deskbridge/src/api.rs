use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::smarthome::Envelope;
use crate::smarthome::ErrorCode;
use crate::smarthome::ErrorPayload;
use crate::smarthome::ErrorResponse;
use crate::smarthome::ExecutePayload;
use crate::smarthome::Intent;
use crate::smarthome::QueryPayload;
use crate::smarthome::SmartHomeError;
use crate::smarthome::SmartHomeRequest;
use crate::smarthome::SyncProtocolHandler;
use crate::state::PartialState;
use crate::store::StoreError;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Error body for requests the bridge cannot serve
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Shared application state
struct AppState {
    handler: Arc<SyncProtocolHandler>,
}

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(e) => (StatusCode::BAD_REQUEST, e),
            ApiError::NotFound(e) => (StatusCode::NOT_FOUND, e),
            ApiError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid payload: {}", e))
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for POST /smarthome
///
/// Dispatches on the intent of the last input; earlier ones are ignored.
#[tracing::instrument(skip_all, fields(request_id = tracing::field::Empty))]
async fn smarthome(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SmartHomeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(SmartHomeRequest {
        request_id,
        mut inputs,
    }) = body?;
    tracing::Span::current().record("request_id", request_id.as_str());

    let input = inputs
        .pop()
        .ok_or_else(|| ApiError::BadRequest("Request carries no inputs".to_string()))?;
    let intent = input
        .intent()
        .ok_or_else(|| ApiError::BadRequest(format!("Unsupported intent: {}", input.intent)))?;
    tracing::debug!("Handling {} request", intent);

    let handler = &state.handler;
    let response = match intent {
        Intent::Sync => Json(handler.sync(request_id)).into_response(),
        Intent::Query => {
            let payload: QueryPayload = input.payload()?;
            match handler.query(request_id.clone(), payload).await {
                Ok(response) => Json(response).into_response(),
                Err(SmartHomeError::DeviceNotFound(id)) => {
                    tracing::warn!("QUERY for unknown device {}", id);
                    let response: ErrorResponse = Envelope {
                        request_id,
                        payload: ErrorPayload {
                            error_code: ErrorCode::DeviceNotFound,
                        },
                    };
                    Json(response).into_response()
                }
                Err(SmartHomeError::InvalidRequest(e)) => return Err(ApiError::BadRequest(e)),
                Err(e) => {
                    tracing::error!("QUERY failed: {}", e);
                    return Err(ApiError::Internal(e.to_string()));
                }
            }
        }
        Intent::Execute => {
            let payload: ExecutePayload = input.payload()?;
            Json(handler.execute(request_id, payload).await).into_response()
        }
        Intent::Disconnect => Json(handler.disconnect(request_id)).into_response(),
    };

    Ok(response)
}

/// Handler for GET|POST /requestsync
///
/// Always answers 200; the outcome is only logged.
#[tracing::instrument(skip(state))]
async fn request_sync(State(state): State<Arc<AppState>>) -> StatusCode {
    let handler = &state.handler;
    handler.request_sync(handler.agent_user_id()).await;
    StatusCode::OK
}

/// Handler for PATCH /devices/:id/state
///
/// Direct write into the store, as done by the desk itself or an operator.
/// Like any other write touching `on`, it triggers report state.
#[tracing::instrument(skip(state, body))]
async fn write_state(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Result<Json<PartialState>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(partial) = body?;

    if !state.handler.knows(&device_id) {
        return Err(ApiError::NotFound(format!("Unknown device: {}", device_id)));
    }

    match state.handler.store().update(&device_id, partial).await {
        Ok(change) => Ok(Json(change).into_response()),
        Err(e @ StoreError::EmptyUpdate(_)) => Err(ApiError::BadRequest(e.to_string())),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

/// Handler for the account linking endpoints, which the bridge does not serve
async fn not_implemented() -> impl IntoResponse {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ErrorBody {
            error: "Account linking is not implemented".to_string(),
        }),
    )
}

/// Create the API router with all endpoints
pub fn create_router(handler: Arc<SyncProtocolHandler>) -> Router {
    let state = Arc::new(AppState { handler });
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/smarthome", post(smarthome))
        .route("/requestsync", get(request_sync).post(request_sync))
        .route("/devices/:id/state", patch(write_state))
        .route("/auth", get(not_implemented))
        .route("/token", get(not_implemented).post(not_implemented))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run report state for every store change
///
/// Each change gets its own task, so a hung device probe only holds up the
/// changes for that device.
pub fn spawn_report_state_listener(handler: Arc<SyncProtocolHandler>) -> JoinHandle<()> {
    let mut changes = handler.store().subscribe();

    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    tracing::info!(
                        "Store write triggered report state for {} (rev {})",
                        change.device_id,
                        change.revision
                    );
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let outcome = handler.report_state(change).await;
                        tracing::debug!("Report state finished: {:?}", outcome);
                    });
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Report state listener lagged, {} changes missed", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("Report state listener exiting");
    })
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8565)
/// * `handler` - The smart home handler serving every route
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    handler: Arc<SyncProtocolHandler>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(handler);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
