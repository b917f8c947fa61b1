use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::Method;
use axum::http::Response;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::http::header;
use axum::response::IntoResponse;
use tower_http::trace::TraceLayer;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{}", self);
        let status = match self {
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RelayError::Client(_) | RelayError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Headers that describe a single connection and never cross the relay
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Host and length are recomputed for the outgoing leg
fn is_forwarded(name: &HeaderName) -> bool {
    !is_hop_by_hop(name) && *name != header::HOST && *name != header::CONTENT_LENGTH
}

struct Relay {
    client: reqwest::Client,
    upstream: String,
}

#[tracing::instrument(skip_all, fields(method = %method, uri = %uri))]
async fn forward(
    State(relay): State<Arc<Relay>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Body>, RelayError> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = format!("{}{}", relay.upstream, path);
    tracing::debug!("Forwarding to {}", url);

    let mut request = relay.client.request(method, &url).body(body);
    for (name, value) in headers.iter().filter(|(name, _)| is_forwarded(name)) {
        request = request.header(name, value);
    }

    let upstream = request.send().await?;
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream.bytes().await?;

    tracing::debug!("Upstream answered {} with {} bytes", status, bytes.len());

    let mut response = Response::builder().status(status);
    for (name, value) in upstream_headers
        .iter()
        .filter(|(name, _)| is_forwarded(name))
    {
        response = response.header(name, value);
    }
    Ok(response.body(Body::from(bytes))?)
}

/// Router forwarding every request to `upstream`
///
/// Method, path, query, headers and body pass through unchanged. Failure to
/// reach the upstream answers 502.
pub fn create_relay_router(upstream: &str, timeout: Duration) -> Result<Router, RelayError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RelayError::Client)?;

    let relay = Arc::new(Relay {
        client,
        upstream: upstream.trim_end_matches('/').to_string(),
    });

    Ok(Router::new()
        .fallback(forward)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(relay))
}
