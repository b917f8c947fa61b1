use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

/// First line of every echo response
pub const ECHO_BANNER: &str = "request successfully proxied!";

/// Render received headers as the echo body
///
/// Repeated headers are joined with ", ".
pub fn render(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(serde_json::Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), serde_json::Value::String(value));
            }
        }
    }

    let headers = serde_json::to_string_pretty(&map).unwrap_or_default();
    format!("{}\n{}", ECHO_BANNER, headers)
}

#[tracing::instrument(skip_all)]
async fn echo(headers: HeaderMap) -> impl IntoResponse {
    tracing::debug!("Echoing {} headers", headers.len());
    ([(CONTENT_TYPE, "text/plain")], render(&headers))
}

/// Router answering every path and method with the echo body
pub fn create_echo_router() -> Router {
    Router::new().fallback(echo)
}
