use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::middleware::request_id::RequestId;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 1024;

/// Logs every 4xx/5xx response together with a preview of its body.
///
/// The body is buffered and forwarded unchanged.
pub async fn log_error_responses(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let latency_ms = started.elapsed().as_millis() as u64;
    let (mut parts, body) = response.into_parts();
    let (body, preview) = match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            let preview = body_preview(&bytes);
            (Body::from(bytes), preview)
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            (Body::empty(), format!("<unreadable body: {}>", err))
        }
    };

    if status.is_server_error() {
        tracing::error!(
            status = status.as_u16(),
            %method,
            path = %path,
            request_id = %request_id,
            latency_ms,
            body = %preview,
            "request failed"
        );
    } else {
        tracing::warn!(
            status = status.as_u16(),
            %method,
            path = %path,
            request_id = %request_id,
            latency_ms,
            body = %preview,
            "request rejected"
        );
    }

    Response::from_parts(parts, body)
}

fn body_preview(bytes: &Bytes) -> String {
    if bytes.len() <= MAX_LOGGED_BODY_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    format!(
        "{}... ({} bytes)",
        String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]),
        bytes.len()
    )
}
