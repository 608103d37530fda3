use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use governor::middleware::StateInformationMiddleware;
use std::{sync::Arc, time::Duration};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;

pub type AuthRateLimitLayer = GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body>;

/// Per-peer-IP limiter for the unauthenticated auth endpoints.
///
/// Requires the server to be run with `ConnectInfo<SocketAddr>`.
pub fn create_auth_rate_limiter(config: &Config) -> anyhow::Result<AuthRateLimitLayer> {
    let burst_size = config.rate_limit_ip_max_requests.max(1);
    let window_seconds = config.rate_limit_ip_window_seconds.max(1);
    let governor_conf = GovernorConfigBuilder::default()
        .period(Duration::from_secs(window_seconds))
        .burst_size(burst_size)
        .key_extractor(PeerIpKeyExtractor)
        .use_headers()
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid auth rate limiter configuration"))?;

    Ok(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "auth rate limit exceeded");
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_REQUESTS",
                "Too many requests. Please try again later.",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            tracing::error!("rate limiter could not determine the peer address");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Unable to determine request identity.",
                None,
            )
        }
        GovernorError::Other { code, msg, headers } => {
            let mut response = error_response(
                code,
                "RATE_LIMIT_ERROR",
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": message,
        "code": code,
    });
    if let Some(retry_after) = retry_after {
        body["retry_after"] = retry_after.into();
    }

    let mut response = (status, Json(body)).into_response();
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}
