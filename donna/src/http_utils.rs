//! HTTP utility functions for consistent error handling across API clients

use reqwest::{header::RETRY_AFTER, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

use crate::errors::{DonnaError, DonnaResult};

/// Pass successful responses through, turn everything else into a tagged error
pub async fn check_response(response: Response, service: &str) -> DonnaResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()));
    let url = response.url().path().to_string();
    let error_text = response.text().await.unwrap_or_default();
    warn!("{} API error: {} - {}", service, status, error_text);

    Err(classify_status(status, retry_after, service, &url, error_text))
}

/// Map an HTTP status (and body) onto the error taxonomy
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    service: &str,
    resource: &str,
    body: String,
) -> DonnaError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => DonnaError::RateLimited {
            service: service.to_string(),
            retry_after,
        },
        // Google reports quota exhaustion as 403 with a rate-limit reason
        StatusCode::FORBIDDEN if is_rate_limit_reason(&body) => DonnaError::RateLimited {
            service: service.to_string(),
            retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DonnaError::Auth {
            service: service.to_string(),
            message: format!("{} - {}", status, body),
        },
        StatusCode::NOT_FOUND | StatusCode::GONE => DonnaError::NotFound {
            resource: resource.to_string(),
        },
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => DonnaError::TransientNetwork {
            message: format!("{} returned {} - {}", service, status, body),
        },
        _ => DonnaError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            message: body,
        },
    }
}

fn is_rate_limit_reason(body: &str) -> bool {
    body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded") || body.contains("quotaExceeded")
}

/// Retry-After in its delta-seconds form; HTTP dates are ignored
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Parse JSON response with consistent error handling
pub async fn parse_json_response<T>(response: Response, context: &str) -> DonnaResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| DonnaError::Parsing {
        format: context.to_string(),
        message: e.to_string(),
    })
}
