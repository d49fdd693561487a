//! Shared HTTP plumbing for provider clients

use crate::error::{CapabilityError, PipelineError};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

pub(crate) fn build_http_client(request_timeout: Duration) -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport-level failure
pub(crate) fn map_transport_error(error: reqwest::Error) -> CapabilityError {
    if error.is_timeout() {
        CapabilityError::Transient(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        CapabilityError::Transient(format!("Connection error: {}", error))
    } else if error.is_decode() {
        CapabilityError::MalformedOutput(format!("Failed to decode response: {}", error))
    } else if error.is_request() || error.is_body() {
        CapabilityError::Transient(format!("Request failed: {}", error))
    } else {
        CapabilityError::Transient(format!("HTTP error: {}", error))
    }
}

/// Map a non-success status to the capability error taxonomy
pub(crate) fn map_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> CapabilityError {
    let detail: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    match status.as_u16() {
        401 | 403 => CapabilityError::Auth(format!("{}: {}", status, detail)),
        408 => CapabilityError::Transient(format!("{}: {}", status, detail)),
        429 => CapabilityError::RateLimited {
            message: format!("{}: {}", status, detail),
            retry_after,
        },
        s if s >= 500 => CapabilityError::Transient(format!("{}: {}", status, detail)),
        _ => CapabilityError::MalformedRequest(format!("{}: {}", status, detail)),
    }
}

/// `Retry-After` as delta-seconds or an HTTP date
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}

/// Pass successful responses through, turn the rest into typed errors
pub(crate) async fn check_response(response: Response) -> Result<Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = parse_retry_after(response.headers());
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(status, retry_after, &body))
}
