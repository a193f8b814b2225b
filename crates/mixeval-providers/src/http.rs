//! HTTP plumbing shared by the API-backed providers.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Response};

use crate::ProviderError;

/// Seconds to wait when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

/// Map a transport-level failure.
pub(crate) fn send_error(err: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(err.to_string())
    }
}

/// Turn a non-success HTTP status into a [`ProviderError`].
///
/// `error_message` pulls a readable message out of a provider-specific error
/// body; when it returns `None` the raw body is used.
pub(crate) async fn check_status(
    response: Response,
    model: &str,
    error_message: fn(&str) -> Option<String>,
) -> Result<Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after_secs.saturating_mul(1000),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or(body);
    Err(match status {
        401 | 403 => ProviderError::AuthenticationFailed(message),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError { status, message },
    })
}

/// Error bodies of the form `{"error": {"message": "..."}}` or `{"error": "..."}`.
pub(crate) fn nested_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
}

pub(crate) fn parse_error(err: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_messages() {
        assert_eq!(
            nested_error_message(r#"{"error": {"type": "x", "message": "bad model"}}"#).as_deref(),
            Some("bad model")
        );
        assert_eq!(
            nested_error_message(r#"{"error": "model 'x' not found"}"#).as_deref(),
            Some("model 'x' not found")
        );
        assert_eq!(nested_error_message("plain text"), None);
    }
}
