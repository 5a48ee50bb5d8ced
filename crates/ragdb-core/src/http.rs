//! Shared plumbing for the hosted model API clients.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result, ServiceErrorKind};

/// HTTP client with a per-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

/// Timeouts and connection failures are transient; so are retryable statuses.
pub fn classify(e: &reqwest::Error) -> ServiceErrorKind {
    if e.is_timeout() || e.is_connect() {
        ServiceErrorKind::Transient
    } else if let Some(status) = e.status() {
        ServiceErrorKind::from_status(status.as_u16())
    } else if e.is_decode() || e.is_builder() {
        ServiceErrorKind::Permanent
    } else {
        ServiceErrorKind::Transient
    }
}

// OpenAI nests the message under `error`; Cohere puts it at the top level.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorDetail },
    Flat { message: String },
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_detail(body: String) -> String {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { message }) => message,
        Err(_) => body,
    }
}

/// Classify a non-success response and describe it, including the API's own
/// message when the body carries one.
pub async fn describe_failure(response: reqwest::Response) -> (ServiceErrorKind, String) {
    let status = response.status();
    let kind = ServiceErrorKind::from_status(status.as_u16());
    let detail = match response.text().await {
        Ok(body) => error_detail(body),
        Err(e) => format!("error body unreadable: {e}"),
    };
    (kind, format!("API returned {status}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_error_body_shapes_are_understood() {
        assert_eq!(error_detail(r#"{"error":{"message":"bad key","type":"auth"}}"#.into()), "bad key");
        assert_eq!(error_detail(r#"{"message":"too many tokens"}"#.into()), "too many tokens");
        assert_eq!(error_detail("upstream timeout".into()), "upstream timeout");
    }
}
