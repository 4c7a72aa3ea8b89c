//! Error types
//!
//! Typed error taxonomy for the client. Every failure surfaces to the
//! caller with enough context (resource name, operation id, provider
//! payload) to diagnose without digging through logs.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// One entry of a provider-reported error list.
///
/// HTTP-level errors carry a `reason` (e.g. `notFound`), operation-level
/// errors carry a `code` (e.g. `RESOURCE_NOT_FOUND`); both are optional
/// because providers are inconsistent about which fields they fill in.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Error payload attached to a non-2xx API response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiErrorPayload {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl ApiErrorPayload {
    /// Parse the `{"error": {...}}` envelope out of a response body.
    /// Returns a default (empty) payload if the body is not in that shape.
    pub fn from_body(body: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            error: ApiErrorPayload,
        }

        serde_json::from_str::<Envelope>(body)
            .map(|e| e.error)
            .unwrap_or_default()
    }
}

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource (or a disk/operation it references) no longer exists.
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// The requested mutation is invalid for the resource's current state.
    /// Raised locally, before any remote call is issued.
    #[error("precondition not met: {reason}")]
    Precondition { reason: String },

    /// A concurrent write won; typically a stale metadata fingerprint.
    /// Reload and retry with the fresh version token.
    #[error("conflicting write: {message}")]
    Conflict { message: String },

    /// Invalid local input, e.g. a missing public-key file. Raised before
    /// any remote call so no partially-created resource is left behind.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A remote operation reached its terminal state with a failure.
    /// Never auto-retried; the resource is left as the provider left it.
    #[error("operation {id} failed: {message}")]
    Operation { id: String, message: String },

    /// An operation did not reach a terminal state within the allowed
    /// time. The remote operation keeps running; only the wait stops.
    #[error("operation still pending after {waited:?}")]
    Timeout { waited: Duration },

    /// A predicate wait did not become true within the allowed time.
    #[error("condition not met after {waited:?}")]
    WaitTimeout { waited: Duration },

    /// Non-2xx API response outside the mapped cases above.
    #[error("API request failed with status {status}: {}", .payload.message)]
    Api { status: u16, payload: ApiErrorPayload },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a retry at the poll layer is worthwhile. Provider-reported
    /// operation failures and local precondition errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_envelope() {
        let body = r#"{"error": {"code": 404, "message": "Instance not found", "errors": [{"reason": "notFound", "message": "Instance not found"}]}}"#;
        let payload = ApiErrorPayload::from_body(body);
        assert_eq!(payload.code, Some(404));
        assert_eq!(payload.message, "Instance not found");
        assert_eq!(payload.errors.len(), 1);
        assert_eq!(payload.errors[0].reason.as_deref(), Some("notFound"));
    }

    #[test]
    fn malformed_body_yields_empty_payload() {
        let payload = ApiErrorPayload::from_body("<html>nope</html>");
        assert_eq!(payload.code, None);
        assert!(payload.message.is_empty());
    }

    #[test]
    fn transient_classification() {
        let rate_limited = Error::Api {
            status: 429,
            payload: ApiErrorPayload::default(),
        };
        assert!(rate_limited.is_transient());

        let conflict = Error::Conflict {
            message: "fingerprint mismatch".to_string(),
        };
        assert!(!conflict.is_transient());

        let failed_op = Error::Operation {
            id: "operation-123".to_string(),
            message: "QUOTA_EXCEEDED".to_string(),
        };
        assert!(!failed_op.is_transient());
    }
}
