//! HTTP utilities for the compute REST API
//!
//! Thin wrapper over reqwest that attaches bearer auth, logs requests at
//! debug level, and maps non-2xx responses into the typed error taxonomy.

use crate::error::{ApiErrorPayload, Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging: truncate long responses and strip
/// non-printable characters.
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..MAX_LOG_BODY_LENGTH],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Map a non-2xx status and body to a typed error.
///
/// 404 means the resource vanished; 409 and 412 both signal the write lost
/// to a concurrent one (412 is the stale-fingerprint case). Everything
/// else is surfaced as [`Error::Api`] with the parsed payload.
fn status_error(status: StatusCode, body: &str, url: &str) -> Error {
    let payload = ApiErrorPayload::from_body(body);

    match status.as_u16() {
        404 => Error::NotFound {
            resource: if payload.message.is_empty() {
                url.to_string()
            } else {
                payload.message
            },
        },
        409 | 412 => Error::Conflict {
            message: if payload.message.is_empty() {
                format!("HTTP {status}")
            } else {
                payload.message
            },
        },
        code => Error::Api {
            status: code,
            payload,
        },
    }
}

/// HTTP client wrapper for compute API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    /// Make a GET request
    pub async fn get(&self, url: &str, token: Option<&str>) -> Result<Value> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(status_error(status, &body, url));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, token: Option<&str>, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(status_error(status, &response_body, url));
        }

        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str, token: Option<&str>) -> Result<Value> {
        tracing::debug!("DELETE {}", url);

        let mut request = self.client.delete(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(status_error(status, &body, url));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated_in_logs() {
        let body = "x".repeat(500);
        let logged = sanitize_for_log(&body);
        assert!(logged.contains("truncated"));
        assert!(logged.len() < body.len());
    }

    #[test]
    fn not_found_maps_to_typed_error() {
        let body = r#"{"error": {"code": 404, "message": "The resource 'vm-1' was not found"}}"#;
        let err = status_error(StatusCode::NOT_FOUND, body, "http://x/instances/vm-1");
        match err {
            Error::NotFound { resource } => assert!(resource.contains("vm-1")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn stale_fingerprint_maps_to_conflict() {
        let body = r#"{"error": {"code": 412, "message": "Supplied fingerprint does not match current metadata fingerprint."}}"#;
        let err = status_error(StatusCode::PRECONDITION_FAILED, body, "http://x/setMetadata");
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn unmapped_status_keeps_payload() {
        let body = r#"{"error": {"code": 403, "message": "Permission denied"}}"#;
        let err = status_error(StatusCode::FORBIDDEN, body, "http://x/instances");
        match err {
            Error::Api { status, payload } => {
                assert_eq!(status, 403);
                assert_eq!(payload.message, "Permission denied");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }
}
