//! Asynchronous operation tracking
//!
//! Mutating API calls return an operation reference rather than their
//! result. [`OperationTracker`] submits those calls, polls the returned
//! [`Operation`] and resolves it to a terminal state. A failed operation
//! is never auto-retried; transient transport failures while polling are.

use crate::api::client::ComputeClient;
use crate::error::{Error, ErrorDetail, Result};
use crate::wait::WaitOptions;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;

/// Transient poll failures tolerated in a row before the wait gives up.
const MAX_TRANSIENT_POLLS: u32 = 3;

/// Remote operation status.
///
/// The wire reports `PENDING`/`RUNNING`/`DONE`; a `DONE` payload carrying
/// an error block is normalized to [`OperationStatus::Error`] so callers
/// see a single terminal failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Done | OperationStatus::Error)
    }
}

/// Error block of a failed operation.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl OperationError {
    /// Single-line summary of all error entries.
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            return "operation failed without details".to_string();
        }
        self.errors
            .iter()
            .map(|e| {
                let code = e.code.as_deref().or(e.reason.as_deref()).unwrap_or("UNKNOWN");
                match &e.message {
                    Some(msg) => format!("{code}: {msg}"),
                    None => code.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A remotely-tracked unit of work returned by a mutating API call.
///
/// Immutable once terminal: [`OperationTracker::poll`] stops rewriting it
/// after `DONE`/`ERROR` has been observed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default, rename = "operationType")]
    pub op_type: String,
    #[serde(default)]
    pub target_link: Option<String>,
    pub status: OperationStatus,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub insert_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Operation {
    /// Parse an operation from a response body, folding an attached error
    /// block into the status.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut op: Operation = serde_json::from_value(value)?;
        if op.error.is_some() {
            op.status = OperationStatus::Error;
        }
        Ok(op)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Submits mutating calls and resolves their operations.
#[derive(Clone)]
pub struct OperationTracker {
    client: ComputeClient,
}

impl OperationTracker {
    pub(crate) fn new(client: ComputeClient) -> Self {
        Self { client }
    }

    /// Submit a mutating request and return its operation reference.
    /// Exactly one remote call; no polling happens here.
    pub async fn submit(&self, url: &str, body: Option<&Value>) -> Result<Operation> {
        let response = self.client.post(url, body).await?;
        let op = Operation::from_value(response)?;
        tracing::info!("submitted operation {} ({})", op.name, op.op_type);
        Ok(op)
    }

    /// Single status check. Updates the operation in place and returns
    /// the refreshed status. A no-op once the operation is terminal.
    pub async fn poll(&self, op: &mut Operation) -> Result<OperationStatus> {
        if op.is_terminal() {
            return Ok(op.status);
        }

        let url = match &op.self_link {
            Some(link) => link.clone(),
            None => self.client.operation_url(&op.name),
        };
        let response = self.client.get(&url).await?;
        *op = Operation::from_value(response)?;
        Ok(op.status)
    }

    /// Poll until the operation reaches a terminal state.
    ///
    /// `DONE` resolves to `Ok`; `ERROR` fails with [`Error::Operation`]
    /// carrying the provider payload (no rollback is attempted - the
    /// resource stays as the provider left it, reload to observe).
    /// Exceeding the timeout fails with [`Error::Timeout`]; the remote
    /// operation keeps running. Transient transport failures are retried
    /// with the same cadence, bounded; provider-reported failures never.
    pub async fn await_completion(&self, op: &mut Operation, opts: &WaitOptions) -> Result<()> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            match self.poll(op).await {
                Ok(_) => failures = 0,
                Err(e) if e.is_transient() && failures + 1 < MAX_TRANSIENT_POLLS => {
                    failures += 1;
                    tracing::warn!(
                        "transient poll failure for operation {} ({failures}), retrying: {e}",
                        op.name
                    );
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::Operation {
                        id: op.name.clone(),
                        message: format!(
                            "gave up polling after {MAX_TRANSIENT_POLLS} transient failures: {e}"
                        ),
                    });
                }
                Err(e) => return Err(e),
            }

            match op.status {
                OperationStatus::Done => {
                    tracing::info!("operation {} done", op.name);
                    return Ok(());
                }
                OperationStatus::Error => {
                    let message = op
                        .error
                        .as_ref()
                        .map(OperationError::summary)
                        .unwrap_or_else(|| "operation failed without details".to_string());
                    return Err(Error::Operation {
                        id: op.name.clone(),
                        message,
                    });
                }
                OperationStatus::Pending | OperationStatus::Running => {}
            }

            let waited = started.elapsed();
            if waited >= opts.timeout {
                return Err(Error::Timeout { waited });
            }

            tokio::time::sleep(opts.backoff.delay(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pending_operation() {
        let op = Operation::from_value(json!({
            "kind": "compute#operation",
            "id": "1234567890",
            "name": "operation-1234567890",
            "operationType": "stop",
            "targetLink": "https://x/instances/vm-1",
            "status": "PENDING",
            "insertTime": "2024-03-04T10:30:00.000-08:00"
        }))
        .unwrap();

        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.op_type, "stop");
        assert!(!op.is_terminal());
        assert!(op.insert_time.is_some());
    }

    #[test]
    fn done_with_error_block_normalizes_to_error() {
        let op = Operation::from_value(json!({
            "name": "operation-77",
            "operationType": "attachDisk",
            "status": "DONE",
            "error": {
                "errors": [
                    {"code": "RESOURCE_IN_USE_BY_ANOTHER_RESOURCE", "message": "disk is attached elsewhere"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(op.status, OperationStatus::Error);
        assert!(op.is_terminal());
        let summary = op.error.unwrap().summary();
        assert!(summary.contains("RESOURCE_IN_USE_BY_ANOTHER_RESOURCE"));
        assert!(summary.contains("attached elsewhere"));
    }

    #[test]
    fn empty_error_block_still_summarizes() {
        let err = OperationError::default();
        assert_eq!(err.summary(), "operation failed without details");
    }
}
