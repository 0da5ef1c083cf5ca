//! Notification decoding and ledger appends.

use std::sync::Arc;

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use capscale_core::{ExceptionEvent, Operation, TableId, Timestamp, epoch_millis};
use capscale_ledger::ExceptionLedger;

/// Exception name that marks a throttled request.
pub const THROUGHPUT_EXCEPTION: &str = "ProvisionedThroughputExceededException";

/// Reasons a notification is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("unknown table: {0}")]
    UnknownTable(TableId),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Raw notification as delivered by the upstream source.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub table: String,
    pub operation: String,
    /// Epoch milliseconds or RFC 3339. Missing means "now".
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Name of the exception that triggered the notification, if any.
    #[serde(default)]
    pub exception: Option<String>,
}

impl Notification {
    pub fn new(table: impl Into<String>, operation: Operation) -> Self {
        Self {
            table: table.into(),
            operation: operation.as_str().to_string(),
            timestamp: None,
            exception: None,
        }
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp.to_string());
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// True when the notification is not about throttling and should be
    /// ignored.
    pub fn is_unrelated(&self) -> bool {
        self.exception
            .as_deref()
            .is_some_and(|e| !e.trim().eq_ignore_ascii_case(THROUGHPUT_EXCEPTION))
    }
}

/// Parse an epoch-millisecond integer or an RFC 3339 date.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, IngestError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<u64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| IngestError::InvalidTimestamp(raw.to_string()))?;
    u64::try_from(parsed.timestamp_millis())
        .map_err(|_| IngestError::InvalidTimestamp(raw.to_string()))
}

/// Writes validated throttling events into the ledger.
#[derive(Clone)]
pub struct IngestionAdapter {
    ledger: Arc<ExceptionLedger>,
}

impl IngestionAdapter {
    pub fn new(ledger: Arc<ExceptionLedger>) -> Self {
        Self { ledger }
    }

    /// Append one exception for a tracked table.
    pub fn record_exception(
        &self,
        table: &str,
        operation: Operation,
        timestamp: Timestamp,
    ) -> Result<ExceptionEvent, IngestError> {
        if !self.ledger.append_existing(table, operation, timestamp) {
            warn!(%table, %operation, "dropping exception for unknown table");
            return Err(IngestError::UnknownTable(table.to_string()));
        }
        debug!(%table, %operation, timestamp, "exception recorded");
        Ok(ExceptionEvent {
            table: table.to_string(),
            operation,
            timestamp,
        })
    }

    /// Decode and record a raw notification.
    ///
    /// Returns `Ok(None)` for notifications about other exceptions.
    pub fn ingest(&self, notification: &Notification) -> Result<Option<ExceptionEvent>, IngestError> {
        if notification.is_unrelated() {
            debug!(
                table = %notification.table,
                exception = notification.exception.as_deref().unwrap_or_default(),
                "ignoring non-throttling notification"
            );
            return Ok(None);
        }

        let operation: Operation = notification.operation.parse().map_err(|_| {
            warn!(table = %notification.table, operation = %notification.operation, "malformed notification");
            IngestError::InvalidOperation(notification.operation.clone())
        })?;

        let timestamp = match notification.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw).inspect_err(|_| {
                warn!(table = %notification.table, timestamp = raw, "malformed notification");
            })?,
            None => epoch_millis(),
        };

        self.record_exception(&notification.table, operation, timestamp)
            .map(Some)
    }
}
