//! Observability collaborator
//!
//! Every download that was attempted and either succeeded or errored produces
//! one [`OperationRecord`]. Canceled downloads produce none. Records go to an
//! [`OperationSink`]; the default [`TracingSink`] turns them into `tracing`
//! events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of one download attempt
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationRecord {
    /// The URL that was fetched (enhanced)
    pub url: String,
    /// Key of the spec the image was loaded under
    pub spec_key: String,
    /// HTTP status code, 0 if no response was received
    pub status_code: u16,
    /// Wall-clock time from request start to the end of the transfer
    pub elapsed_ms: u64,
    /// Bytes written to the cache file
    pub bytes: u64,
    /// Error description for failed attempts
    pub error: Option<String>,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
}

/// Receives operation records from download workers
pub trait OperationSink: Send + Sync {
    /// Record a finished download attempt; must not block
    fn record(&self, op: &OperationRecord);
}

/// [`OperationSink`] emitting one structured `tracing` event per record
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl OperationSink for TracingSink {
    fn record(&self, op: &OperationRecord) {
        match op.error {
            Some(ref error) => tracing::warn!(
                url = %op.url,
                spec_key = %op.spec_key,
                status_code = op.status_code,
                elapsed_ms = op.elapsed_ms,
                bytes = op.bytes,
                error = %error,
                "Image download failed"
            ),
            None => tracing::info!(
                url = %op.url,
                spec_key = %op.spec_key,
                status_code = op.status_code,
                elapsed_ms = op.elapsed_ms,
                bytes = op.bytes,
                "Image downloaded"
            ),
        }
    }
}

/// [`OperationSink`] that keeps every record in memory
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<OperationRecord>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records received so far
    pub fn records(&self) -> Vec<OperationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OperationSink for MemorySink {
    fn record(&self, op: &OperationRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op.clone());
    }
}
