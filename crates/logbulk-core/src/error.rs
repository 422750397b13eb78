//! Error types for the bulk-ingestion pipeline

use std::io;
use std::num::ParseIntError;

use thiserror::Error;

/// Invalid tenant header value.
#[derive(Debug, Error)]
#[error("cannot parse {header} header value {value:?}: {source}")]
pub struct TenantError {
    pub header: &'static str,
    pub value: String,
    #[source]
    pub source: ParseIntError,
}

/// Failure reported by the line scanner.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The line does not fit into the scanner buffer.
    #[error("line exceeds {limit} bytes")]
    TooLong { limit: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The document line is not a decodable JSON object.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expecting JSON object, got {kind}")]
    NotAnObject { kind: &'static str },
}

/// Time field present but its value cannot be turned into nanoseconds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("cannot parse timestamp in milliseconds from {value:?}: {reason}")]
    Millis { value: String, reason: String },

    #[error("too big timestamp in milliseconds: {value}; mustn't exceed {max}")]
    TooBig { value: i64, max: i64 },

    #[error("too small timestamp in milliseconds: {value}; must be bigger than {min}")]
    TooSmall { value: i64, min: i64 },

    #[error("cannot parse date {value:?}: {reason}")]
    Date { value: String, reason: String },

    #[error("cannot parse timestamp {value:?}: {reason}")]
    Rfc3339 { value: String, reason: String },

    #[error("timestamp {value:?} is outside the representable nanosecond range")]
    OutOfRange { value: String },
}

/// The storage accept path refused a batch.
#[derive(Debug, Error)]
#[error("cannot store {rows} rows for tenant {tenant}: {message}")]
pub struct StorageError {
    pub tenant: String,
    pub rows: usize,
    pub message: String,
}

/// Request-scoped, fatal reasons for stopping a bulk stream.
#[derive(Debug, Error)]
pub enum BulkError {
    /// Line longer than `insert.max_line_size_bytes`.
    #[error("cannot read {what}, since its size exceeds insert.max_line_size_bytes={limit}")]
    LineTooLong { what: &'static str, limit: usize },

    #[error("cannot read bulk request: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected command {0:?}; expecting \"create\" or \"index\"")]
    UnexpectedCommand(String),

    #[error("missing log message after the \"create\" or \"index\" command")]
    MissingDocument,

    #[error("cannot parse json-encoded log entry: {0}")]
    BadDocument(#[from] DocumentError),

    #[error("cannot parse timestamp: {0}")]
    BadTimestamp(#[from] TimestampError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BulkError {
    pub(crate) fn from_scan(err: ScanError, what: &'static str) -> Self {
        match err {
            ScanError::TooLong { limit } => BulkError::LineTooLong { what, limit },
            ScanError::Io(e) => BulkError::Io(e),
        }
    }
}

/// A bulk stream stopped early. `rows` line pairs were decoded before the failure.
#[derive(Debug, Error)]
#[error("cannot decode log message #{row} in bulk request: {source}", row = .rows + 1)]
pub struct BulkReadError {
    pub rows: usize,
    #[source]
    pub source: BulkError,
}

impl BulkReadError {
    /// 1-based index of the line pair that failed.
    pub fn failed_row(&self) -> usize {
        self.rows + 1
    }
}
