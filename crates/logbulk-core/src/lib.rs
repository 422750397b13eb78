//! logbulk-core - streaming Elasticsearch bulk ingestion
//!
//! Turns a (possibly compressed) bulk request body into tenant-scoped log
//! rows and hands full batches to a [`RowStorage`].
//!
//! The pipeline is synchronous and built on [`std::io::Read`]; async hosts run
//! it on a blocking thread. Memory per request is bounded by the configured
//! line size and the batch threshold, never by the body size.

pub mod bulk;
pub mod counters;
pub mod decompress;
pub mod document;
pub mod error;
pub mod field;
pub mod ingest;
pub mod limiter;
pub mod pool;
pub mod remap;
pub mod rows;
pub mod scanner;
pub mod storage;
pub mod timestamp;

pub use bulk::{
    read_bulk_request, BatchProcessor, BulkResources, DebugDropProcessor, DebugTarget,
    LineOptions, RowDisposition, RowProcessor,
};
pub use counters::{IngestMetrics, MetricsSnapshot, RowCounters};
pub use decompress::{ContentEncoding, UnsupportedEncoding};
pub use document::DocumentParser;
pub use error::{
    BulkError, BulkReadError, DocumentError, ScanError, StorageError, TenantError, TimestampError,
};
pub use field::{Field, TenantId, DEFAULT_TIME_FIELD, MESSAGE_FIELD};
pub use ingest::{BulkIngestor, BulkRequest, BulkSummary, IngestSettings, DEFAULT_MAX_LINE_SIZE};
pub use limiter::{ConcurrencyLimiter, LimitedReader};
pub use pool::{Pool, Pooled, Reset};
pub use rows::{format_timestamp, LogRows, Row, DEFAULT_MAX_ROWS};
pub use storage::{AcceptedBatch, MemoryStorage, RowStorage};
pub use timestamp::{extract_timestamp, parse_bulk_timestamp};
