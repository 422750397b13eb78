//! Per-request orchestration of the bulk pipeline.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::bulk::{
    read_bulk_request, BatchProcessor, BulkResources, DebugDropProcessor, DebugTarget,
    LineOptions, RowProcessor,
};
use crate::counters::IngestMetrics;
use crate::decompress::ContentEncoding;
use crate::document::DocumentParser;
use crate::error::{BulkError, BulkReadError, StorageError};
use crate::field::TenantId;
use crate::limiter::ConcurrencyLimiter;
use crate::pool::Pool;
use crate::rows::{LogRows, DEFAULT_MAX_ROWS};
use crate::storage::RowStorage;

/// Default maximum size of a single line.
pub const DEFAULT_MAX_LINE_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub max_line_size: usize,
    /// Batch flush threshold in rows.
    pub max_rows: usize,
    /// Idle objects kept per pool.
    pub pool_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            max_rows: DEFAULT_MAX_ROWS,
            pool_size: 64,
        }
    }
}

/// Everything the HTTP layer extracts from one bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkRequest {
    pub tenant: TenantId,
    pub options: LineOptions,
    pub stream_fields: Vec<String>,
    pub ignore_fields: Vec<String>,
    pub encoding: ContentEncoding,
    /// Set when the request asked for `debug`; rows are logged and dropped.
    pub debug: Option<DebugTarget>,
}

/// Outcome of one request. `error` is set when decoding stopped early.
#[derive(Debug)]
pub struct BulkSummary {
    pub rows: usize,
    pub took: Duration,
    pub error: Option<BulkReadError>,
}

pub struct BulkIngestor {
    settings: IngestSettings,
    storage: Arc<dyn RowStorage>,
    limiter: Arc<ConcurrencyLimiter>,
    metrics: Arc<IngestMetrics>,
    line_buffers: Pool<Vec<u8>>,
    parsers: Pool<DocumentParser>,
    log_rows: Pool<LogRows>,
}

impl BulkIngestor {
    pub fn new(
        settings: IngestSettings,
        storage: Arc<dyn RowStorage>,
        limiter: Arc<ConcurrencyLimiter>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        let pool_size = settings.pool_size;
        Self {
            settings,
            storage,
            limiter,
            metrics,
            line_buffers: Pool::new(pool_size, Vec::new),
            parsers: Pool::new(pool_size, DocumentParser::new),
            log_rows: Pool::new(pool_size, LogRows::default),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Run one bulk body through the pipeline.
    ///
    /// Runs on a blocking thread: reads and storage writes block. Rows decoded
    /// before a malformed line are still flushed; the decode error is reported
    /// inside the summary. A storage failure aborts the request and is
    /// returned as `Err`.
    pub fn ingest<R>(&self, body: R, request: &BulkRequest) -> Result<BulkSummary, StorageError>
    where
        R: Read + Send,
    {
        let start = Instant::now();
        self.metrics.inc_bulk_requests();

        let mut rows = self.log_rows.get();
        rows.configure(
            request.tenant,
            request.stream_fields.clone(),
            request.ignore_fields.clone(),
            self.settings.max_rows,
        );

        let resources = BulkResources {
            limiter: &self.limiter,
            line_buffers: &self.line_buffers,
            parsers: &self.parsers,
            metrics: &self.metrics,
            max_line_size: self.settings.max_line_size,
        };

        let result = match &request.debug {
            Some(target) => {
                let mut processor = DebugDropProcessor::new(&mut rows, target);
                read(body, request, &resources, &mut processor)
            }
            None => {
                let mut processor = BatchProcessor::new(&mut rows, self.storage.as_ref());
                let result = read(body, request, &resources, &mut processor);
                // Final flush runs after decode errors too, so rows read before a
                // malformed line are kept.
                let storage_failed = matches!(
                    &result,
                    Err(BulkReadError {
                        source: BulkError::Storage(_),
                        ..
                    })
                );
                if !storage_failed {
                    processor.flush()?;
                }
                result
            }
        };

        let (rows_read, error) = match result {
            Ok(n) => (n, None),
            Err(BulkReadError {
                source: BulkError::Storage(e),
                ..
            }) => return Err(e),
            Err(e) => {
                self.metrics.inc_decode_errors();
                warn!(
                    tenant = %request.tenant,
                    row = e.failed_row(),
                    rows_processed = e.rows,
                    error = %e.source,
                    "cannot decode log message in bulk request"
                );
                (e.rows, Some(e))
            }
        };

        let took = start.elapsed();
        debug!(
            tenant = %request.tenant,
            rows = rows_read,
            elapsed_us = took.as_micros() as u64,
            "bulk request processed"
        );
        Ok(BulkSummary {
            rows: rows_read,
            took,
            error,
        })
    }
}

fn read<R: Read + Send>(
    body: R,
    request: &BulkRequest,
    resources: &BulkResources<'_>,
    processor: &mut dyn RowProcessor,
) -> Result<usize, BulkReadError> {
    read_bulk_request(body, request.encoding, &request.options, resources, processor)
}
