//! Bulk protocol decoding.
//!
//! A bulk body is a sequence of line pairs: an action line containing the
//! `"create"` or `"index"` verb, followed by the JSON document to ingest.
//! Blank lines between records are skipped. End of stream between records is
//! a clean finish; end of stream after an action line is
//! [`BulkError::MissingDocument`].

use std::io::Read;

use tracing::info;

use crate::counters::{IngestMetrics, RowCounters};
use crate::decompress::ContentEncoding;
use crate::document::DocumentParser;
use crate::error::{BulkError, BulkReadError, StorageError};
use crate::field::{Field, DEFAULT_TIME_FIELD};
use crate::limiter::{ConcurrencyLimiter, LimitedReader};
use crate::pool::Pool;
use crate::remap::remap_message_field;
use crate::rows::LogRows;
use crate::scanner::LineScanner;
use crate::storage::RowStorage;
use crate::timestamp::extract_timestamp;

const COMMAND_LINE: &str = "\"create\" or \"index\" command";
const DOCUMENT_LINE: &str = "log message";

/// Field-level options for one bulk request.
#[derive(Debug, Clone)]
pub struct LineOptions {
    pub time_field: String,
    /// Renamed to `_msg` when non-empty.
    pub msg_field: String,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            time_field: DEFAULT_TIME_FIELD.to_string(),
            msg_field: String::new(),
        }
    }
}

/// Shared, process-wide collaborators used while reading a request.
#[derive(Clone, Copy)]
pub struct BulkResources<'a> {
    pub limiter: &'a ConcurrencyLimiter,
    pub line_buffers: &'a Pool<Vec<u8>>,
    pub parsers: &'a Pool<DocumentParser>,
    pub metrics: &'a IngestMetrics,
    pub max_line_size: usize,
}

/// What a [`RowProcessor`] did with a decoded row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDisposition {
    Accepted,
    Dropped,
}

/// Destination for decoded rows.
pub trait RowProcessor {
    fn process(
        &mut self,
        timestamp_nanos: i64,
        fields: &[Field],
    ) -> Result<RowDisposition, StorageError>;
}

/// Accumulates rows and hands full batches to storage.
pub struct BatchProcessor<'a> {
    rows: &'a mut LogRows,
    storage: &'a dyn RowStorage,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(rows: &'a mut LogRows, storage: &'a dyn RowStorage) -> Self {
        Self { rows, storage }
    }

    /// Send pending rows to storage. Empty batches are not sent.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        self.storage.accept(self.rows)?;
        self.rows.reset_keep_settings();
        Ok(())
    }
}

impl RowProcessor for BatchProcessor<'_> {
    fn process(
        &mut self,
        timestamp_nanos: i64,
        fields: &[Field],
    ) -> Result<RowDisposition, StorageError> {
        self.rows.append(timestamp_nanos, fields);
        if self.rows.needs_flush() {
            self.flush()?;
        }
        Ok(RowDisposition::Accepted)
    }
}

/// Where a debug request came from, for the drop log line.
#[derive(Debug, Clone, Default)]
pub struct DebugTarget {
    pub remote_addr: String,
    pub request_uri: String,
}

/// Logs each row and discards it.
pub struct DebugDropProcessor<'a> {
    scratch: &'a mut LogRows,
    target: &'a DebugTarget,
}

impl<'a> DebugDropProcessor<'a> {
    /// `scratch` supplies the stream/ignore configuration used for rendering.
    pub fn new(scratch: &'a mut LogRows, target: &'a DebugTarget) -> Self {
        Self { scratch, target }
    }
}

impl RowProcessor for DebugDropProcessor<'_> {
    fn process(
        &mut self,
        timestamp_nanos: i64,
        fields: &[Field],
    ) -> Result<RowDisposition, StorageError> {
        self.scratch.append(timestamp_nanos, fields);
        let row = self.scratch.row_string(0).unwrap_or_default();
        self.scratch.reset_keep_settings();
        info!(
            remote_addr = %self.target.remote_addr,
            request_uri = %self.target.request_uri,
            "ignoring log entry because of `debug` query arg: {}",
            row
        );
        Ok(RowDisposition::Dropped)
    }
}

/// Decode a whole bulk body, feeding every row to `processor`.
///
/// Returns the number of decoded line pairs. On failure the count of pairs
/// decoded before the failing one is carried in the error; rows already handed
/// to `processor` stay there.
pub fn read_bulk_request<R>(
    reader: R,
    encoding: ContentEncoding,
    options: &LineOptions,
    resources: &BulkResources<'_>,
    processor: &mut dyn RowProcessor,
) -> Result<usize, BulkReadError>
where
    R: Read + Send,
{
    let reader = encoding.wrap(reader).map_err(|e| BulkReadError {
        rows: 0,
        source: BulkError::Io(e),
    })?;
    let limited = LimitedReader::new(reader, resources.limiter);

    let mut line_buf = resources.line_buffers.get();
    line_buf.resize(resources.max_line_size.max(1), 0);
    let mut scanner = LineScanner::new(limited, &mut line_buf[..]);
    let mut parser = resources.parsers.get();

    let mut counters = RowCounters::default();
    let mut rows = 0usize;
    loop {
        let result = read_bulk_line(&mut scanner, &mut parser, options, processor);
        scanner.get_mut().release_unit();
        match result {
            Ok(Some(disposition)) => {
                rows += 1;
                match disposition {
                    RowDisposition::Accepted => counters.record_ingested(resources.metrics),
                    RowDisposition::Dropped => counters.record_dropped(resources.metrics),
                }
            }
            Ok(None) => {
                counters.checkpoint(resources.metrics);
                return Ok(rows);
            }
            Err(source) => {
                counters.checkpoint(resources.metrics);
                return Err(BulkReadError { rows, source });
            }
        }
    }
}

/// Read one line pair. `Ok(None)` means the stream ended between records.
fn read_bulk_line<R: Read>(
    scanner: &mut LineScanner<'_, R>,
    parser: &mut DocumentParser,
    options: &LineOptions,
    processor: &mut dyn RowProcessor,
) -> Result<Option<RowDisposition>, BulkError> {
    loop {
        let line = scanner
            .next_line()
            .map_err(|e| BulkError::from_scan(e, COMMAND_LINE))?;
        match line {
            None => return Ok(None),
            Some([]) => continue,
            Some(line) if is_bulk_command(line) => break,
            Some(line) => {
                return Err(BulkError::UnexpectedCommand(
                    String::from_utf8_lossy(line).into_owned(),
                ))
            }
        }
    }

    let line = scanner
        .next_line()
        .map_err(|e| BulkError::from_scan(e, DOCUMENT_LINE))?
        .ok_or(BulkError::MissingDocument)?;
    let fields = parser.parse(line)?;
    let timestamp = extract_timestamp(&options.time_field, fields)?;
    remap_message_field(&options.msg_field, fields);
    let disposition = processor.process(timestamp, fields)?;
    Ok(Some(disposition))
}

/// Raw substring check; the rest of the action line is ignored.
fn is_bulk_command(line: &[u8]) -> bool {
    contains(line, b"\"create\"") || contains(line, b"\"index\"")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
