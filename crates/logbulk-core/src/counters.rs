//! Ingestion counters and their amortised checkpointing.
//!
//! [`IngestMetrics`] is shared by all requests and mirrors every update to the
//! `metrics` facade. [`RowCounters`] is per request and only pushes its totals
//! every [`CHECKPOINT_ROWS`] rows, plus once at the end of the stream.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

/// Rows between two checkpoints.
pub const CHECKPOINT_ROWS: u64 = 1000;

#[derive(Debug, Default)]
pub struct IngestMetrics {
    bulk_requests: AtomicU64,
    rows_ingested: AtomicU64,
    rows_dropped: AtomicU64,
    decode_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bulk_requests: u64,
    pub rows_ingested: u64,
    pub rows_dropped: u64,
    pub decode_errors: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_bulk_requests(&self) {
        self.bulk_requests.fetch_add(1, Ordering::Relaxed);
        counter!("bulk.requests", 1);
    }

    pub fn add_rows_ingested(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.rows_ingested.fetch_add(n, Ordering::Relaxed);
        counter!("bulk.rows.ingested", n);
    }

    pub fn add_rows_dropped(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.rows_dropped.fetch_add(n, Ordering::Relaxed);
        counter!("bulk.rows.dropped", n, "reason" => "debug");
    }

    pub fn inc_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        counter!("bulk.decode.errors", 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bulk_requests: self.bulk_requests.load(Ordering::Relaxed),
            rows_ingested: self.rows_ingested.load(Ordering::Relaxed),
            rows_dropped: self.rows_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Per-request row tallies with amortised publication.
#[derive(Debug, Default)]
pub struct RowCounters {
    ingested: u64,
    dropped: u64,
    ingested_checkpoint: u64,
    dropped_checkpoint: u64,
}

impl RowCounters {
    pub fn record_ingested(&mut self, metrics: &IngestMetrics) {
        self.ingested += 1;
        self.maybe_checkpoint(metrics);
    }

    pub fn record_dropped(&mut self, metrics: &IngestMetrics) {
        self.dropped += 1;
        self.maybe_checkpoint(metrics);
    }

    /// Publish everything since the last checkpoint.
    pub fn checkpoint(&mut self, metrics: &IngestMetrics) {
        metrics.add_rows_ingested(self.ingested - self.ingested_checkpoint);
        metrics.add_rows_dropped(self.dropped - self.dropped_checkpoint);
        self.ingested_checkpoint = self.ingested;
        self.dropped_checkpoint = self.dropped;
    }

    fn pending(&self) -> u64 {
        (self.ingested - self.ingested_checkpoint) + (self.dropped - self.dropped_checkpoint)
    }

    fn maybe_checkpoint(&mut self, metrics: &IngestMetrics) {
        if self.pending() >= CHECKPOINT_ROWS {
            self.checkpoint(metrics);
        }
    }
}
