//! Storage accept path.

use parking_lot::Mutex;

use crate::error::StorageError;
use crate::field::TenantId;
use crate::rows::{LogRows, Row};

/// Durable sink for completed batches.
///
/// `accept` may block on downstream backpressure. It must either persist the
/// whole batch or none of it, and must tolerate repeated calls with disjoint
/// rows for the same tenant.
pub trait RowStorage: Send + Sync {
    fn accept(&self, rows: &LogRows) -> Result<(), StorageError>;
}

/// Snapshot of one accepted batch.
#[derive(Debug, Clone)]
pub struct AcceptedBatch {
    pub tenant: TenantId,
    pub stream_fields: Vec<String>,
    pub ignore_fields: Vec<String>,
    pub rows: Vec<Row>,
}

/// Keeps every accepted batch in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    batches: Mutex<Vec<AcceptedBatch>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<AcceptedBatch> {
        self.batches.lock().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn total_rows(&self) -> usize {
        self.batches.lock().iter().map(|b| b.rows.len()).sum()
    }

    /// All accepted rows in accept order.
    pub fn rows(&self) -> Vec<Row> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.rows.iter().cloned())
            .collect()
    }
}

impl RowStorage for MemoryStorage {
    fn accept(&self, rows: &LogRows) -> Result<(), StorageError> {
        let batch = AcceptedBatch {
            tenant: rows.tenant(),
            stream_fields: rows.stream_fields().to_vec(),
            ignore_fields: rows.ignore_fields().to_vec(),
            rows: rows.rows().to_vec(),
        };
        self.batches.lock().push(batch);
        Ok(())
    }
}
