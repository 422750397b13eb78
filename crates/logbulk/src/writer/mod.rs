//! Object-store accept path.
//!
//! Every accepted batch becomes one newline-delimited JSON object. The object
//! name embeds a content hash, so re-sending the same batch overwrites the
//! same object instead of duplicating rows.

mod partition;

use std::time::Instant;

use logbulk_core::{LogRows, RowStorage, StorageError};
use metrics::{counter, histogram};
use opendal::Operator;
use tokio::runtime::Handle;
use tracing::debug;

pub use partition::generate_partition_path;

/// [`RowStorage`] backed by an OpenDAL operator.
///
/// `accept` is called from blocking ingestion workers and drives the async
/// write on the captured runtime handle. It must not be called from inside an
/// async task.
#[derive(Clone)]
pub struct ObjectStoreWriter {
    operator: Operator,
    handle: Handle,
}

impl ObjectStoreWriter {
    pub fn new(operator: Operator, handle: Handle) -> Self {
        Self { operator, handle }
    }
}

impl RowStorage for ObjectStoreWriter {
    fn accept(&self, rows: &LogRows) -> Result<(), StorageError> {
        let Some(first_ts) = rows.min_timestamp() else {
            return Ok(());
        };

        let start = Instant::now();
        let payload = encode_rows(rows);
        let hash = blake3::hash(&payload);
        let path = generate_partition_path(rows.tenant(), first_ts, &hash.to_hex());
        let bytes = payload.len();

        self.handle
            .block_on(self.operator.write(&path, payload))
            .map_err(|e| StorageError {
                tenant: rows.tenant().to_string(),
                rows: rows.len(),
                message: format!("failed to write {}: {}", path, e),
            })?;

        counter!("storage.batches.written", 1);
        histogram!("storage.batch.bytes", bytes as f64);
        debug!(
            path = %path,
            tenant = %rows.tenant(),
            rows = rows.len(),
            bytes,
            elapsed_us = start.elapsed().as_micros() as u64,
            "wrote batch"
        );
        Ok(())
    }
}

/// One JSON object per row, newline-terminated.
pub(crate) fn encode_rows(rows: &LogRows) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * 128);
    for idx in 0..rows.len() {
        // Writing into a Vec cannot fail
        if rows.write_row_json(idx, &mut out).unwrap_or(false) {
            out.push(b'\n');
        }
    }
    out
}
