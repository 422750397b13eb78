//! Per-request row accumulation.
//!
//! A [`LogRows`] belongs to exactly one tenant for its lifetime and carries the
//! stream/ignore field configuration that the storage layer needs. Rows keep
//! the field order produced by the document decoder.

use std::io;

use chrono::{DateTime, SecondsFormat};
use serde::ser::{SerializeMap, Serializer as _};

use crate::field::{Field, TenantId};
use crate::pool::Reset;

/// Default flush threshold in rows.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub tenant: TenantId,
    pub timestamp_nanos: i64,
    pub fields: Vec<Field>,
}

#[derive(Debug)]
pub struct LogRows {
    tenant: TenantId,
    stream_fields: Vec<String>,
    ignore_fields: Vec<String>,
    max_rows: usize,
    rows: Vec<Row>,
}

impl Default for LogRows {
    fn default() -> Self {
        Self {
            tenant: TenantId::default(),
            stream_fields: Vec::new(),
            ignore_fields: Vec::new(),
            max_rows: DEFAULT_MAX_ROWS,
            rows: Vec::new(),
        }
    }
}

impl LogRows {
    pub fn new(
        tenant: TenantId,
        stream_fields: Vec<String>,
        ignore_fields: Vec<String>,
        max_rows: usize,
    ) -> Self {
        let mut rows = Self::default();
        rows.configure(tenant, stream_fields, ignore_fields, max_rows);
        rows
    }

    /// Set the per-request configuration. Existing rows are discarded.
    pub fn configure(
        &mut self,
        tenant: TenantId,
        stream_fields: Vec<String>,
        ignore_fields: Vec<String>,
        max_rows: usize,
    ) {
        self.rows.clear();
        self.tenant = tenant;
        self.stream_fields = stream_fields;
        self.ignore_fields = ignore_fields;
        self.max_rows = max_rows.max(1);
    }

    /// Append one row, skipping fields listed in `ignore_fields`.
    pub fn append(&mut self, timestamp_nanos: i64, fields: &[Field]) {
        let fields = fields
            .iter()
            .filter(|f| !self.ignore_fields.iter().any(|name| *name == f.name))
            .cloned()
            .collect();
        self.rows.push(Row {
            tenant: self.tenant,
            timestamp_nanos,
            fields,
        });
    }

    pub fn needs_flush(&self) -> bool {
        self.rows.len() >= self.max_rows
    }

    /// Drop the rows, keep tenant and field configuration.
    pub fn reset_keep_settings(&mut self) {
        self.rows.clear();
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn stream_fields(&self) -> &[String] {
        &self.stream_fields
    }

    pub fn ignore_fields(&self) -> &[String] {
        &self.ignore_fields
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Smallest row timestamp, if any.
    pub fn min_timestamp(&self) -> Option<i64> {
        self.rows.iter().map(|r| r.timestamp_nanos).min()
    }

    /// Write one row as a JSON object: its fields in order, then `_stream`
    /// and `_time`. Fields sharing a name are all emitted.
    pub fn write_row_json<W: io::Write>(&self, idx: usize, writer: W) -> serde_json::Result<bool> {
        let Some(row) = self.rows.get(idx) else {
            return Ok(false);
        };
        let mut ser = serde_json::Serializer::new(writer);
        let mut map = (&mut ser).serialize_map(Some(row.fields.len() + 2))?;
        for f in &row.fields {
            map.serialize_entry(&f.name, &f.value)?;
        }
        map.serialize_entry("_stream", &self.stream_tags(row))?;
        map.serialize_entry("_time", &format_timestamp(row.timestamp_nanos))?;
        map.end()?;
        Ok(true)
    }

    /// Human-readable rendering of one row, used by the debug path.
    pub fn row_string(&self, idx: usize) -> Option<String> {
        let mut out = Vec::new();
        match self.write_row_json(idx, &mut out) {
            Ok(true) => String::from_utf8(out).ok(),
            _ => None,
        }
    }

    fn stream_tags(&self, row: &Row) -> String {
        let mut out = String::from("{");
        let mut first = true;
        for name in &self.stream_fields {
            let Some(field) = row.fields.iter().find(|f| f.name == *name) else {
                continue;
            };
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(name);
            out.push('=');
            // Debug formatting yields a quoted, escaped value.
            out.push_str(&format!("{:?}", field.value));
        }
        out.push('}');
        out
    }
}

impl Reset for LogRows {
    fn reset(&mut self) {
        self.configure(
            TenantId::default(),
            Vec::new(),
            Vec::new(),
            DEFAULT_MAX_ROWS,
        );
    }
}

/// RFC 3339 with nanoseconds in UTC.
pub fn format_timestamp(timestamp_nanos: i64) -> String {
    DateTime::from_timestamp_nanos(timestamp_nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
