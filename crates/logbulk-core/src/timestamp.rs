//! Timestamp extraction from decoded fields.
//!
//! Three input shapes are accepted, chosen by the shape of the string:
//!
//! * integer milliseconds since the epoch: anything shorter than `YYYY-MM-DD`
//!   or without `-` at byte offset 4
//! * a calendar date, exactly `YYYY-MM-DD` (midnight UTC)
//! * an RFC 3339 date-time

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::TimestampError;
use crate::field::Field;

const DATE_LEN: usize = "YYYY-MM-DD".len();
const YEAR_LEN: usize = "YYYY".len();
const NANOS_PER_MILLI: i64 = 1_000_000;

/// Largest millisecond value that survives the conversion to nanoseconds.
pub const MAX_TIMESTAMP_MILLIS: i64 = i64::MAX / NANOS_PER_MILLI;
/// Smallest millisecond value that survives the conversion to nanoseconds.
pub const MIN_TIMESTAMP_MILLIS: i64 = i64::MIN / NANOS_PER_MILLI;

/// Find `time_field` in `fields`, parse it and remove it from the list.
///
/// Only the first matching field is consulted. When no field matches, the
/// current wall-clock time is returned and `fields` is left untouched.
pub fn extract_timestamp(time_field: &str, fields: &mut Vec<Field>) -> Result<i64, TimestampError> {
    let Some(idx) = fields.iter().position(|f| f.name == time_field) else {
        return Ok(now_nanos());
    };
    let timestamp = parse_bulk_timestamp(&fields[idx].value)?;
    fields.remove(idx);
    Ok(timestamp)
}

/// Parse a timestamp value into nanoseconds since the Unix epoch.
pub fn parse_bulk_timestamp(s: &str) -> Result<i64, TimestampError> {
    if s.len() < DATE_LEN || s.as_bytes()[YEAR_LEN] != b'-' {
        return parse_millis(s);
    }
    if s.len() == DATE_LEN {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| TimestampError::Date {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        return date
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_utc().timestamp_nanos_opt())
            .ok_or_else(|| TimestampError::OutOfRange {
                value: s.to_string(),
            });
    }
    // Only an uppercase 'T' separates date and time; chrono would also take ' ' and 't'
    if s.as_bytes()[DATE_LEN] != b'T' {
        return Err(TimestampError::Rfc3339 {
            value: s.to_string(),
            reason: "expected 'T' between date and time".to_string(),
        });
    }
    let t = DateTime::parse_from_rfc3339(s).map_err(|e| TimestampError::Rfc3339 {
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    t.timestamp_nanos_opt()
        .ok_or_else(|| TimestampError::OutOfRange {
            value: s.to_string(),
        })
}

fn parse_millis(s: &str) -> Result<i64, TimestampError> {
    let n = s.parse::<i64>().map_err(|e| TimestampError::Millis {
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    if n > MAX_TIMESTAMP_MILLIS {
        return Err(TimestampError::TooBig {
            value: n,
            max: MAX_TIMESTAMP_MILLIS,
        });
    }
    if n < MIN_TIMESTAMP_MILLIS {
        return Err(TimestampError::TooSmall {
            value: n,
            min: MIN_TIMESTAMP_MILLIS,
        });
    }
    Ok(n * NANOS_PER_MILLI)
}

pub(crate) fn now_nanos() -> i64 {
    // Wall clock stays inside the i64 nanosecond range until 2262.
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
