//! Partition path generation for time-based organization
//!
//! Generates Hive-style partition paths:
//! logs/{account}-{project}/year={year}/month={month}/day={day}/hour={hour}/{timestamp}-{hash}.jsonl

use chrono::{DateTime, Datelike, Timelike};
use logbulk_core::TenantId;

/// Generate the object path for one accepted batch.
///
/// `timestamp_nanos` is the smallest row timestamp of the batch and selects
/// the hour partition. Only the first 16 hex characters of `hash_hex` are used.
pub fn generate_partition_path(tenant: TenantId, timestamp_nanos: i64, hash_hex: &str) -> String {
    let dt = DateTime::from_timestamp_nanos(timestamp_nanos);

    // Use hash prefix for deterministic idempotent filenames
    let hash_prefix = hash_hex.get(..16).unwrap_or(hash_hex);

    format!(
        "logs/{}-{}/year={}/month={:02}/day={:02}/hour={:02}/{}-{}.jsonl",
        tenant.account_id,
        tenant.project_id,
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        timestamp_nanos,
        hash_prefix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_partition_path() {
        // 2024-01-15 14:30:00 UTC in nanoseconds
        let timestamp_nanos = 1_705_327_800_000_000_000;

        let path = generate_partition_path(
            TenantId::new(3, 7),
            timestamp_nanos,
            "deadbeefdeadbeefdeadbeefdeadbeef",
        );

        assert_eq!(
            path,
            "logs/3-7/year=2024/month=01/day=15/hour=14/1705327800000000000-deadbeefdeadbeef.jsonl"
        );
    }

    #[test]
    fn test_short_hash_is_kept_whole() {
        let path = generate_partition_path(TenantId::default(), 0, "abc");
        assert_eq!(path, "logs/0-0/year=1970/month=01/day=01/hour=00/0-abc.jsonl");
    }
}
