//! Row key encoding.

/// Size of an encoded row id.
pub const ID_SIZE: usize = 8;

/// Prefix for per-table sled trees.
const TABLE_PREFIX: &str = "table:";

/// Encode a row id as a big-endian key.
///
/// Big-endian encoding keeps lexicographic key order equal to numeric id
/// order, so table scans return rows oldest first.
pub fn encode_id(id: u64) -> [u8; ID_SIZE] {
    id.to_be_bytes()
}

/// Name of the sled tree holding a table.
pub fn tree_name(table: &str) -> String {
    format!("{TABLE_PREFIX}{table}")
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
