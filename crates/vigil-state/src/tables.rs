//! redb table definitions for the Vigil state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Endpoint configurations keyed by `{endpoint_id}`.
pub const ENDPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");

/// Per-endpoint runtime state keyed by `{endpoint_id}`.
pub const RUNTIME: TableDefinition<&str, &[u8]> = TableDefinition::new("runtime");

/// Check results keyed by `{endpoint_id}/{checked_at_ms:020}-{n:04}`.
pub const CHECK_RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("check_results");
