//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Balance records, keyed by `device_id`.
    pub const BALANCES: &str = "balances";

    /// Processed billing events for de-duplication, keyed by event id.
    pub const PROCESSED_EVENTS: &str = "processed_events";

    /// Completed generations, keyed by `generation_id` (ULID).
    pub const GENERATIONS: &str = "generations";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::BALANCES, cf::PROCESSED_EVENTS, cf::GENERATIONS]
}
