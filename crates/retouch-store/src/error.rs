//! Error types for retouch storage.

use retouch_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A per-record write kept conflicting and gave up.
    #[error("write contention on {key}")]
    Contention {
        /// The record key that could not be committed.
        key: String,
    },
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
