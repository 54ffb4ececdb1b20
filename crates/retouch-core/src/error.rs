//! Error types for the retouch ledger.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in ledger, onboarding, and billing-event operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Missing or malformed required input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced device has no balance record.
    #[error("device not found: {device_id}")]
    DeviceNotFound {
        /// The device ID that was not found.
        device_id: String,
    },

    /// Balance is below the amount required.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Subscription plus extra credits at the time of the check.
        available: i64,
        /// Required amount.
        required: i64,
    },

    /// The conditional deduction lost a race with another writer.
    #[error("deduction failed due to a concurrent request: {device_id}")]
    ConcurrentModification {
        /// The device whose balance changed underneath us.
        device_id: String,
    },

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream provider failure (image generation).
    #[error("upstream error: {service} - {message}")]
    Upstream {
        /// The service that failed.
        service: String,
        /// Error message.
        message: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BillingError {
    /// Whether the caller may retry the whole read-check-write cycle.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
