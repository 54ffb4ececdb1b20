//! Storage layer for the retouch credit ledger.
//!
//! This crate persists per-device balance records, processed billing event ids, and
//! completed generations.
//!
//! # Atomicity
//!
//! Every method that changes a balance is one atomic read-modify-write of a single
//! record (or, for transfers, of both records together). Callers never hold a lock
//! across calls; concurrent writers are reconciled inside the store.
//!
//! Billing-event writes carry a [`ProcessedEvent`] claim. The claim is checked and
//! recorded in the same atomic write as the balance change, so an event id is
//! applied at most once no matter how deliveries interleave.
//!
//! # Example
//!
//! ```no_run
//! use retouch_core::{BalanceUpdate, DeviceId};
//! use retouch_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/retouch-db").unwrap();
//!
//! let device_id = DeviceId::parse("device-1").unwrap();
//! store.update_balance(&device_id, &BalanceUpdate::top_up(100), true, None).unwrap();
//!
//! let record = store.get_balance(&device_id).unwrap().unwrap();
//! assert_eq!(record.extra_credits, 100);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use retouch_core::{BalanceRecord, BalanceUpdate, CreditBalance, Debit, DeviceId, GenerationRecord};

/// Result of [`Store::upsert_device`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No record existed; the seed was inserted as-is.
    Inserted(BalanceRecord),
    /// A record existed; only its device metadata and `updated_at` changed.
    Updated(BalanceRecord),
}

impl UpsertOutcome {
    /// The record as stored after the write.
    #[must_use]
    pub fn record(&self) -> &BalanceRecord {
        match self {
            Self::Inserted(record) | Self::Updated(record) => record,
        }
    }
}

/// Result of [`Store::update_balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// An existing record was updated.
    Updated,
    /// No record existed and one was created.
    Inserted,
    /// No record existed and upsert was not requested; nothing was written.
    NotFound,
    /// The claimed event id was already recorded; nothing was written.
    Duplicate,
}

/// Result of [`Store::transfer_balance`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Both records were written. Holds the destination as stored.
    Transferred(BalanceRecord),
    /// The source record does not exist; nothing was written.
    SourceNotFound,
    /// The claimed event id was already recorded; nothing was written.
    Duplicate,
}

/// Claim on a billing event id, recorded together with the write that applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Provider event id.
    pub event_id: String,
    /// Provider event type.
    pub event_type: String,
    /// When it was applied.
    pub processed_at: DateTime<Utc>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (`RocksDB` for production, in-memory for tests and local development).
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Get a balance record by device ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, device_id: &DeviceId) -> Result<Option<BalanceRecord>>;

    /// Insert `seed` if no record exists for its device; otherwise overwrite only the
    /// device metadata and `updated_at`, leaving every balance field untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_device(&self, seed: &BalanceRecord) -> Result<UpsertOutcome>;

    /// Apply `debit` only if the record's pools still equal `expected`.
    ///
    /// Returns `false` when nothing matched (pools changed, record missing, or the
    /// debit would drive a pool negative). On success `total_credits_spent` grows by
    /// the debit amount in the same write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn compare_and_deduct(
        &self,
        device_id: &DeviceId,
        expected: &CreditBalance,
        debit: &Debit,
    ) -> Result<bool>;

    /// Apply an unconditional update. With `upsert`, a missing record is created
    /// from [`BalanceRecord::new`] before the update is applied.
    ///
    /// With a `claim`, the write only happens if the claim's event id has not been
    /// recorded yet, and the id is recorded in the same atomic write. A claimed id
    /// yields [`WriteOutcome::Duplicate`]. Nothing is recorded when nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Neither the balance nor the
    /// claim is written in that case.
    fn update_balance(
        &self,
        device_id: &DeviceId,
        update: &BalanceUpdate,
        upsert: bool,
        claim: Option<&ProcessedEvent>,
    ) -> Result<WriteOutcome>;

    /// Copy the source's pools and subscription onto the destination (created if
    /// missing) and stamp both sides, as one atomic write.
    ///
    /// `from` and `to` must be different devices. `claim` behaves as in
    /// [`Store::update_balance`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn transfer_balance(
        &self,
        from: &DeviceId,
        to: &DeviceId,
        claim: Option<&ProcessedEvent>,
    ) -> Result<TransferOutcome>;

    // =========================================================================
    // Generation Operations
    // =========================================================================

    /// Insert a generation record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_generation(&self, record: &GenerationRecord) -> Result<()>;
}

/// Debit `record` in place if its pools equal `expected` and stay non-negative.
pub(crate) fn conditional_debit(
    record: &mut BalanceRecord,
    expected: &CreditBalance,
    debit: &Debit,
    now: DateTime<Utc>,
) -> bool {
    if record.credits() != *expected {
        return false;
    }
    let after = expected.after(debit);
    if after.subscription_credits < 0 || after.extra_credits < 0 {
        return false;
    }
    record.apply_debit(debit, now);
    true
}

/// Apply both sides of a transfer. Returns the updated `(source, destination)`.
pub(crate) fn apply_transfer(
    mut source: BalanceRecord,
    destination: Option<BalanceRecord>,
    to: &DeviceId,
    now: DateTime<Utc>,
) -> (BalanceRecord, BalanceRecord) {
    let mut destination = destination.unwrap_or_else(|| BalanceRecord::new(to.clone(), now));
    destination.apply(&BalanceUpdate::transfer_in(&source), now);
    source.apply(&BalanceUpdate::transfer_out(to), now);
    (source, destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_debit_requires_matching_pools() {
        let now = Utc::now();
        let mut record = BalanceRecord::new(DeviceId::parse("d").unwrap(), now);
        record.subscription_credits = 2;
        let debit = Debit {
            from_subscription: 1,
            from_extra: 0,
        };

        assert!(!conditional_debit(
            &mut record,
            &CreditBalance::new(3, 0),
            &debit,
            now
        ));
        assert_eq!(record.subscription_credits, 2);

        assert!(conditional_debit(
            &mut record,
            &CreditBalance::new(2, 0),
            &debit,
            now
        ));
        assert_eq!(record.subscription_credits, 1);
        assert_eq!(record.total_credits_spent, 1);
    }

    #[test]
    fn conditional_debit_never_goes_negative() {
        let now = Utc::now();
        let mut record = BalanceRecord::new(DeviceId::parse("d").unwrap(), now);
        let debit = Debit {
            from_subscription: 0,
            from_extra: 1,
        };
        assert!(!conditional_debit(
            &mut record,
            &CreditBalance::new(0, 0),
            &debit,
            now
        ));
        assert_eq!(record.extra_credits, 0);
    }
}
