//! Credit ledger: balance reads and optimistic deductions.
//!
//! A deduction reads both pools, plans the split (subscription credits first), and
//! asks the store to apply it only if the pools are still what was read. Losing that
//! race surfaces as [`BillingError::ConcurrentModification`]; [`CreditLedger::deduct`]
//! never retries on its own.

use std::sync::Arc;

use serde::Serialize;

use retouch_core::{BillingError, CreditBalance, Debit, DeviceId, Result};
use retouch_store::Store;

/// Balance view returned by [`CreditLedger::read_balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerBalance {
    /// Subscription credits.
    pub subscription_credits: i64,
    /// Extra (top-up) credits.
    pub extra_credits: i64,
    /// Lifetime credits spent.
    pub total_credits_spent: i64,
}

/// A committed deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deduction {
    /// How the amount was split across the pools.
    pub debit: Debit,
    /// Pools after the deduction.
    pub balance: CreditBalance,
}

/// Reads and deducts per-device credit balances.
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
}

impl CreditLedger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Read a device's balance without mutating it.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if the device has no record, `Storage` on store failure.
    pub fn read_balance(&self, device_id: &DeviceId) -> Result<LedgerBalance> {
        let record = self
            .store
            .get_balance(device_id)?
            .ok_or_else(|| not_found(device_id))?;

        Ok(LedgerBalance {
            subscription_credits: record.subscription_credits,
            extra_credits: record.extra_credits,
            total_credits_spent: record.total_credits_spent,
        })
    }

    /// Check that `amount` credits are available without writing anything.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive amount, `DeviceNotFound`, `InsufficientCredits`,
    /// or `Storage`.
    pub fn ensure_available(&self, device_id: &DeviceId, amount: i64) -> Result<CreditBalance> {
        validate_amount(amount)?;
        let balance = self.current(device_id)?;
        if balance.total() < amount {
            return Err(BillingError::InsufficientCredits {
                available: balance.total(),
                required: amount,
            });
        }
        Ok(balance)
    }

    /// Deduct `amount` credits with a single compare-and-set attempt.
    ///
    /// # Errors
    ///
    /// `Validation`, `DeviceNotFound`, `InsufficientCredits` (checked before any write),
    /// `ConcurrentModification` if the pools changed between read and write, or
    /// `Storage`.
    pub fn deduct(&self, device_id: &DeviceId, amount: i64) -> Result<Deduction> {
        validate_amount(amount)?;
        let balance = self.current(device_id)?;

        let debit = balance
            .plan_debit(amount)
            .ok_or(BillingError::InsufficientCredits {
                available: balance.total(),
                required: amount,
            })?;

        if !self.store.compare_and_deduct(device_id, &balance, &debit)? {
            return Err(BillingError::ConcurrentModification {
                device_id: device_id.to_string(),
            });
        }

        let after = balance.after(&debit);
        tracing::debug!(
            device_id = %device_id,
            amount,
            from_subscription = debit.from_subscription,
            from_extra = debit.from_extra,
            remaining = after.total(),
            "Credits deducted"
        );

        Ok(Deduction {
            debit,
            balance: after,
        })
    }

    /// Deduct, re-running the whole read-check-write cycle on
    /// `ConcurrentModification` up to `max_attempts` times.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::deduct`]; `ConcurrentModification` only once the
    /// attempts are exhausted.
    pub fn deduct_with_retry(
        &self,
        device_id: &DeviceId,
        amount: i64,
        max_attempts: u32,
    ) -> Result<Deduction> {
        let mut attempt = 1;
        loop {
            match self.deduct(device_id, amount) {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::debug!(device_id = %device_id, attempt, "Deduction conflicted, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn current(&self, device_id: &DeviceId) -> Result<CreditBalance> {
        self.store
            .get_balance(device_id)?
            .map(|record| record.credits())
            .ok_or_else(|| not_found(device_id))
    }
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(BillingError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn not_found(device_id: &DeviceId) -> BillingError {
    BillingError::DeviceNotFound {
        device_id: device_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retouch_core::{BalanceRecord, BalanceUpdate};
    use retouch_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn device(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    fn ledger_with(subscription: i64, extra: i64) -> (CreditLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut record = BalanceRecord::new(device("d1"), Utc::now());
        record.subscription_credits = subscription;
        record.extra_credits = extra;
        store.upsert_device(&record).unwrap();
        (CreditLedger::new(store.clone()), store)
    }

    #[test]
    fn deduction_takes_subscription_first() {
        let (ledger, _store) = ledger_with(1, 3);

        let deduction = ledger.deduct(&device("d1"), 1).unwrap();

        assert_eq!(deduction.balance, CreditBalance::new(0, 3));
        let balance = ledger.read_balance(&device("d1")).unwrap();
        assert_eq!(balance.subscription_credits, 0);
        assert_eq!(balance.extra_credits, 3);
        assert_eq!(balance.total_credits_spent, 1);
    }

    #[test]
    fn deduction_falls_through_to_extra() {
        let (ledger, _store) = ledger_with(0, 2);
        let deduction = ledger.deduct(&device("d1"), 1).unwrap();
        assert_eq!(deduction.debit.from_extra, 1);
        assert_eq!(deduction.balance, CreditBalance::new(0, 1));
    }

    #[test]
    fn insufficient_credits_writes_nothing() {
        let (ledger, _store) = ledger_with(0, 0);
        let err = ledger.deduct(&device("d1"), 1).unwrap_err();
        assert!(matches!(
            err,
            BillingError::InsufficientCredits {
                available: 0,
                required: 1
            }
        ));
        assert_eq!(
            ledger.read_balance(&device("d1")).unwrap().total_credits_spent,
            0
        );
    }

    #[test]
    fn unknown_device_is_not_found() {
        let ledger = CreditLedger::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            ledger.read_balance(&device("ghost")),
            Err(BillingError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            ledger.deduct(&device("ghost"), 1),
            Err(BillingError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            ledger.ensure_available(&device("ghost"), 1),
            Err(BillingError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let (ledger, _store) = ledger_with(5, 5);
        assert!(matches!(
            ledger.deduct(&device("d1"), 0),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            ledger.ensure_available(&device("d1"), -2),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn ensure_available_does_not_write() {
        let (ledger, store) = ledger_with(1, 0);
        let before = store.get_balance(&device("d1")).unwrap().unwrap();

        assert_eq!(
            ledger.ensure_available(&device("d1"), 1).unwrap(),
            CreditBalance::new(1, 0)
        );
        assert!(matches!(
            ledger.ensure_available(&device("d1"), 2),
            Err(BillingError::InsufficientCredits { .. })
        ));

        assert_eq!(store.get_balance(&device("d1")).unwrap().unwrap(), before);
    }

    /// Store wrapper that applies a top-up between the ledger's read and its write,
    /// for the first `conflicts` deductions.
    struct RacingStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
    }

    impl Store for RacingStore {
        fn get_balance(
            &self,
            device_id: &DeviceId,
        ) -> retouch_store::Result<Option<BalanceRecord>> {
            self.inner.get_balance(device_id)
        }
        fn upsert_device(
            &self,
            seed: &BalanceRecord,
        ) -> retouch_store::Result<retouch_store::UpsertOutcome> {
            self.inner.upsert_device(seed)
        }
        fn compare_and_deduct(
            &self,
            device_id: &DeviceId,
            expected: &CreditBalance,
            debit: &Debit,
        ) -> retouch_store::Result<bool> {
            if self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                self.inner
                    .update_balance(device_id, &BalanceUpdate::top_up(1), false, None)?;
            }
            self.inner.compare_and_deduct(device_id, expected, debit)
        }
        fn update_balance(
            &self,
            device_id: &DeviceId,
            update: &BalanceUpdate,
            upsert: bool,
            claim: Option<&retouch_store::ProcessedEvent>,
        ) -> retouch_store::Result<retouch_store::WriteOutcome> {
            self.inner.update_balance(device_id, update, upsert, claim)
        }
        fn transfer_balance(
            &self,
            from: &DeviceId,
            to: &DeviceId,
            claim: Option<&retouch_store::ProcessedEvent>,
        ) -> retouch_store::Result<retouch_store::TransferOutcome> {
            self.inner.transfer_balance(from, to, claim)
        }
        fn put_generation(
            &self,
            record: &retouch_core::GenerationRecord,
        ) -> retouch_store::Result<()> {
            self.inner.put_generation(record)
        }
    }

    fn racing_ledger(conflicts: usize) -> CreditLedger {
        let inner = MemoryStore::new();
        let mut record = BalanceRecord::new(device("d1"), Utc::now());
        record.subscription_credits = 1;
        inner.upsert_device(&record).unwrap();
        CreditLedger::new(Arc::new(RacingStore {
            inner,
            conflicts: AtomicUsize::new(conflicts),
        }))
    }

    #[test]
    fn lost_race_is_concurrent_modification() {
        let ledger = racing_ledger(1);
        assert!(matches!(
            ledger.deduct(&device("d1"), 1),
            Err(BillingError::ConcurrentModification { .. })
        ));
        let balance = ledger.read_balance(&device("d1")).unwrap();
        assert_eq!(balance.subscription_credits, 1);
        assert_eq!(balance.extra_credits, 1);
        assert_eq!(balance.total_credits_spent, 0);
    }

    #[test]
    fn retry_recovers_from_conflicts() {
        let ledger = racing_ledger(2);
        let deduction = ledger.deduct_with_retry(&device("d1"), 1, 3).unwrap();
        assert_eq!(deduction.balance, CreditBalance::new(0, 2));
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let ledger = racing_ledger(5);
        assert!(matches!(
            ledger.deduct_with_retry(&device("d1"), 1, 3),
            Err(BillingError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn retry_does_not_retry_insufficient_credits() {
        let (ledger, _store) = ledger_with(0, 0);
        assert!(matches!(
            ledger.deduct_with_retry(&device("d1"), 1, 10),
            Err(BillingError::InsufficientCredits { .. })
        ));
    }

    #[test]
    fn concurrent_deductions_never_double_spend() {
        let (ledger, _store) = ledger_with(4, 2);
        let successes = AtomicUsize::new(0);
        let failures = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..20 {
                scope.spawn(|| match ledger.deduct(&device("d1"), 1) {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(
                        BillingError::InsufficientCredits { .. }
                        | BillingError::ConcurrentModification { .. },
                    ) => {
                        failures.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                });
            }
        });

        let won = successes.load(Ordering::SeqCst);
        assert!(won <= 6);
        assert_eq!(won + failures.load(Ordering::SeqCst), 20);
        let balance = ledger.read_balance(&device("d1")).unwrap();
        assert_eq!(balance.total_credits_spent, i64::try_from(won).unwrap());
        assert_eq!(
            balance.subscription_credits + balance.extra_credits,
            6 - i64::try_from(won).unwrap()
        );
    }
}
