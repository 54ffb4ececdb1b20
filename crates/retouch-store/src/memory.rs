//! In-memory storage implementation.
//!
//! Used by tests and by `STORE_BACKEND=memory` for local development. Each balance
//! write holds the map's write lock for the whole read-modify-write, which gives the
//! same per-record atomicity as the `RocksDB` transactions. Claimed writes also hold
//! the event map's lock, always taken after the balance lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use retouch_core::{
    BalanceRecord, BalanceUpdate, CreditBalance, Debit, DeviceId, GenerationId, GenerationRecord,
};

use crate::error::{Result, StoreError};
use crate::{
    apply_transfer, conditional_debit, ProcessedEvent, Store, TransferOutcome, UpsertOutcome,
    WriteOutcome,
};

/// In-memory storage backed by `RwLock`ed hash maps.
#[derive(Default)]
pub struct MemoryStore {
    balances: RwLock<HashMap<DeviceId, BalanceRecord>>,
    events: RwLock<HashMap<String, ProcessedEvent>>,
    generations: RwLock<HashMap<GenerationId, GenerationRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Database("lock poisoned".to_string())
}

impl Store for MemoryStore {
    fn get_balance(&self, device_id: &DeviceId) -> Result<Option<BalanceRecord>> {
        let balances = self.balances.read().map_err(poisoned)?;
        Ok(balances.get(device_id).cloned())
    }

    fn upsert_device(&self, seed: &BalanceRecord) -> Result<UpsertOutcome> {
        let mut balances = self.balances.write().map_err(poisoned)?;

        if let Some(record) = balances.get_mut(&seed.device_id) {
            record.device = seed.device.clone();
            record.updated_at = Utc::now();
            return Ok(UpsertOutcome::Updated(record.clone()));
        }

        balances.insert(seed.device_id.clone(), seed.clone());
        Ok(UpsertOutcome::Inserted(seed.clone()))
    }

    fn compare_and_deduct(
        &self,
        device_id: &DeviceId,
        expected: &CreditBalance,
        debit: &Debit,
    ) -> Result<bool> {
        let mut balances = self.balances.write().map_err(poisoned)?;

        Ok(balances
            .get_mut(device_id)
            .is_some_and(|record| conditional_debit(record, expected, debit, Utc::now())))
    }

    fn update_balance(
        &self,
        device_id: &DeviceId,
        update: &BalanceUpdate,
        upsert: bool,
        claim: Option<&ProcessedEvent>,
    ) -> Result<WriteOutcome> {
        let mut balances = self.balances.write().map_err(poisoned)?;
        let mut events = self.events.write().map_err(poisoned)?;

        if is_claimed(&events, claim) {
            return Ok(WriteOutcome::Duplicate);
        }

        let now = Utc::now();
        let outcome = if let Some(record) = balances.get_mut(device_id) {
            record.apply(update, now);
            WriteOutcome::Updated
        } else if upsert {
            let mut record = BalanceRecord::new(device_id.clone(), now);
            record.apply(update, now);
            balances.insert(device_id.clone(), record);
            WriteOutcome::Inserted
        } else {
            return Ok(WriteOutcome::NotFound);
        };

        record_claim(&mut events, claim);
        Ok(outcome)
    }

    fn transfer_balance(
        &self,
        from: &DeviceId,
        to: &DeviceId,
        claim: Option<&ProcessedEvent>,
    ) -> Result<TransferOutcome> {
        debug_assert_ne!(from, to, "transfer source and destination must differ");

        let mut balances = self.balances.write().map_err(poisoned)?;
        let mut events = self.events.write().map_err(poisoned)?;

        if is_claimed(&events, claim) {
            return Ok(TransferOutcome::Duplicate);
        }
        let Some(source) = balances.get(from).cloned() else {
            return Ok(TransferOutcome::SourceNotFound);
        };

        let existing = balances.get(to).cloned();
        let (source, destination) = apply_transfer(source, existing, to, Utc::now());
        balances.insert(from.clone(), source);
        balances.insert(to.clone(), destination.clone());

        record_claim(&mut events, claim);
        Ok(TransferOutcome::Transferred(destination))
    }

    fn put_generation(&self, record: &GenerationRecord) -> Result<()> {
        let mut generations = self.generations.write().map_err(poisoned)?;
        generations.insert(record.id, record.clone());
        Ok(())
    }
}

fn is_claimed(events: &HashMap<String, ProcessedEvent>, claim: Option<&ProcessedEvent>) -> bool {
    claim.is_some_and(|claim| events.contains_key(&claim.event_id))
}

fn record_claim(events: &mut HashMap<String, ProcessedEvent>, claim: Option<&ProcessedEvent>) {
    if let Some(claim) = claim {
        events.insert(claim.event_id.clone(), claim.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retouch_core::SubscriptionStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn device(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    fn seeded(id: &str, subscription: i64, extra: i64) -> MemoryStore {
        let store = MemoryStore::new();
        let mut record = BalanceRecord::new(device(id), Utc::now());
        record.subscription_credits = subscription;
        record.extra_credits = extra;
        store.upsert_device(&record).unwrap();
        store
    }

    #[test]
    fn upsert_keeps_existing_balance() {
        let store = seeded("d1", 2, 0);
        let again = BalanceRecord::onboarded(
            device("d1"),
            retouch_core::DeviceProfile::default(),
            true,
            1,
            Utc::now(),
        );

        let outcome = store.upsert_device(&again).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Updated(_)));
        assert_eq!(outcome.record().subscription_credits, 2);
        assert!(!outcome.record().cohort_flag);
    }

    #[test]
    fn deduct_after_top_up_conflicts() {
        let store = seeded("d1", 0, 1);
        let id = device("d1");
        let snapshot = store.get_balance(&id).unwrap().unwrap().credits();
        let debit = snapshot.plan_debit(1).unwrap();

        store
            .update_balance(&id, &BalanceUpdate::top_up(100), false, None)
            .unwrap();

        assert!(!store.compare_and_deduct(&id, &snapshot, &debit).unwrap());
        let record = store.get_balance(&id).unwrap().unwrap();
        assert_eq!(record.extra_credits, 101);
        assert_eq!(record.total_credits_spent, 0);
    }

    #[test]
    fn expiration_without_record_is_not_found() {
        let store = MemoryStore::new();
        let outcome = store
            .update_balance(&device("ghost"), &BalanceUpdate::expiration(), false, None)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotFound);
        assert!(store.get_balance(&device("ghost")).unwrap().is_none());
    }

    #[test]
    fn transfer_overwrites_destination_pools() {
        let store = seeded("old", 10, 2);
        let mut dest = BalanceRecord::new(device("new"), Utc::now());
        dest.extra_credits = 40;
        store.upsert_device(&dest).unwrap();

        let TransferOutcome::Transferred(destination) = store
            .transfer_balance(&device("old"), &device("new"), None)
            .unwrap()
        else {
            panic!("source should exist");
        };

        assert_eq!(destination.credits(), CreditBalance::new(10, 2));
        assert_eq!(destination.subscription_status, SubscriptionStatus::Free);
        let source = store.get_balance(&device("old")).unwrap().unwrap();
        assert_eq!(source.transferred_to, Some(device("new")));
    }

    #[test]
    fn claimed_events_apply_once() {
        let store = seeded("d1", 0, 0);
        let id = device("d1");
        let claim = ProcessedEvent {
            event_id: "evt".into(),
            event_type: "NON_RENEWING_PURCHASE".into(),
            processed_at: Utc::now(),
        };

        let applied = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let outcome = store
                        .update_balance(&id, &BalanceUpdate::top_up(100), false, Some(&claim))
                        .unwrap();
                    if outcome == WriteOutcome::Updated {
                        applied.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_balance(&id).unwrap().unwrap().extra_credits, 100);
        assert_eq!(
            store.transfer_balance(&id, &device("d2"), Some(&claim)).unwrap(),
            TransferOutcome::Duplicate
        );
    }

    #[test]
    fn concurrent_deductions_never_double_spend() {
        let store = seeded("hot", 3, 2);
        let id = device("hot");
        let successes = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    let current = store.get_balance(&id).unwrap().unwrap().credits();
                    if let Some(debit) = current.plan_debit(1) {
                        if store.compare_and_deduct(&id, &current, &debit).unwrap() {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        let record = store.get_balance(&id).unwrap().unwrap();
        let won = i64::try_from(successes.load(Ordering::SeqCst)).unwrap();
        assert!(won <= 5);
        assert_eq!(record.total_credits_spent, won);
        assert_eq!(record.credits().total(), 5 - won);
        assert!(record.subscription_credits >= 0 && record.extra_credits >= 0);
    }
}
