//! `RocksDB` storage implementation.
//!
//! Balance writes run inside optimistic transactions: the record is read with
//! `get_for_update`, modified, and committed. A commit that conflicts with another
//! writer is re-run against the fresh record, so every closure below sees the value
//! it is actually replacing. Billing-event claims are staged in the same transaction
//! as the balance write they guard.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, ErrorKind, MultiThreaded, OptimisticTransactionDB,
    Options, Transaction,
};

use retouch_core::{BalanceRecord, BalanceUpdate, CreditBalance, Debit, DeviceId, GenerationRecord};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{
    apply_transfer, conditional_debit, ProcessedEvent, Store, TransferOutcome, UpsertOutcome,
    WriteOutcome,
};

type Db = OptimisticTransactionDB<MultiThreaded>;

/// Commit attempts before a contended write gives up.
const MAX_COMMIT_ATTEMPTS: u32 = 32;

/// What a transaction body decided to do with the writes it staged.
enum Txn<R> {
    /// Commit the staged writes and return the value.
    Commit(R),
    /// Drop the staged writes and return the value.
    Rollback(R),
}

/// What a read-modify-write closure decided to do with the record it read.
enum Step<R> {
    /// Persist the record and return the value.
    Write(BalanceRecord, R),
    /// Leave storage unchanged and return the value.
    Skip(R),
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, path, cf_descriptors).map_err(db_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a balance inside a transaction, registering it for conflict detection.
    fn read_for_update(
        txn: &Transaction<'_, Db>,
        cf: &Arc<BoundColumnFamily<'_>>,
        key: &[u8],
    ) -> Result<Option<BalanceRecord>> {
        txn.get_for_update_cf(cf, key, true)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Stage `claim` in `txn` unless its event id is already recorded.
    ///
    /// Returns `false` for a recorded id. The read is registered for conflict
    /// detection, so two transactions staging the same id cannot both commit.
    fn stage_claim(
        txn: &Transaction<'_, Db>,
        cf: &Arc<BoundColumnFamily<'_>>,
        claim: &ProcessedEvent,
    ) -> Result<bool> {
        let key = keys::event_key(&claim.event_id);
        if txn.get_for_update_cf(cf, &key, true).map_err(db_err)?.is_some() {
            return Ok(false);
        }
        txn.put_cf(cf, &key, Self::serialize(claim)?)
            .map_err(db_err)?;
        Ok(true)
    }

    /// Run `body` in an optimistic transaction, re-running it on commit conflicts.
    fn transact<R>(
        &self,
        label: impl Fn() -> String,
        mut body: impl FnMut(&Transaction<'_, Db>) -> Result<Txn<R>>,
    ) -> Result<R> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let txn = self.db.transaction();

            let result = match body(&txn)? {
                Txn::Rollback(result) => return Ok(result),
                Txn::Commit(result) => result,
            };

            match txn.commit() {
                Ok(()) => return Ok(result),
                Err(e) if is_write_conflict(&e) => {
                    tracing::debug!(key = %label(), attempt, "Commit conflicted, retrying");
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        Err(StoreError::Contention { key: label() })
    }

    /// Atomically read, modify, and write one balance record.
    fn read_modify_write<R>(
        &self,
        device_id: &DeviceId,
        mut step: impl FnMut(Option<BalanceRecord>) -> Step<R>,
    ) -> Result<R> {
        let cf = self.cf(cf::BALANCES)?;
        let key = keys::balance_key(device_id);

        self.transact(
            || device_id.to_string(),
            |txn| {
                let current = Self::read_for_update(txn, &cf, &key)?;
                match step(current) {
                    Step::Skip(result) => Ok(Txn::Rollback(result)),
                    Step::Write(record, result) => {
                        txn.put_cf(&cf, &key, Self::serialize(&record)?)
                            .map_err(db_err)?;
                        Ok(Txn::Commit(result))
                    }
                }
            },
        )
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn get_balance(&self, device_id: &DeviceId) -> Result<Option<BalanceRecord>> {
        let cf = self.cf(cf::BALANCES)?;
        let key = keys::balance_key(device_id);

        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn upsert_device(&self, seed: &BalanceRecord) -> Result<UpsertOutcome> {
        self.read_modify_write(&seed.device_id, |current| match current {
            Some(mut record) => {
                record.device = seed.device.clone();
                record.updated_at = Utc::now();
                Step::Write(record.clone(), UpsertOutcome::Updated(record))
            }
            None => Step::Write(seed.clone(), UpsertOutcome::Inserted(seed.clone())),
        })
    }

    fn compare_and_deduct(
        &self,
        device_id: &DeviceId,
        expected: &CreditBalance,
        debit: &Debit,
    ) -> Result<bool> {
        self.read_modify_write(device_id, |current| match current {
            Some(mut record) if conditional_debit(&mut record, expected, debit, Utc::now()) => {
                Step::Write(record, true)
            }
            _ => Step::Skip(false),
        })
    }

    fn update_balance(
        &self,
        device_id: &DeviceId,
        update: &BalanceUpdate,
        upsert: bool,
        claim: Option<&ProcessedEvent>,
    ) -> Result<WriteOutcome> {
        let balances = self.cf(cf::BALANCES)?;
        let events = self.cf(cf::PROCESSED_EVENTS)?;
        let key = keys::balance_key(device_id);

        self.transact(
            || device_id.to_string(),
            |txn| {
                if let Some(claim) = claim {
                    if !Self::stage_claim(txn, &events, claim)? {
                        return Ok(Txn::Rollback(WriteOutcome::Duplicate));
                    }
                }

                let now = Utc::now();
                let (record, outcome) = match Self::read_for_update(txn, &balances, &key)? {
                    Some(mut record) => {
                        record.apply(update, now);
                        (record, WriteOutcome::Updated)
                    }
                    None if upsert => {
                        let mut record = BalanceRecord::new(device_id.clone(), now);
                        record.apply(update, now);
                        (record, WriteOutcome::Inserted)
                    }
                    None => return Ok(Txn::Rollback(WriteOutcome::NotFound)),
                };

                txn.put_cf(&balances, &key, Self::serialize(&record)?)
                    .map_err(db_err)?;
                Ok(Txn::Commit(outcome))
            },
        )
    }

    fn transfer_balance(
        &self,
        from: &DeviceId,
        to: &DeviceId,
        claim: Option<&ProcessedEvent>,
    ) -> Result<TransferOutcome> {
        debug_assert_ne!(from, to, "transfer source and destination must differ");

        let balances = self.cf(cf::BALANCES)?;
        let events = self.cf(cf::PROCESSED_EVENTS)?;
        let from_key = keys::balance_key(from);
        let to_key = keys::balance_key(to);

        self.transact(
            || format!("{from}->{to}"),
            |txn| {
                if let Some(claim) = claim {
                    if !Self::stage_claim(txn, &events, claim)? {
                        return Ok(Txn::Rollback(TransferOutcome::Duplicate));
                    }
                }

                let Some(source) = Self::read_for_update(txn, &balances, &from_key)? else {
                    return Ok(Txn::Rollback(TransferOutcome::SourceNotFound));
                };
                let existing = Self::read_for_update(txn, &balances, &to_key)?;
                let (source, destination) = apply_transfer(source, existing, to, Utc::now());

                txn.put_cf(&balances, &to_key, Self::serialize(&destination)?)
                    .map_err(db_err)?;
                txn.put_cf(&balances, &from_key, Self::serialize(&source)?)
                    .map_err(db_err)?;
                Ok(Txn::Commit(TransferOutcome::Transferred(destination)))
            },
        )
    }

    // =========================================================================
    // Generation Operations
    // =========================================================================

    fn put_generation(&self, record: &GenerationRecord) -> Result<()> {
        let cf = self.cf(cf::GENERATIONS)?;
        let key = keys::generation_key(&record.id);
        let value = Self::serialize(record)?;

        self.db.put_cf(&cf, key, value).map_err(db_err)?;

        Ok(())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Optimistic commits report conflicts as `Busy` (or `TryAgain` when the memtable
/// history is too short to validate).
fn is_write_conflict(e: &rocksdb::Error) -> bool {
    matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain)
}
