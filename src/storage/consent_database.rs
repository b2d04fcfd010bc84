// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded consent record database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `consent_records`: record_id → serialized ConsentRecord
//! - `subject_index`: composite key (subject_id|!created_at|record_id) → record_id
//! - `destroy_queue`: composite key (destroy_at_be|record_id) → record_id
//!
//! ## Concurrency
//!
//! Every mutation runs in its own redb write transaction and re-reads the
//! record before changing it, so the latch transitions (`consent_active`,
//! `destroyed`) are linearizable: of two racing writers, exactly one wins
//! and the other observes a typed failure (`AlreadyRevoked` /
//! `AlreadyTombstoned`), never a silent overwrite. No component holds its
//! own lock around the store.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::models::ConsentRecord;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: record_id → serialized ConsentRecord (JSON bytes).
const CONSENT_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("consent_records");

/// Index: composite key → record_id.
/// Key format: `subject_id|!created_at_be|record_id` for descending-time scans.
const SUBJECT_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("subject_index");

/// Destruction queue: `destroy_at_be|record_id` → record_id, oldest deadline
/// first. Entries are removed in the same transaction that tombstones.
const DESTROY_QUEUE: TableDefinition<&[u8], &str> = TableDefinition::new("destroy_queue");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConsentDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("consent record not found: {0}")]
    NotFound(String),

    #[error("consent already revoked for record {0}")]
    AlreadyRevoked(String),

    #[error("record {0} is already tombstoned")]
    AlreadyTombstoned(String),

    #[error("record {0} has destroy_at not after created_at")]
    InvalidRetention(String),
}

pub type ConsentDbResult<T> = Result<T, ConsentDbError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the subject_index table.
///
/// Format: `subject_id | inverted_timestamp_be_bytes | record_id`
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_subject_key(subject_id: &str, created_at: i64, record_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(subject_id.len() + 1 + 8 + 1 + record_id.len());
    key.extend_from_slice(subject_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!created_at as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(record_id.as_bytes());
    key
}

/// Build a prefix for range scanning all records of a subject.
fn make_subject_prefix(subject_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(subject_id.len() + 1);
    prefix.extend_from_slice(subject_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a subject range scan (prefix with 0xFF bytes appended).
fn make_subject_prefix_end(subject_id: &str) -> Vec<u8> {
    let mut end = make_subject_prefix(subject_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Build a composite key for the destroy_queue table.
///
/// Format: `destroy_at_be_bytes | record_id`, so the queue is ordered by
/// deadline and a sweep is a bounded range scan.
fn make_queue_key(destroy_at: i64, record_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + record_id.len());
    key.extend_from_slice(&(destroy_at.max(0) as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(record_id.as_bytes());
    key
}

/// Exclusive upper bound covering every queue key with a deadline <= `now`.
fn make_queue_end(now: i64) -> Vec<u8> {
    ((now.max(0) as u64) + 1).to_be_bytes().to_vec()
}

// =============================================================================
// ConsentDatabase
// =============================================================================

/// Embedded ACID consent record database.
pub struct ConsentDatabase {
    db: Database,
}

impl ConsentDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> ConsentDbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CONSENT_RECORDS)?;
            let _ = write_txn.open_table(SUBJECT_INDEX)?;
            let _ = write_txn.open_table(DESTROY_QUEUE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Creation and reads
    // =========================================================================

    /// Persist a freshly created record and its index entries.
    ///
    /// Rejects records whose destruction deadline is not strictly after
    /// their creation time.
    pub fn insert_record(&self, record: &ConsentRecord) -> ConsentDbResult<()> {
        if record.destroy_at <= record.created_at {
            return Err(ConsentDbError::InvalidRetention(record.id.clone()));
        }

        let json = serde_json::to_vec(record)?;
        let created = record.created_at.timestamp();
        let destroy = record.destroy_at.timestamp();

        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(CONSENT_RECORDS)?;
            records.insert(record.id.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(SUBJECT_INDEX)?;
            let key = make_subject_key(&record.subject_id, created, &record.id);
            index.insert(key.as_slice(), record.id.as_str())?;

            let mut queue = write_txn.open_table(DESTROY_QUEUE)?;
            let key = make_queue_key(destroy, &record.id);
            queue.insert(key.as_slice(), record.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single record by id.
    pub fn get(&self, record_id: &str) -> ConsentDbResult<Option<ConsentRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONSENT_RECORDS)?;
        match table.get(record_id)? {
            Some(value) => {
                let record: ConsentRecord = serde_json::from_slice(value.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List a subject's records, newest first.
    pub fn list_by_subject(&self, subject_id: &str) -> ConsentDbResult<Vec<ConsentRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(SUBJECT_INDEX)?;
        let records = read_txn.open_table(CONSENT_RECORDS)?;

        let prefix = make_subject_prefix(subject_id);
        let end = make_subject_prefix_end(subject_id);

        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..end.as_slice())? {
            let entry = entry?;
            let record_id = entry.1.value().to_string();
            if let Some(value) = records.get(record_id.as_str())? {
                let record: ConsentRecord = serde_json::from_slice(value.value())?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // =========================================================================
    // Latch transitions (compare-and-swap)
    // =========================================================================

    /// Drop the consent latch for a record.
    ///
    /// Fails with [`ConsentDbError::AlreadyRevoked`] if consent is already
    /// false — deliberately a failure rather than a no-op success, so a
    /// caller that lost a race can tell. There is no operation that sets
    /// the latch back to true.
    pub fn try_revoke(&self, record_id: &str) -> ConsentDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONSENT_RECORDS)?;
            let mut record = read_record(&table, record_id)?;

            if !record.consent_active {
                return Err(ConsentDbError::AlreadyRevoked(record_id.to_string()));
            }
            record.consent_active = false;

            let json = serde_json::to_vec(&record)?;
            table.insert(record_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Record a successful decrypt: bump `access_count` by exactly one and
    /// stamp `last_access_at`, atomically.
    ///
    /// Returns the new count. Two concurrent callers can never observe the
    /// same next count — each runs in its own serialized write transaction.
    pub fn try_increment_access(
        &self,
        record_id: &str,
        at: DateTime<Utc>,
    ) -> ConsentDbResult<u64> {
        let new_count;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONSENT_RECORDS)?;
            let mut record = read_record(&table, record_id)?;

            record.access_count += 1;
            record.last_access_at = Some(at);
            new_count = record.access_count;

            let json = serde_json::to_vec(&record)?;
            table.insert(record_id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(new_count)
    }

    /// Tombstone a record: set the `destroyed` latch and discard the
    /// ciphertext envelope for good. All audit fields (`access_count`,
    /// `last_access_at`, `amount`) survive.
    ///
    /// Fails with [`ConsentDbError::AlreadyTombstoned`] if another sweep
    /// (or a previous cycle) got there first. The destroy-queue entry is
    /// removed in the same transaction, so the operation is idempotent and
    /// never left half-applied.
    pub fn try_tombstone(&self, record_id: &str) -> ConsentDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONSENT_RECORDS)?;
            let mut record = read_record(&table, record_id)?;

            if record.destroyed {
                return Err(ConsentDbError::AlreadyTombstoned(record_id.to_string()));
            }
            record.destroyed = true;
            record.ciphertext = None;

            let json = serde_json::to_vec(&record)?;
            table.insert(record_id, json.as_slice())?;

            let mut queue = write_txn.open_table(DESTROY_QUEUE)?;
            let key = make_queue_key(record.destroy_at.timestamp(), record_id);
            queue.remove(key.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // Destruction queue
    // =========================================================================

    /// Ids of records whose destruction deadline has passed and which have
    /// not been tombstoned yet, oldest deadline first.
    pub fn expired_ids(&self, now: DateTime<Utc>) -> ConsentDbResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let queue = read_txn.open_table(DESTROY_QUEUE)?;

        let end = make_queue_end(now.timestamp());
        let mut ids = Vec::new();
        for entry in queue.range(..end.as_slice())? {
            let entry = entry?;
            ids.push(entry.1.value().to_string());
        }
        Ok(ids)
    }
}

/// Read a record inside a write transaction, deserializing before mutation.
fn read_record(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    record_id: &str,
) -> ConsentDbResult<ConsentRecord> {
    let bytes = {
        let existing = table
            .get(record_id)?
            .ok_or_else(|| ConsentDbError::NotFound(record_id.to_string()))?;
        existing.value().to_vec()
    };
    Ok(serde_json::from_slice(&bytes)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_record;
    use crate::models::RetentionWindow;
    use chrono::Duration;

    fn temp_db() -> (ConsentDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = ConsentDatabase::open(&dir.path().join("consents.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_get_record() {
        let (db, _dir) = temp_db();
        let record = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&record).unwrap();

        let loaded = db.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.subject_id, "subject-1");
        assert!(loaded.consent_active);
        assert!(loaded.ciphertext.is_some());
    }

    #[test]
    fn get_unknown_record_is_none() {
        let (db, _dir) = temp_db();
        assert!(db.get("missing").unwrap().is_none());
    }

    #[test]
    fn insert_rejects_non_positive_retention() {
        let (db, _dir) = temp_db();
        let mut record = sample_record(RetentionWindow::OneWeek);
        record.destroy_at = record.created_at;
        let err = db.insert_record(&record).unwrap_err();
        assert!(matches!(err, ConsentDbError::InvalidRetention(_)));
    }

    #[test]
    fn revoke_is_a_one_way_latch() {
        let (db, _dir) = temp_db();
        let record = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&record).unwrap();

        db.try_revoke(&record.id).unwrap();
        assert!(!db.get(&record.id).unwrap().unwrap().consent_active);

        // Second revoke loses the latch race by definition.
        let err = db.try_revoke(&record.id).unwrap_err();
        assert!(matches!(err, ConsentDbError::AlreadyRevoked(_)));
    }

    #[test]
    fn revoke_unknown_record_is_not_found() {
        let (db, _dir) = temp_db();
        let err = db.try_revoke("missing").unwrap_err();
        assert!(matches!(err, ConsentDbError::NotFound(_)));
    }

    #[test]
    fn increment_access_counts_exactly() {
        let (db, _dir) = temp_db();
        let record = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&record).unwrap();

        let t1 = Utc::now();
        assert_eq!(db.try_increment_access(&record.id, t1).unwrap(), 1);
        let t2 = Utc::now();
        assert_eq!(db.try_increment_access(&record.id, t2).unwrap(), 2);

        let loaded = db.get(&record.id).unwrap().unwrap();
        assert_eq!(loaded.access_count, 2);
        assert_eq!(loaded.last_access_at, Some(t2));
    }

    #[test]
    fn concurrent_increments_never_share_a_count() {
        let (db, _dir) = temp_db();
        let record = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&record).unwrap();

        let db = std::sync::Arc::new(db);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let record_id = record.id.clone();
                std::thread::spawn(move || db.try_increment_access(&record_id, Utc::now()).unwrap())
            })
            .collect();

        let mut counts: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        counts.sort_unstable();
        // Serialized write transactions: no two callers see the same next count.
        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(db.get(&record.id).unwrap().unwrap().access_count, 8);
    }

    #[test]
    fn tombstone_clears_ciphertext_and_keeps_audit_fields() {
        let (db, _dir) = temp_db();
        let mut record = sample_record(RetentionWindow::OneWeek);
        record.access_count = 3;
        record.last_access_at = Some(Utc::now());
        db.insert_record(&record).unwrap();

        db.try_tombstone(&record.id).unwrap();

        let loaded = db.get(&record.id).unwrap().unwrap();
        assert!(loaded.destroyed);
        assert!(loaded.ciphertext.is_none());
        // Audit trail survives destruction.
        assert_eq!(loaded.access_count, 3);
        assert!(loaded.last_access_at.is_some());
        assert_eq!(loaded.amount, 5000.0);
    }

    #[test]
    fn tombstone_is_idempotent_via_typed_failure() {
        let (db, _dir) = temp_db();
        let record = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&record).unwrap();

        db.try_tombstone(&record.id).unwrap();
        let err = db.try_tombstone(&record.id).unwrap_err();
        assert!(matches!(err, ConsentDbError::AlreadyTombstoned(_)));
    }

    #[test]
    fn expired_ids_only_returns_lapsed_records() {
        let (db, _dir) = temp_db();

        let mut lapsed = sample_record(RetentionWindow::ThreeDays);
        lapsed.created_at = Utc::now() - Duration::days(10);
        lapsed.destroy_at = Utc::now() - Duration::days(7);
        db.insert_record(&lapsed).unwrap();

        let live = sample_record(RetentionWindow::ThreeWeeks);
        db.insert_record(&live).unwrap();

        let ids = db.expired_ids(Utc::now()).unwrap();
        assert_eq!(ids, vec![lapsed.id.clone()]);

        // Tombstoning removes the queue entry.
        db.try_tombstone(&lapsed.id).unwrap();
        assert!(db.expired_ids(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn list_by_subject_is_newest_first_and_scoped() {
        let (db, _dir) = temp_db();

        let mut older = sample_record(RetentionWindow::OneWeek);
        older.created_at = Utc::now() - Duration::hours(2);
        older.destroy_at = RetentionWindow::OneWeek.destroy_at(older.created_at);
        db.insert_record(&older).unwrap();

        let newer = sample_record(RetentionWindow::OneWeek);
        db.insert_record(&newer).unwrap();

        let mut other = sample_record(RetentionWindow::OneWeek);
        other.subject_id = "subject-2".to_string();
        db.insert_record(&other).unwrap();

        let listed = db.list_by_subject("subject-1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }
}
