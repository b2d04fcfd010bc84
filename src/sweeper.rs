// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Retention Sweeper
//!
//! Background task that tombstones consent records whose retention window
//! has elapsed: the ciphertext envelope is discarded for good while the
//! audit fields survive.
//!
//! ## Strategy
//!
//! Every `sweep_interval` (default 5 min) the sweeper:
//! 1. Range-scans the destroy queue for records with `destroy_at <= now`.
//! 2. Tombstones each via the store's compare-and-swap operation.
//! 3. Skips records another writer already tombstoned, and leaves failed
//!    records in the queue for the next cycle — one bad record never
//!    blocks the rest of the sweep.
//!
//! This is a best-effort sweep, not a real-time trigger: the consent gate
//! refuses lapsed records on its own clock, so correctness never depends
//! on sweep timing.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown,
//! the same pattern as the HTTP server's shutdown path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::{AuditEvent, AuditEventType, AuditLog, ConsentDatabase, ConsentDbError};

/// Default interval between sweep cycles.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Background sweeper that destroys lapsed ciphertext references.
pub struct RetentionSweeper {
    db: Arc<ConsentDatabase>,
    audit: Arc<AuditLog>,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    /// Create a new sweeper over the given database.
    pub fn new(db: Arc<ConsentDatabase>, audit: Arc<AuditLog>) -> Self {
        Self {
            db,
            audit,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Retention sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Retention sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Retention sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep cycle. Returns the number of records tombstoned.
    pub fn sweep_step(&self) -> usize {
        let now = Utc::now();
        let expired = match self.db.expired_ids(now) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Retention sweep: failed to scan destroy queue");
                return 0;
            }
        };

        if expired.is_empty() {
            return 0;
        }

        info!(count = expired.len(), "Retention sweep: destroying lapsed records");

        let mut destroyed = 0;
        for record_id in &expired {
            match self.db.try_tombstone(record_id) {
                Ok(()) => {
                    self.audit
                        .record(AuditEvent::new(AuditEventType::RecordDestroyed, record_id));
                    info!(record_id = %record_id, "Retention sweep: record tombstoned");
                    destroyed += 1;
                }
                Err(ConsentDbError::AlreadyTombstoned(_)) => {
                    // Another writer got there first; nothing left to do.
                    debug!(record_id = %record_id, "Retention sweep: already tombstoned");
                }
                Err(e) => {
                    // Left in the queue; the next cycle retries it.
                    warn!(
                        record_id = %record_id,
                        error = %e,
                        "Retention sweep: failed to tombstone record"
                    );
                }
            }
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_record;
    use crate::models::RetentionWindow;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<ConsentDatabase>, RetentionSweeper) {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(ConsentDatabase::open(&temp.path().join("consents.redb")).unwrap());
        let audit = Arc::new(AuditLog::open(temp.path().join("audit")).unwrap());
        let sweeper = RetentionSweeper::new(db.clone(), audit);
        (temp, db, sweeper)
    }

    fn lapsed_record() -> crate::models::ConsentRecord {
        let mut record = sample_record(RetentionWindow::ThreeDays);
        record.created_at = Utc::now() - ChronoDuration::days(5);
        record.destroy_at = record.created_at + ChronoDuration::days(3);
        record
    }

    #[test]
    fn sweep_tombstones_only_lapsed_records() {
        let (_temp, db, sweeper) = setup();

        let lapsed = lapsed_record();
        db.insert_record(&lapsed).unwrap();
        let live = sample_record(RetentionWindow::ThreeWeeks);
        db.insert_record(&live).unwrap();

        assert_eq!(sweeper.sweep_step(), 1);

        let destroyed = db.get(&lapsed.id).unwrap().unwrap();
        assert!(destroyed.destroyed);
        assert!(destroyed.ciphertext.is_none());

        let untouched = db.get(&live.id).unwrap().unwrap();
        assert!(!untouched.destroyed);
        assert!(untouched.ciphertext.is_some());
    }

    #[test]
    fn sweep_is_idempotent_across_cycles() {
        let (_temp, db, sweeper) = setup();
        db.insert_record(&lapsed_record()).unwrap();

        assert_eq!(sweeper.sweep_step(), 1);
        // Queue entry was removed with the tombstone; nothing to redo.
        assert_eq!(sweeper.sweep_step(), 0);
    }

    #[test]
    fn sweep_preserves_audit_fields() {
        let (_temp, db, sweeper) = setup();

        let mut record = lapsed_record();
        record.access_count = 7;
        record.last_access_at = Some(Utc::now() - ChronoDuration::days(4));
        db.insert_record(&record).unwrap();

        sweeper.sweep_step();

        let destroyed = db.get(&record.id).unwrap().unwrap();
        assert_eq!(destroyed.access_count, 7);
        assert!(destroyed.last_access_at.is_some());
        assert_eq!(destroyed.amount, 5000.0);
    }

    #[test]
    fn empty_queue_is_a_quiet_no_op() {
        let (_temp, _db, sweeper) = setup();
        assert_eq!(sweeper.sweep_step(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let (_temp, _db, sweeper) = setup();
        let sweeper = sweeper.with_interval(Duration::from_millis(10));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(sweeper.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }
}
