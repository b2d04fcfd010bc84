// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Consent Gate
//!
//! The authorization decision for every decrypt attempt, plus the derived
//! lifecycle state shown on dashboards.
//!
//! There is no stored "status" column. The observable state is recomputed
//! from the record's latch fields and the clock on every evaluation, so a
//! decrypt arriving after `destroy_at` is refused even when the retention
//! sweeper has not tombstoned the record yet.
//!
//! ## State machine
//!
//! ```text
//! Active ──consent withdrawn──▶ Revoked   (terminal)
//! Active / ExpiringSoon ──time or tombstone──▶ Expired   (terminal)
//! ```
//!
//! `ExpiringSoon` is informational only: it authorizes exactly like
//! `Active`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ConsentRecord;

/// How close to `destroy_at` a record is flagged as expiring.
const EXPIRY_WARNING_WINDOW_DAYS: i64 = 7;

/// Observable lifecycle state of a consent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    /// Consent granted, retention window open.
    Active,
    /// Active, but `destroy_at` is at most seven days away.
    ExpiringSoon,
    /// Retention window elapsed or record tombstoned. Terminal.
    Expired,
    /// Consent latch dropped. Terminal, regardless of time.
    Revoked,
}

/// Why a decrypt attempt was refused by policy.
///
/// A policy denial is always distinguishable from an infrastructure
/// failure — callers and audit logs can tell "refused" from "broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("consent has been revoked by the data subject")]
    ConsentRevoked,

    #[error("retention window has elapsed; ciphertext is no longer accessible")]
    RecordExpired,
}

impl ConsentState {
    /// Derive the state of `record` as observed at `now`.
    ///
    /// Revocation wins over expiry: there is no transition out of
    /// `Revoked`, so a revoked record stays revoked even after its
    /// retention window lapses.
    pub fn of(record: &ConsentRecord, now: DateTime<Utc>) -> Self {
        if !record.consent_active {
            return ConsentState::Revoked;
        }
        if record.destroyed || now >= record.destroy_at {
            return ConsentState::Expired;
        }
        if record.destroy_at - now <= Duration::days(EXPIRY_WARNING_WINDOW_DAYS) {
            return ConsentState::ExpiringSoon;
        }
        ConsentState::Active
    }

    /// Whether this state authorizes a decrypt.
    pub fn authorizes(self) -> bool {
        matches!(self, ConsentState::Active | ConsentState::ExpiringSoon)
    }
}

/// Authorize a decrypt attempt on `record` at `now`.
///
/// Returns the specific denial reason on refusal. Must be called before
/// every gateway decode — never after.
pub fn authorize(record: &ConsentRecord, now: DateTime<Utc>) -> Result<(), AccessDenied> {
    match ConsentState::of(record, now) {
        ConsentState::Active | ConsentState::ExpiringSoon => Ok(()),
        ConsentState::Revoked => Err(AccessDenied::ConsentRevoked),
        ConsentState::Expired => Err(AccessDenied::RecordExpired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_record;
    use crate::models::RetentionWindow;

    #[test]
    fn fresh_three_day_record_is_expiring_soon() {
        // A 3-day window is already inside the 7-day warning band.
        let record = sample_record(RetentionWindow::ThreeDays);
        let state = ConsentState::of(&record, record.created_at);
        assert_eq!(state, ConsentState::ExpiringSoon);
        assert!(state.authorizes());
    }

    #[test]
    fn fresh_three_week_record_is_active() {
        let record = sample_record(RetentionWindow::ThreeWeeks);
        assert_eq!(
            ConsentState::of(&record, record.created_at),
            ConsentState::Active
        );
    }

    #[test]
    fn expiry_is_time_exact() {
        let record = sample_record(RetentionWindow::ThreeDays);

        let just_before = record.destroy_at - Duration::seconds(1);
        assert!(authorize(&record, just_before).is_ok());

        // Exactly at the deadline the window is closed.
        assert_eq!(
            authorize(&record, record.destroy_at),
            Err(AccessDenied::RecordExpired)
        );

        let just_after = record.destroy_at + Duration::seconds(1);
        assert_eq!(
            authorize(&record, just_after),
            Err(AccessDenied::RecordExpired)
        );
    }

    #[test]
    fn tombstoned_record_is_expired_before_its_deadline() {
        let mut record = sample_record(RetentionWindow::ThreeWeeks);
        record.destroyed = true;
        record.ciphertext = None;
        assert_eq!(
            ConsentState::of(&record, record.created_at),
            ConsentState::Expired
        );
    }

    #[test]
    fn revocation_denies_regardless_of_time() {
        let mut record = sample_record(RetentionWindow::ThreeWeeks);
        record.consent_active = false;
        assert_eq!(
            authorize(&record, record.created_at),
            Err(AccessDenied::ConsentRevoked)
        );
    }

    #[test]
    fn revoked_stays_revoked_past_the_deadline() {
        // No transition out of Revoked, even once the window lapses.
        let mut record = sample_record(RetentionWindow::ThreeDays);
        record.consent_active = false;
        let long_after = record.destroy_at + Duration::days(30);
        assert_eq!(
            ConsentState::of(&record, long_after),
            ConsentState::Revoked
        );
    }

    #[test]
    fn expiring_soon_boundary_is_inclusive() {
        let record = sample_record(RetentionWindow::ThreeWeeks);
        let exactly_seven_days_left = record.destroy_at - Duration::days(7);
        assert_eq!(
            ConsentState::of(&record, exactly_seven_days_left),
            ConsentState::ExpiringSoon
        );
        let just_over = exactly_seven_days_left - Duration::seconds(1);
        assert_eq!(ConsentState::of(&record, just_over), ConsentState::Active);
    }
}
