// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! This module defines the consent record schema, the cipher gateway wire
//! types, and the request/response structures used by the REST API. All
//! types derive `Serialize`, `Deserialize`, and `ToSchema` for automatic
//! JSON handling and OpenAPI documentation.
//!
//! ## Consent Record
//!
//! [`ConsentRecord`] is the central entity: one per transaction requiring
//! PII protection. The stored fields are the single source of truth — the
//! observable lifecycle state (active / expiring / expired / revoked) is
//! always recomputed from them, never stored.
//!
//! ## Model Categories
//!
//! - **Records**: `ConsentRecord`, `RetentionWindow`
//! - **Gateway wire format**: `PiiPayload`, `CipherEnvelope`, `DecryptedData`
//! - **API**: create/decrypt request and response types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gate::ConsentState;
use crate::risk::RiskTier;

/// Default transaction currency when the caller does not supply one.
pub const DEFAULT_CURRENCY: &str = "INR";

// =============================================================================
// Retention Window
// =============================================================================

/// Retention window chosen at record creation.
///
/// The closed set of windows the gateway contract allows. Each maps to a
/// fixed day count added to `created_at` to produce `destroy_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RetentionWindow {
    #[serde(rename = "3Days")]
    ThreeDays,
    #[serde(rename = "1Week")]
    OneWeek,
    #[serde(rename = "2Week")]
    TwoWeeks,
    #[serde(rename = "3Week")]
    ThreeWeeks,
}

impl RetentionWindow {
    /// Number of days this window spans.
    pub fn days(self) -> i64 {
        match self {
            RetentionWindow::ThreeDays => 3,
            RetentionWindow::OneWeek => 7,
            RetentionWindow::TwoWeeks => 14,
            RetentionWindow::ThreeWeeks => 21,
        }
    }

    /// Compute the destruction deadline for a record created at `created_at`.
    pub fn destroy_at(self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::days(self.days())
    }
}

// =============================================================================
// Cipher Gateway Wire Format
// =============================================================================

/// Plaintext PII captured at transaction time.
///
/// This is the exact shape the gateway's `/encode-data` endpoint accepts
/// (the phone number travels as a JSON number on encode).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PiiPayload {
    pub name: String,
    pub email: String,
    pub phone: u64,
}

/// The symmetric encryption output returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EncryptedBlob {
    pub algorithm: String,
    pub iv: String,
    pub content: String,
}

/// Ciphertext envelope held in place of the plaintext PII.
///
/// This is the opaque reference persisted on the consent record. After
/// tombstoning it is gone for good — the gateway cannot decode without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    /// Platform tag the gateway partitions keys by.
    pub platform: String,
    pub base64_encoded: String,
    pub encrypted: EncryptedBlob,
    /// Echoed back to the gateway on decode.
    pub original_data_type: String,
}

/// Decrypted PII as returned by the gateway's `/decode-data` endpoint.
///
/// The phone comes back as a string — the gateway round-trips it through
/// its own JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DecryptedData {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub platform: String,
}

// =============================================================================
// Consent Record
// =============================================================================

/// A consent-gated encrypted-data record.
///
/// Invariants (enforced by [`crate::storage::ConsentDatabase`]):
/// - `destroy_at` is strictly after `created_at`
/// - `consent_active` only ever transitions `true -> false`
/// - `destroyed` only ever transitions `false -> true`, clearing `ciphertext`
/// - `access_count` is bumped by exactly 1 per successful decrypt
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsentRecord {
    /// Unique record identifier.
    pub id: String,
    /// The data subject this record belongs to.
    pub subject_id: String,
    /// Ciphertext envelope; `None` once the record has been tombstoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<CipherEnvelope>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Retention window chosen at creation.
    pub retention_window: RetentionWindow,
    /// `created_at + retention_window`; decrypts are refused from this
    /// instant on, whether or not the sweeper has run yet.
    pub destroy_at: DateTime<Utc>,
    /// Consent latch. Starts true, may drop to false exactly once.
    pub consent_active: bool,
    /// Number of successful decrypts. Denied or failed attempts contribute 0.
    pub access_count: u64,
    /// Timestamp of the most recent successful decrypt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_at: Option<DateTime<Utc>>,
    /// Transaction amount, used only for risk tiering.
    pub amount: f64,
    /// Transaction currency code.
    pub currency: String,
    /// Tombstone latch. Once true the ciphertext is unrecoverable; the
    /// audit fields above survive.
    pub destroyed: bool,
}

impl ConsentRecord {
    /// Create a fresh record around a ciphertext envelope.
    ///
    /// Starts with consent granted, zero accesses, and a destruction
    /// deadline derived from the retention window.
    pub fn new(
        subject_id: String,
        ciphertext: CipherEnvelope,
        retention_window: RetentionWindow,
        amount: f64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            ciphertext: Some(ciphertext),
            created_at: now,
            retention_window,
            destroy_at: retention_window.destroy_at(now),
            consent_active: true,
            access_count: 0,
            last_access_at: None,
            amount,
            currency,
            destroyed: false,
        }
    }

    /// Current risk tier for display, derived from amount and access count.
    pub fn risk_tier(&self) -> RiskTier {
        crate::risk::classify(self.amount, self.access_count)
    }
}

// =============================================================================
// API Models
// =============================================================================

/// Request to create a consent record at transaction time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateConsentRequest {
    /// The data subject the PII belongs to.
    pub subject_id: String,
    /// Plaintext PII to hand to the cipher gateway. Never persisted.
    pub pii: PiiPayload,
    /// Transaction amount (risk tiering only).
    pub amount: f64,
    /// Transaction currency; defaults to INR.
    #[serde(default)]
    pub currency: Option<String>,
    /// Retention window for the ciphertext.
    pub retention_window: RetentionWindow,
}

/// A consent record together with its derived display state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConsentRecordView {
    #[serde(flatten)]
    pub record: ConsentRecord,
    /// Lifecycle state recomputed at read time.
    pub state: ConsentState,
    /// Display-only risk tier; never used for authorization.
    pub risk_tier: RiskTier,
}

impl ConsentRecordView {
    /// Snapshot a record's derived state as of `now`.
    pub fn at(record: ConsentRecord, now: DateTime<Utc>) -> Self {
        let state = ConsentState::of(&record, now);
        let risk_tier = record.risk_tier();
        Self {
            record,
            state,
            risk_tier,
        }
    }
}

/// Successful decrypt response: plaintext plus audit metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecryptResponse {
    pub data: DecryptedData,
    /// Access count after this decrypt.
    pub access_count: u64,
    /// When this decrypt happened.
    pub accessed_at: DateTime<Utc>,
    /// Risk tier recomputed with the new access count.
    pub risk_tier: RiskTier,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn retention_window_day_counts() {
        assert_eq!(RetentionWindow::ThreeDays.days(), 3);
        assert_eq!(RetentionWindow::OneWeek.days(), 7);
        assert_eq!(RetentionWindow::TwoWeeks.days(), 14);
        assert_eq!(RetentionWindow::ThreeWeeks.days(), 21);
    }

    #[test]
    fn retention_window_wire_names() {
        let json = serde_json::to_string(&RetentionWindow::OneWeek).unwrap();
        assert_eq!(json, r#""1Week""#);
        let parsed: RetentionWindow = serde_json::from_str(r#""3Days""#).unwrap();
        assert_eq!(parsed, RetentionWindow::ThreeDays);
    }

    #[test]
    fn new_record_has_strictly_later_destroy_at() {
        let record = sample_record(RetentionWindow::ThreeDays);
        assert!(record.destroy_at > record.created_at);
        assert_eq!(record.destroy_at - record.created_at, Duration::days(3));
        assert!(record.consent_active);
        assert!(!record.destroyed);
        assert_eq!(record.access_count, 0);
        assert!(record.last_access_at.is_none());
    }

    #[test]
    fn cipher_envelope_uses_camel_case_on_the_wire() {
        let envelope = sample_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("base64Encoded").is_some());
        assert!(json.get("originalDataType").is_some());
        assert_eq!(json["encrypted"]["algorithm"], "aes-256-cbc");
    }

    pub(crate) fn sample_envelope() -> CipherEnvelope {
        CipherEnvelope {
            platform: "secure-link".to_string(),
            base64_encoded: "c2VjcmV0".to_string(),
            encrypted: EncryptedBlob {
                algorithm: "aes-256-cbc".to_string(),
                iv: "0011223344556677".to_string(),
                content: "deadbeef".to_string(),
            },
            original_data_type: "user_data".to_string(),
        }
    }

    pub(crate) fn sample_record(window: RetentionWindow) -> ConsentRecord {
        ConsentRecord::new(
            "subject-1".to_string(),
            sample_envelope(),
            window,
            5000.0,
            DEFAULT_CURRENCY.to_string(),
        )
    }
}
