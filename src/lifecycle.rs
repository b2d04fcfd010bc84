// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Consent Lifecycle Service
//!
//! Composes the consent gate, the cipher gateway client, and the access
//! auditor into the transactional operations exposed to callers:
//!
//! - **create**: encrypt PII at transaction time, persist the record with
//!   the ciphertext envelope, retention deadline, and consent granted.
//! - **revoke**: drop the consent latch, terminally.
//! - **decrypt**: authorize against current record state, decode via the
//!   gateway, then atomically bump the access counter.
//!
//! ## Decrypt ordering
//!
//! The gate check always runs before the gateway call — a denial never
//! reaches the gateway, and a gateway failure never increments the
//! counter. If the post-decode counter update loses a race against a
//! concurrent tombstone, the already-decoded plaintext is still returned
//! (the data was legitimately accessible at decode time); the update is
//! retried once and then logged as a missed-audit event. Re-encrypting to
//! "undo" a successful decode is not meaningful, so audit completeness is
//! favored over strict all-or-nothing atomicity here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::gate::{self, AccessDenied};
use crate::gateway::{CipherGateway, GatewayError};
use crate::models::{
    ConsentRecord, ConsentRecordView, CreateConsentRequest, DecryptResponse, DEFAULT_CURRENCY,
};
use crate::storage::{
    AuditEvent, AuditEventType, AuditLog, ConsentDatabase, ConsentDbError,
};

/// Default ceiling on a whole decrypt call. Sized to the gateway client's
/// full operation budget, so a slow first attempt still leaves room for
/// the client's remaining retries.
const DEFAULT_DECRYPT_TIMEOUT: Duration = crate::gateway::OPERATION_BUDGET;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("consent record not found: {0}")]
    NotFound(String),

    #[error("consent has been revoked for record {0}")]
    ConsentRevoked(String),

    #[error("retention window has elapsed for record {0}")]
    RecordExpired(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A latch transition lost a race — someone else already applied it.
    #[error("concurrent modification on record {0}")]
    Concurrent(String),

    #[error("storage error: {0}")]
    Storage(ConsentDbError),
}

impl LifecycleError {
    /// Map store-level failures onto the caller-facing taxonomy.
    fn from_db(record_id: &str, err: ConsentDbError) -> Self {
        match err {
            ConsentDbError::NotFound(_) => LifecycleError::NotFound(record_id.to_string()),
            ConsentDbError::AlreadyRevoked(_) | ConsentDbError::AlreadyTombstoned(_) => {
                LifecycleError::Concurrent(record_id.to_string())
            }
            other => LifecycleError::Storage(other),
        }
    }

    fn from_denial(record_id: &str, denial: AccessDenied) -> Self {
        match denial {
            AccessDenied::ConsentRevoked => LifecycleError::ConsentRevoked(record_id.to_string()),
            AccessDenied::RecordExpired => LifecycleError::RecordExpired(record_id.to_string()),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// The consent lifecycle engine.
///
/// Generic over the gateway seam so tests can script encode/decode without
/// a network.
pub struct ConsentService<G: CipherGateway> {
    db: Arc<ConsentDatabase>,
    audit: Arc<AuditLog>,
    gateway: G,
    decrypt_timeout: Duration,
}

impl<G: CipherGateway> ConsentService<G> {
    pub fn new(db: Arc<ConsentDatabase>, audit: Arc<AuditLog>, gateway: G) -> Self {
        Self {
            db,
            audit,
            gateway,
            decrypt_timeout: DEFAULT_DECRYPT_TIMEOUT,
        }
    }

    /// Override the decrypt timeout (mainly for tests).
    pub fn with_decrypt_timeout(mut self, timeout: Duration) -> Self {
        self.decrypt_timeout = timeout;
        self
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Encrypt PII and persist a new consent record atomically with the
    /// ciphertext envelope. The plaintext never touches storage.
    pub async fn create(&self, request: CreateConsentRequest) -> LifecycleResult<ConsentRecord> {
        let envelope = self.gateway.encode(&request.pii).await?;

        let currency = request
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let record = ConsentRecord::new(
            request.subject_id,
            envelope,
            request.retention_window,
            request.amount,
            currency,
        );

        self.db
            .insert_record(&record)
            .map_err(|e| LifecycleError::from_db(&record.id, e))?;

        self.audit.record(
            AuditEvent::new(AuditEventType::ConsentCreated, &record.id)
                .with_subject(&record.subject_id)
                .with_details(json!({
                    "amount": record.amount,
                    "currency": record.currency,
                    "retention_window": record.retention_window,
                    "destroy_at": record.destroy_at,
                })),
        );

        info!(
            record_id = %record.id,
            subject_id = %record.subject_id,
            destroy_at = %record.destroy_at,
            "Consent record created"
        );

        Ok(record)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load a record with its derived state and risk tier.
    pub fn get_view(&self, record_id: &str) -> LifecycleResult<ConsentRecordView> {
        let record = self
            .db
            .get(record_id)
            .map_err(LifecycleError::Storage)?
            .ok_or_else(|| LifecycleError::NotFound(record_id.to_string()))?;
        Ok(ConsentRecordView::at(record, Utc::now()))
    }

    /// List a subject's records with derived state, newest first.
    pub fn list_views(&self, subject_id: &str) -> LifecycleResult<Vec<ConsentRecordView>> {
        let now = Utc::now();
        let records = self
            .db
            .list_by_subject(subject_id)
            .map_err(LifecycleError::Storage)?;
        Ok(records
            .into_iter()
            .map(|r| ConsentRecordView::at(r, now))
            .collect())
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Withdraw consent for a record. Terminal — there is no way back.
    pub fn revoke(&self, record_id: &str) -> LifecycleResult<()> {
        self.db
            .try_revoke(record_id)
            .map_err(|e| LifecycleError::from_db(record_id, e))?;

        self.audit
            .record(AuditEvent::new(AuditEventType::ConsentRevoked, record_id));

        info!(record_id = %record_id, "Consent revoked");
        Ok(())
    }

    // =========================================================================
    // Decrypt orchestration
    // =========================================================================

    /// Authorize, decode, and audit a decrypt attempt.
    pub async fn decrypt(&self, record_id: &str) -> LifecycleResult<DecryptResponse> {
        let record = self
            .db
            .get(record_id)
            .map_err(LifecycleError::Storage)?
            .ok_or_else(|| LifecycleError::NotFound(record_id.to_string()))?;

        // Policy check first. A denial never reaches the gateway.
        if let Err(denial) = gate::authorize(&record, Utc::now()) {
            self.audit.record(
                AuditEvent::new(AuditEventType::AccessDenied, record_id)
                    .with_subject(&record.subject_id)
                    .with_details(json!({ "reason": denial.to_string() })),
            );
            return Err(LifecycleError::from_denial(record_id, denial));
        }

        // Authorized implies not destroyed, so the envelope is present.
        let envelope = record
            .ciphertext
            .as_ref()
            .ok_or_else(|| LifecycleError::RecordExpired(record_id.to_string()))?;

        let data = match tokio::time::timeout(self.decrypt_timeout, self.gateway.decode(envelope))
            .await
        {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(record_id = %record_id, error = %e, "Gateway decode failed");
                return Err(LifecycleError::Gateway(e));
            }
            Err(_) => {
                warn!(record_id = %record_id, "Gateway decode timed out");
                return Err(LifecycleError::Gateway(GatewayError::Timeout));
            }
        };

        let accessed_at = Utc::now();
        let access_count = match self.db.try_increment_access(record_id, accessed_at) {
            Ok(count) => Some(count),
            Err(first) => {
                // Lost a race against a concurrent tombstone/revoke; the
                // plaintext is already in hand, so retry the audit update
                // once rather than discarding a legitimate access.
                warn!(record_id = %record_id, error = %first, "Access count update failed, retrying");
                match self.db.try_increment_access(record_id, accessed_at) {
                    Ok(count) => Some(count),
                    Err(second) => {
                        warn!(record_id = %record_id, error = %second, "Access count update lost");
                        self.audit.record(
                            AuditEvent::new(AuditEventType::AuditUpdateMissed, record_id)
                                .with_subject(&record.subject_id)
                                .with_details(json!({ "error": second.to_string() })),
                        );
                        None
                    }
                }
            }
        };

        let counted = access_count.is_some();
        let access_count = access_count.unwrap_or(record.access_count + 1);

        if counted {
            self.audit.record(
                AuditEvent::new(AuditEventType::DataAccessed, record_id)
                    .with_subject(&record.subject_id)
                    .with_details(json!({ "access_count": access_count })),
            );
        }

        info!(
            record_id = %record_id,
            access_count,
            "Decrypt succeeded"
        );

        Ok(DecryptResponse {
            data,
            access_count,
            accessed_at,
            risk_tier: crate::risk::classify(record.amount, access_count),
        })
    }
}
