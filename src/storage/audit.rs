// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for the consent lifecycle.
//!
//! Every lifecycle action — record creation, revocation, successful and
//! denied decrypts, destruction — is appended to a daily JSONL log so the
//! access history survives independently of the records themselves. The
//! per-record counters (`access_count`, `last_access_at`) live on the
//! record; this log is the narrative trail behind them.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Record lifecycle
    ConsentCreated,
    ConsentRevoked,
    RecordDestroyed,

    // Access events
    DataAccessed,
    AccessDenied,

    // The post-decode audit update failed twice; plaintext was already
    // returned to the caller.
    AuditUpdateMissed,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Consent record affected.
    pub record_id: String,
    /// Data subject the record belongs to (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event for a record.
    pub fn new(event_type: AuditEventType, record_id: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            record_id: record_id.into(),
            subject_id: None,
            details: None,
        }
    }

    /// Set the data subject.
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Append-only daily audit log.
///
/// Events are appended to `{dir}/{date}.jsonl`, one JSON object per line.
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Create a log rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> AuditResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{date}.jsonl"))
    }

    /// Append an audit event to the day's log file.
    pub fn log(&self, event: &AuditEvent) -> AuditResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.file_for(&date);

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        use std::io::Write;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Log an event, downgrading failures to a warning.
    ///
    /// The audit log must never take down the operation it is describing;
    /// callers that need hard failures use [`AuditLog::log`] directly.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                record_id = %event.record_id,
                event_type = ?event.event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Read all audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> AuditResult<Vec<AuditEvent>> {
        let path = self.file_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Events touching a specific record on a given date.
    pub fn events_for_record(&self, record_id: &str, date: &str) -> AuditResult<Vec<AuditEvent>> {
        let events = self.read_events(date)?;
        Ok(events
            .into_iter()
            .filter(|e| e.record_id == record_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AuditLog) {
        let temp = TempDir::new().unwrap();
        let log = AuditLog::open(temp.path().join("audit")).unwrap();
        (temp, log)
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::DataAccessed, "rec-1")
            .with_subject("subject-1")
            .with_details(serde_json::json!({ "access_count": 4 }));

        assert_eq!(event.event_type, AuditEventType::DataAccessed);
        assert_eq!(event.record_id, "rec-1");
        assert_eq!(event.subject_id, Some("subject-1".to_string()));
        assert!(event.details.is_some());
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, log) = setup();

        log.log(&AuditEvent::new(AuditEventType::ConsentCreated, "rec-1"))
            .unwrap();
        log.log(&AuditEvent::new(AuditEventType::DataAccessed, "rec-1"))
            .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = log.read_events(&today).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::ConsentCreated);
        assert_eq!(events[1].event_type, AuditEventType::DataAccessed);
    }

    #[test]
    fn read_events_for_missing_date_is_empty() {
        let (_temp, log) = setup();
        assert!(log.read_events("1999-01-01").unwrap().is_empty());
    }

    #[test]
    fn events_for_record_filters() {
        let (_temp, log) = setup();

        log.log(&AuditEvent::new(AuditEventType::ConsentCreated, "rec-a"))
            .unwrap();
        log.log(&AuditEvent::new(AuditEventType::ConsentRevoked, "rec-a"))
            .unwrap();
        log.log(&AuditEvent::new(AuditEventType::ConsentCreated, "rec-b"))
            .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = log.events_for_record("rec-a", &today).unwrap();

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.record_id == "rec-a"));
    }
}
