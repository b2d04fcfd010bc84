// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{error::ApiError, gateway::CipherGateway, state::AppState, storage::AuditEvent};

#[derive(Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Date to read events for, `YYYY-MM-DD`.
    pub date: String,
    /// Restrict to a single record.
    pub record_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/audit/events",
    params(AuditQuery),
    tag = "Audit",
    responses((status = 200, body = [AuditEvent]))
)]
pub async fn list_audit_events<G: CipherGateway>(
    State(state): State<AppState<G>>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    if chrono::NaiveDate::parse_from_str(&params.date, "%Y-%m-%d").is_err() {
        return Err(ApiError::bad_request("date must be YYYY-MM-DD"));
    }

    let events = match &params.record_id {
        Some(record_id) => state.audit.events_for_record(record_id, &params.date),
        None => state.audit.read_events(&params.date),
    }
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::StaticGateway;
    use crate::lifecycle::ConsentService;
    use crate::storage::{AuditEventType, AuditLog, ConsentDatabase};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_state() -> (TempDir, AppState<StaticGateway>) {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(ConsentDatabase::open(&temp.path().join("consents.redb")).unwrap());
        let audit = Arc::new(AuditLog::open(temp.path().join("audit")).unwrap());
        let service = ConsentService::new(db, audit.clone(), StaticGateway::default());
        (temp, AppState::new(service, audit))
    }

    #[tokio::test]
    async fn rejects_malformed_date() {
        let (_temp, state) = test_state();
        let err = list_audit_events(
            State(state),
            Query(AuditQuery {
                date: "today".to_string(),
                record_id: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reads_events_logged_today() {
        let (_temp, state) = test_state();
        state
            .audit
            .record(crate::storage::AuditEvent::new(
                AuditEventType::ConsentCreated,
                "rec-1",
            ));

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let Json(events) = list_audit_events(
            State(state),
            Query(AuditQuery {
                date: today,
                record_id: Some("rec-1".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::ConsentCreated);
    }
}
