// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    gate::ConsentState,
    gateway::CipherGateway,
    models::{
        CipherEnvelope, ConsentRecord, ConsentRecordView, CreateConsentRequest, DecryptResponse,
        DecryptedData, EncryptedBlob, PiiPayload, RetentionWindow,
    },
    risk::RiskTier,
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod audit;
pub mod consents;
pub mod health;

pub fn router<G: CipherGateway>(state: AppState<G>) -> Router {
    let v1_routes = Router::new()
        .route(
            "/consents",
            get(consents::list_consents::<G>).post(consents::create_consent::<G>),
        )
        .route("/consents/{record_id}", get(consents::get_consent::<G>))
        .route(
            "/consents/{record_id}/revoke",
            post(consents::revoke_consent::<G>),
        )
        .route(
            "/consents/{record_id}/decrypt",
            post(consents::decrypt_consent::<G>),
        )
        .route("/audit/events", get(audit::list_audit_events::<G>))
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        consents::create_consent,
        consents::list_consents,
        consents::get_consent,
        consents::revoke_consent,
        consents::decrypt_consent,
        audit::list_audit_events,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            ConsentRecord,
            ConsentRecordView,
            ConsentState,
            CreateConsentRequest,
            CipherEnvelope,
            EncryptedBlob,
            PiiPayload,
            DecryptedData,
            DecryptResponse,
            RetentionWindow,
            RiskTier,
            AuditEvent,
            AuditEventType,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Consents", description = "Consent record lifecycle"),
        (name = "Audit", description = "Access audit trail"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::StaticGateway;
    use crate::lifecycle::ConsentService;
    use crate::storage::{AuditLog, ConsentDatabase};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let temp = TempDir::new().unwrap();
        let db = Arc::new(ConsentDatabase::open(&temp.path().join("consents.redb")).unwrap());
        let audit = Arc::new(AuditLog::open(temp.path().join("audit")).unwrap());
        let service = ConsentService::new(db, audit.clone(), StaticGateway::default());
        let state = AppState::new(service, audit);

        let app = router(state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }
}
