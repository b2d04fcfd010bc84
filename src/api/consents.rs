// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    gateway::CipherGateway,
    models::{ConsentRecordView, CreateConsentRequest, DecryptResponse},
    state::AppState,
};

#[derive(Deserialize, IntoParams)]
pub struct SubjectQuery {
    pub subject_id: String,
}

#[utoipa::path(
    post,
    path = "/v1/consents",
    request_body = CreateConsentRequest,
    tag = "Consents",
    responses(
        (status = 201, body = ConsentRecordView),
        (status = 502, description = "Cipher gateway unavailable")
    )
)]
pub async fn create_consent<G: CipherGateway>(
    State(state): State<AppState<G>>,
    Json(request): Json<CreateConsentRequest>,
) -> Result<(StatusCode, Json<ConsentRecordView>), ApiError> {
    if request.subject_id.is_empty() {
        return Err(ApiError::bad_request("subject_id must not be empty"));
    }
    let record = state.service.create(request).await?;
    let view = ConsentRecordView::at(record, chrono::Utc::now());
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    get,
    path = "/v1/consents",
    params(SubjectQuery),
    tag = "Consents",
    responses((status = 200, body = [ConsentRecordView]))
)]
pub async fn list_consents<G: CipherGateway>(
    State(state): State<AppState<G>>,
    Query(params): Query<SubjectQuery>,
) -> Result<Json<Vec<ConsentRecordView>>, ApiError> {
    Ok(Json(state.service.list_views(&params.subject_id)?))
}

#[utoipa::path(
    get,
    path = "/v1/consents/{record_id}",
    params(
        ("record_id" = String, Path, description = "Identifier of the consent record")
    ),
    tag = "Consents",
    responses(
        (status = 200, body = ConsentRecordView),
        (status = 404, description = "Record not found")
    )
)]
pub async fn get_consent<G: CipherGateway>(
    Path(record_id): Path<String>,
    State(state): State<AppState<G>>,
) -> Result<Json<ConsentRecordView>, ApiError> {
    Ok(Json(state.service.get_view(&record_id)?))
}

#[utoipa::path(
    post,
    path = "/v1/consents/{record_id}/revoke",
    params(
        ("record_id" = String, Path, description = "Identifier of the consent record")
    ),
    tag = "Consents",
    responses(
        (status = 204, description = "Consent revoked"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Consent was already revoked")
    )
)]
pub async fn revoke_consent<G: CipherGateway>(
    Path(record_id): Path<String>,
    State(state): State<AppState<G>>,
) -> Result<StatusCode, ApiError> {
    state.service.revoke(&record_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/consents/{record_id}/decrypt",
    params(
        ("record_id" = String, Path, description = "Identifier of the consent record")
    ),
    tag = "Consents",
    responses(
        (status = 200, body = DecryptResponse),
        (status = 403, description = "Consent revoked"),
        (status = 410, description = "Retention window elapsed"),
        (status = 502, description = "Cipher gateway unavailable")
    )
)]
pub async fn decrypt_consent<G: CipherGateway>(
    Path(record_id): Path<String>,
    State(state): State<AppState<G>>,
) -> Result<Json<DecryptResponse>, ApiError> {
    Ok(Json(state.service.decrypt(&record_id).await?))
}
