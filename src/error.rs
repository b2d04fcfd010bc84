// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::lifecycle::LifecycleError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Map lifecycle failures onto HTTP statuses.
///
/// Policy denials are distinguishable from infrastructure failures:
/// revocation is 403, expiry is 410, a gateway outage is 502, and a lost
/// latch race is 409. A denial is never converted into stale plaintext.
impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        let status = match &err {
            LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::ConsentRevoked(_) => StatusCode::FORBIDDEN,
            LifecycleError::RecordExpired(_) => StatusCode::GONE,
            LifecycleError::Gateway(_) => StatusCode::BAD_GATEWAY,
            LifecycleError::Concurrent(_) => StatusCode::CONFLICT,
            LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}
