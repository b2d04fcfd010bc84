// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cipher gateway integration for PII encryption and decryption.
//!
//! The gateway is an external HTTPS JSON service exposing `/encode-data`
//! and `/decode-data`. It is treated as an unreliable remote dependency:
//! every call has a bounded timeout, transient failures (transport errors,
//! 5xx) are retried a limited number of times with exponential backoff,
//! and 4xx responses are permanent failures surfaced immediately.

use std::{future::Future, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::models::{CipherEnvelope, DecryptedData, EncryptedBlob, PiiPayload};

const DEFAULT_BASE_URL: &str = "https://secure-link-backend.vercel.app";
const DEFAULT_PLATFORM: &str = "secure-link";

/// Value stamped on every envelope; the decode endpoint requires it.
const ORIGINAL_DATA_TYPE: &str = "user_data";

/// Per-request timeout for gateway calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Total attempts per operation, including the first.
pub(crate) const MAX_ATTEMPTS: u32 = 3;
/// Base delay for exponential backoff between attempts.
const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Worst-case duration of one logical gateway operation: every attempt's
/// request timeout plus the backoff pauses between attempts. Callers that
/// wrap a gateway call in their own deadline must allow at least this much,
/// otherwise the retry loop can never reach attempts two and three.
pub(crate) const OPERATION_BUDGET: Duration = Duration::from_millis(
    REQUEST_TIMEOUT.as_millis() as u64 * MAX_ATTEMPTS as u64
        + BACKOFF_BASE.as_millis() as u64 * ((1u64 << (MAX_ATTEMPTS - 1)) - 1),
);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("cipher gateway configuration missing: {0}")]
    MissingConfig(String),

    #[error("cipher gateway request failed: {0}")]
    Request(String),

    #[error("cipher gateway timed out")]
    Timeout,

    #[error("cipher gateway rejected the request: {0}")]
    Rejected(String),

    #[error("cipher gateway response was invalid: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Transient failures are worth retrying; the rest are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Request(_) | GatewayError::Timeout)
    }
}

/// Seam over the external encrypt/decrypt service.
///
/// The orchestrator is generic over this trait so tests can substitute a
/// scripted gateway without a network.
pub trait CipherGateway: Clone + Send + Sync + 'static {
    /// Encrypt a PII payload into a ciphertext envelope. Stateless.
    fn encode(
        &self,
        pii: &PiiPayload,
    ) -> impl Future<Output = Result<CipherEnvelope, GatewayError>> + Send;

    /// Decrypt a ciphertext envelope back into PII. Stateless.
    fn decode(
        &self,
        envelope: &CipherEnvelope,
    ) -> impl Future<Output = Result<DecryptedData, GatewayError>> + Send;
}

// =============================================================================
// HTTP client
// =============================================================================

/// HTTP client for the cipher gateway.
#[derive(Debug, Clone)]
pub struct HttpCipherGateway {
    base_url: String,
    platform: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodeResponse {
    encrypted: EncryptedBlob,
    base64_encoded: String,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    data: DecryptedData,
}

impl HttpCipherGateway {
    /// Build a client against an explicit base URL and platform tag.
    pub fn new(base_url: impl Into<String>, platform: impl Into<String>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            platform: platform.into(),
            http,
        })
    }

    /// Build a client from `GATEWAY_BASE_URL` / `GATEWAY_PLATFORM`.
    pub fn from_env() -> Result<Self, GatewayError> {
        let base_url = env_or_default(crate::config::GATEWAY_BASE_URL_ENV, DEFAULT_BASE_URL);
        let platform = env_or_default(crate::config::GATEWAY_PLATFORM_ENV, DEFAULT_PLATFORM);
        if base_url.is_empty() {
            return Err(GatewayError::MissingConfig(
                crate::config::GATEWAY_BASE_URL_ENV.to_string(),
            ));
        }
        Self::new(base_url, platform)
    }

    /// POST a JSON payload with bounded retries on transient failure.
    async fn post_json(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut attempt = 1u32;

        loop {
            match self.post_once(&url, payload).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Cipher gateway call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            // Malformed envelope or bad request: permanent, never retried.
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Request(format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

impl CipherGateway for HttpCipherGateway {
    async fn encode(&self, pii: &PiiPayload) -> Result<CipherEnvelope, GatewayError> {
        let payload = json!({
            "platform": self.platform,
            "name": pii.name,
            "phone": pii.phone,
            "email": pii.email,
        });

        let response = self.post_json("/encode-data", &payload).await?;
        let parsed: EncodeResponse = serde_json::from_value(response)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(CipherEnvelope {
            platform: self.platform.clone(),
            base64_encoded: parsed.base64_encoded,
            encrypted: parsed.encrypted,
            original_data_type: ORIGINAL_DATA_TYPE.to_string(),
        })
    }

    async fn decode(&self, envelope: &CipherEnvelope) -> Result<DecryptedData, GatewayError> {
        let payload = json!({
            "platform": envelope.platform,
            "base64Encoded": envelope.base64_encoded,
            "encrypted": {
                "algorithm": envelope.encrypted.algorithm,
                "iv": envelope.encrypted.iv,
                "content": envelope.encrypted.content,
            },
            "originalDataType": envelope.original_data_type,
        });

        let response = self.post_json("/decode-data", &payload).await?;
        let parsed: DecodeResponse = serde_json::from_value(response)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(parsed.data)
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

// =============================================================================
// Test doubles
// =============================================================================
