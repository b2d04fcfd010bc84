// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secure Link Vault - Consent-Gated Encrypted PII Lifecycle Service
//!
//! At transaction time PII is encrypted by an external cipher gateway and
//! only the ciphertext envelope is retained. The data subject can revoke
//! consent at any time, records carry a bounded retention window after
//! which they are tombstoned, and every successful decrypt is counted and
//! timestamped for audit.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `gate` - Consent state derivation and decrypt authorization
//! - `gateway` - Cipher gateway HTTP client
//! - `lifecycle` - Create / revoke / decrypt orchestration
//! - `storage` - Embedded record database (redb) and audit log
//! - `sweeper` - Background retention sweep

pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod risk;
pub mod state;
pub mod storage;
pub mod sweeper;
