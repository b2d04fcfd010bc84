// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state for the consent lifecycle, rooted at `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   consents.redb        # Embedded record database (redb, ACID)
//!   audit/
//!     {date}.jsonl       # Daily audit event logs
//! ```
//!
//! ## Concurrency Model
//!
//! The consent record is the only shared mutable resource in the system.
//! All mutation goes through [`ConsentDatabase`]'s compare-and-swap style
//! operations — one redb write transaction per mutation — so the decrypt
//! path and the retention sweeper never need their own locks, and racing
//! latch transitions resolve to exactly one winner.

pub mod audit;
pub mod consent_database;

pub use audit::{AuditError, AuditEvent, AuditEventType, AuditLog, AuditResult};
pub use consent_database::{ConsentDatabase, ConsentDbError, ConsentDbResult};
