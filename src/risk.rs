// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Display-only risk tiering over transaction amount and access count.
//!
//! The classifier is a pure function with fixed thresholds. It feeds
//! dashboards and alerting and is never consulted for authorization —
//! the consent gate alone decides whether a decrypt may proceed.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Amount above which a record is at least medium risk.
const MEDIUM_AMOUNT_THRESHOLD: f64 = 2000.0;
/// Access count above which a record is at least medium risk.
const MEDIUM_ACCESS_THRESHOLD: u64 = 5;
/// Amount above which a record is high risk.
const HIGH_AMOUNT_THRESHOLD: f64 = 5000.0;
/// Access count above which a record is high risk.
const HIGH_ACCESS_THRESHOLD: u64 = 10;

/// Risk tier derived from `(amount, access_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// Classify a record's display risk tier.
///
/// High wins over medium; a record trips a tier when either the amount or
/// the access count exceeds that tier's threshold.
pub fn classify(amount: f64, access_count: u64) -> RiskTier {
    if amount > HIGH_AMOUNT_THRESHOLD || access_count > HIGH_ACCESS_THRESHOLD {
        RiskTier::High
    } else if amount > MEDIUM_AMOUNT_THRESHOLD || access_count > MEDIUM_ACCESS_THRESHOLD {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}
