// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the record database and audit logs | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `GATEWAY_BASE_URL` | Cipher gateway base URL | secure-link sandbox |
//! | `GATEWAY_PLATFORM` | Platform tag sent on encode requests | `secure-link` |
//! | `SWEEP_INTERVAL_SECS` | Seconds between retention sweep cycles | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the data directory path.
///
/// Holds `consents.redb` and the `audit/` JSONL directory.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the cipher gateway base URL.
pub const GATEWAY_BASE_URL_ENV: &str = "GATEWAY_BASE_URL";

/// Environment variable name for the gateway platform tag.
pub const GATEWAY_PLATFORM_ENV: &str = "GATEWAY_PLATFORM";

/// Environment variable name for the sweep interval in seconds.
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_SECS";
