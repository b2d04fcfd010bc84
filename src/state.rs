// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::gateway::CipherGateway;
use crate::lifecycle::ConsentService;
use crate::storage::AuditLog;

/// Shared application state, generic over the cipher gateway seam so the
/// API layer can be exercised with a scripted gateway in tests.
pub struct AppState<G: CipherGateway> {
    pub service: Arc<ConsentService<G>>,
    pub audit: Arc<AuditLog>,
}

impl<G: CipherGateway> AppState<G> {
    pub fn new(service: ConsentService<G>, audit: Arc<AuditLog>) -> Self {
        Self {
            service: Arc::new(service),
            audit,
        }
    }
}

impl<G: CipherGateway> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            audit: self.audit.clone(),
        }
    }
}
