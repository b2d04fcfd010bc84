// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use secure_link_vault::api::router;
use secure_link_vault::config::{DATA_DIR_ENV, SWEEP_INTERVAL_ENV};
use secure_link_vault::gateway::HttpCipherGateway;
use secure_link_vault::lifecycle::ConsentService;
use secure_link_vault::state::AppState;
use secure_link_vault::storage::{AuditLog, ConsentDatabase};
use secure_link_vault::sweeper::RetentionSweeper;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    if format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let data_dir = PathBuf::from(env::var(DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string()));

    let db = Arc::new(
        ConsentDatabase::open(&data_dir.join("consents.redb"))
            .expect("Failed to open consent database"),
    );
    let audit =
        Arc::new(AuditLog::open(data_dir.join("audit")).expect("Failed to open audit log"));

    let gateway = HttpCipherGateway::from_env().expect("Failed to configure cipher gateway");
    let service = ConsentService::new(db.clone(), audit.clone(), gateway);
    let state = AppState::new(service, audit.clone());

    // Background retention sweeper, stopped via the shared cancellation token.
    let shutdown = CancellationToken::new();
    let mut sweeper = RetentionSweeper::new(db, audit);
    if let Ok(secs) = env::var(SWEEP_INTERVAL_ENV) {
        if let Ok(secs) = secs.parse::<u64>() {
            sweeper = sweeper.with_interval(Duration::from_secs(secs));
        }
    }
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let app = router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .expect("Failed to bind server address");

    tracing::info!(
        addr = %listener.local_addr().expect("listener has a local address"),
        "Secure Link Vault listening (docs at /docs)"
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .expect("Server failed");

    // Wait for the sweeper to observe the cancellation and exit cleanly.
    let _ = sweeper_handle.await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
