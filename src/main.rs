// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;

use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keyhaven::api::router;
use keyhaven::config::{Config, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV};
use keyhaven::session::SessionSweeper;
use keyhaven::state::AppState;
use keyhaven::storage::{Ledger, StoragePaths};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn fatal(message: &str, detail: impl std::fmt::Display) -> ! {
    error!(error = %detail, "{message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let mut config = Config::from_env().unwrap_or_else(|e| fatal("Invalid configuration", e));

    let paths = StoragePaths::new(&config.data_dir);
    let ledger = Ledger::open(&paths.ledger_db())
        .unwrap_or_else(|e| fatal("Failed to open ledger", e));
    info!(path = %paths.ledger_db().display(), "Ledger opened");

    if let Some(settings) = config.bootstrap.take() {
        let bootstrap = settings
            .into_bootstrap()
            .unwrap_or_else(|e| fatal("Invalid bootstrap administrator", e));
        ledger
            .bootstrap(&bootstrap)
            .unwrap_or_else(|e| fatal("Failed to bootstrap ledger", e));
    }
    match ledger.is_initialized() {
        Ok(true) => {}
        Ok(false) => warn!(
            "Ledger has no supergroup yet; set SUPER_GROUP_PUBLIC_KEY and SUPER_GROUP_SEALED_KEY"
        ),
        Err(e) => fatal("Failed to read ledger", e),
    }

    let state = AppState::new(ledger, config.session);
    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(SessionSweeper::new(state.sessions.clone()).run(shutdown.clone()));
    let app = router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .unwrap_or_else(|e| fatal("Failed to parse bind address", e));

    let server = async move {
        match &config.tls {
            Some(tls) => {
                let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .unwrap_or_else(|e| fatal("Failed to load TLS certificate", e));
                info!("Keyhaven listening on https://{addr}");
                axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await
            }
            None => {
                warn!("TLS_CERT_PATH not set, serving plain HTTP");
                info!("Keyhaven listening on http://{addr}");
                axum_server::bind(addr).serve(app.into_make_service()).await
            }
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "Server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Session sweeper task failed");
    }
}
