// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cambio_server::api::router;
use cambio_server::config::{Config, LOG_FORMAT_ENV};
use cambio_server::ledger::{
    EscrowEngine, FeeSchedule, SettlementEngine, WalletLocks, WebhookReconciler,
};
use cambio_server::providers::flutterwave::FlutterwaveClient;
use cambio_server::providers::kyc::{KycClient, StaticKycVerifier};
use cambio_server::providers::mock::MockProvider;
use cambio_server::providers::{KycVerifier, PaymentProvider};
use cambio_server::state::AppState;
use cambio_server::storage::LedgerDb;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());
    if format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn select_provider() -> Arc<dyn PaymentProvider> {
    if FlutterwaveClient::is_configured() {
        match FlutterwaveClient::from_env() {
            Ok(client) => {
                info!("using Flutterwave payment provider");
                return Arc::new(client);
            }
            Err(e) => warn!(error = %e, "Flutterwave configuration invalid, falling back to mock"),
        }
    }
    warn!("FLW_SECRET_KEY not set, using mock payment provider");
    Arc::new(MockProvider::new())
}

fn select_kyc() -> Arc<dyn KycVerifier> {
    if KycClient::is_configured() {
        match KycClient::from_env() {
            Ok(client) => {
                info!("using external KYC verification service");
                return Arc::new(client);
            }
            Err(e) => warn!(error = %e, "KYC configuration invalid, falling back to allow-all"),
        }
    }
    warn!("KYC service not configured, all users treated as verified");
    Arc::new(StaticKycVerifier)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let db = match LedgerDb::open(&config.ledger_db_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("failed to open ledger database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let locks = Arc::new(WalletLocks::new(config.wallet_lock_timeout));
    let settlement = Arc::new(SettlementEngine::new(
        db.clone(),
        locks.clone(),
        FeeSchedule::standard(),
        select_provider(),
        select_kyc(),
    ));
    let escrow = Arc::new(EscrowEngine::new(db.clone(), locks));
    let reconciler = Arc::new(WebhookReconciler::new(db.clone(), &config.webhook_secret));

    let state = AppState::new(db, settlement, escrow, reconciler, &config.auth_secret);
    let app = router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid bind address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(%addr, "cambio server listening (docs at /docs)");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
