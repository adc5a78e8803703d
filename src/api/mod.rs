// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod admin;
pub mod health;
pub mod offers;
pub mod transactions;
pub mod wallets;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/wallets", post(wallets::create_wallet))
        .route("/wallets/{wallet_id}", get(wallets::get_wallet))
        .route(
            "/wallets/{wallet_id}/transactions",
            get(wallets::list_transactions),
        )
        .route("/deposits", post(transactions::create_deposit))
        .route("/withdrawals", post(transactions::create_withdrawal))
        .route("/transactions/{tx_id}", get(transactions::get_transaction))
        .route(
            "/transactions/{tx_id}/cancel",
            post(transactions::cancel_transaction),
        )
        .route("/fees/quote", get(transactions::quote_fee))
        .route("/escrows", post(offers::open_escrow))
        .route("/escrows/{operation_id}", get(offers::get_escrow))
        .route("/escrows/{operation_id}/settle", post(offers::settle_escrow))
        .route("/escrows/{operation_id}/release", post(offers::release_escrow))
        .route("/webhooks/provider", post(webhooks::provider_webhook))
        .route(
            "/admin/transactions/{tx_id}/status",
            post(admin::override_transaction_status),
        )
        .route(
            "/admin/wallets/{wallet_id}/active",
            post(admin::set_wallet_active),
        )
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        wallets::create_wallet,
        wallets::get_wallet,
        wallets::list_transactions,
        transactions::create_deposit,
        transactions::create_withdrawal,
        transactions::get_transaction,
        transactions::cancel_transaction,
        transactions::quote_fee,
        offers::open_escrow,
        offers::get_escrow,
        offers::settle_escrow,
        offers::release_escrow,
        webhooks::provider_webhook,
        admin::override_transaction_status,
        admin::set_wallet_active,
        health::health
    ),
    components(
        schemas(
            crate::storage::records::StoredWallet,
            crate::storage::records::StoredTransaction,
            crate::storage::records::EscrowOperation,
            crate::storage::records::EscrowLeg,
            crate::storage::records::PayMethod,
            crate::storage::records::TxKind,
            crate::storage::records::TxStatus,
            crate::storage::records::EscrowOpStatus,
            crate::ledger::EscrowLegRequest,
            wallets::CreateWalletRequest,
            wallets::TransactionPage,
            transactions::CreateDepositRequest,
            transactions::CreateWithdrawalRequest,
            transactions::DepositResponse,
            transactions::FeeQuote,
            offers::OpenEscrowRequest,
            admin::OverrideStatusRequest,
            admin::SetWalletActiveRequest
        )
    ),
    tags(
        (name = "Wallets", description = "Custodial wallet management"),
        (name = "Transactions", description = "Deposits, withdrawals, and fees"),
        (name = "Escrow", description = "Two-party swap escrow"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Admin", description = "Operator corrections"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;
