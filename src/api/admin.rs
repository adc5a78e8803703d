// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for operator corrections.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::AdminOnly;
use crate::error::ApiError;
use crate::ledger::LedgerError;
use crate::state::AppState;
use crate::storage::ledger_db::FailureInfo;
use crate::storage::records::{StoredTransaction, StoredWallet, TxStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OverrideStatusRequest {
    /// Terminal status to force, subject to the transition table.
    pub status: TxStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetWalletActiveRequest {
    pub active: bool,
}

/// Force a transaction status; resolves in-doubt withdrawals and stuck
/// deposits when the provider never calls back.
#[utoipa::path(
    post,
    path = "/v1/admin/transactions/{tx_id}/status",
    tag = "Admin",
    params(("tx_id" = String, Path, description = "Transaction identifier")),
    request_body = OverrideStatusRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction after the override", body = StoredTransaction),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Transaction not found"),
        (status = 422, description = "Transition not allowed")
    )
)]
pub async fn override_transaction_status(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
    Json(request): Json<OverrideStatusRequest>,
) -> Result<Json<StoredTransaction>, ApiError> {
    let failure = match (request.error_code, request.error_message) {
        (None, None) => None,
        (code, message) => Some(FailureInfo {
            code: code.unwrap_or_else(|| "operator_override".to_string()),
            message: message.unwrap_or_default(),
        }),
    };

    info!(admin = %admin.user_id, %tx_id, status = ?request.status, "operator status override requested");
    let tx = state.settlement.force_status(&tx_id, request.status, failure)?;
    Ok(Json(tx))
}

/// Soft-enable or soft-disable a wallet.
#[utoipa::path(
    post,
    path = "/v1/admin/wallets/{wallet_id}/active",
    tag = "Admin",
    params(("wallet_id" = String, Path, description = "Wallet identifier")),
    request_body = SetWalletActiveRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet after the change", body = StoredWallet),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn set_wallet_active(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Json(request): Json<SetWalletActiveRequest>,
) -> Result<Json<StoredWallet>, ApiError> {
    info!(admin = %admin.user_id, %wallet_id, active = request.active, "wallet activation change");
    let wallet = state
        .db
        .set_wallet_active(&wallet_id, request.active)
        .map_err(LedgerError::from)?;
    Ok(Json(wallet))
}
