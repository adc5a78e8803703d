// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet management API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::ledger::LedgerError;
use crate::state::AppState;
use crate::storage::records::{currency_for_country, StoredTransaction, StoredWallet};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWalletRequest {
    /// ISO 3166 country code the wallet's currency is derived from.
    pub country_code: String,
    /// Explicit currency override; wins over the country mapping.
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionPage {
    pub transactions: Vec<StoredTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Create (or return) the caller's wallet for a currency.
#[utoipa::path(
    post,
    path = "/v1/wallets",
    tag = "Wallets",
    request_body = CreateWalletRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Wallet created or already present", body = StoredWallet),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<StoredWallet>), ApiError> {
    let currency = match request.currency {
        Some(currency) => {
            let currency = currency.trim().to_ascii_uppercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ApiError::bad_request("currency must be a 3-letter ISO code"));
            }
            currency
        }
        None => currency_for_country(&request.country_code).to_string(),
    };

    let wallet = state
        .db
        .create_wallet(&user.user_id, &currency)
        .map_err(LedgerError::from)?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

/// Fetch one of the caller's wallets.
#[utoipa::path(
    get,
    path = "/v1/wallets/{wallet_id}",
    tag = "Wallets",
    params(("wallet_id" = String, Path, description = "Wallet identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet", body = StoredWallet),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_wallet(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<StoredWallet>, ApiError> {
    let wallet = state.settlement.wallet_for_user(&user.user_id, &wallet_id)?;
    Ok(Json(wallet))
}

/// Newest-first page of a wallet's transactions.
#[utoipa::path(
    get,
    path = "/v1/wallets/{wallet_id}/transactions",
    tag = "Wallets",
    params(
        ("wallet_id" = String, Path, description = "Wallet identifier"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
        ("limit" = Option<usize>, Query, description = "Page size, capped at 100")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction page", body = TransactionPage),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn list_transactions(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TransactionPage>, ApiError> {
    // Ownership check first so foreign wallet ids 404 without leaking data
    state.settlement.wallet_for_user(&user.user_id, &wallet_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE).max(1);
    let (transactions, next_cursor) = state
        .db
        .list_wallet_transactions(&wallet_id, query.cursor.as_deref(), limit)
        .map_err(LedgerError::from)?;

    Ok(Json(TransactionPage {
        transactions,
        next_cursor,
    }))
}
