// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit, withdrawal, and fee-quote endpoints.
//!
//! Amounts cross the API as decimal strings ("120.50") and are converted to
//! minor units at the boundary; everything past this module is integer cents.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::ledger::fees::FeeBreakdown;
use crate::state::AppState;
use crate::storage::records::{PayMethod, StoredTransaction, TxKind};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDepositRequest {
    pub wallet_id: String,
    /// Decimal amount string, two fractional digits at most.
    pub amount: String,
    pub method: PayMethod,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWithdrawalRequest {
    pub wallet_id: String,
    /// Decimal amount string, two fractional digits at most.
    pub amount: String,
    pub method: PayMethod,
    /// Destination account: IBAN or mobile money number.
    pub destination: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositResponse {
    pub transaction: StoredTransaction,
    /// Hosted checkout URL to complete the payment at, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeeQuoteQuery {
    pub amount: String,
    pub method: PayMethod,
    pub kind: TxKind,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeeQuote {
    pub amount_cents: i64,
    pub provider_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub total_fee_cents: i64,
}

/// Parse a decimal amount string into minor units.
///
/// Accepts up to two fractional digits; anything else is rejected rather than
/// silently rounded.
fn parse_amount_to_minor(amount: &str) -> Result<i64, ApiError> {
    const INVALID: &str = "amount must be a positive decimal with at most two fractional digits";

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(INVALID));
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 {
        return Err(ApiError::bad_request(INVALID));
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(INVALID));
    }

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if fraction_part.len() > 2 || !fraction_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(INVALID));
    }

    let whole: i64 = whole_part.parse().map_err(|_| ApiError::bad_request(INVALID))?;
    let fraction: i64 = match fraction_part.len() {
        0 => 0,
        1 => {
            fraction_part.parse::<i64>().map_err(|_| ApiError::bad_request(INVALID))? * 10
        }
        _ => fraction_part.parse().map_err(|_| ApiError::bad_request(INVALID))?,
    };

    let cents = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| ApiError::bad_request(INVALID))?;
    if cents <= 0 {
        return Err(ApiError::bad_request(INVALID));
    }
    Ok(cents)
}

/// Initiate a deposit into one of the caller's wallets.
#[utoipa::path(
    post,
    path = "/v1/deposits",
    tag = "Transactions",
    request_body = CreateDepositRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Deposit initiated", body = DepositResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "KYC required or wallet inactive"),
        (status = 404, description = "Wallet not found"),
        (status = 422, description = "Provider rejected the charge"),
        (status = 503, description = "Provider unavailable")
    )
)]
pub async fn create_deposit(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateDepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>), ApiError> {
    let amount_cents = parse_amount_to_minor(&request.amount)?;
    let receipt = state
        .settlement
        .deposit(&user.user_id, &request.wallet_id, amount_cents, request.method)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            transaction: receipt.transaction,
            redirect_url: receipt.redirect_url,
        }),
    ))
}

/// Initiate a withdrawal from one of the caller's wallets.
#[utoipa::path(
    post,
    path = "/v1/withdrawals",
    tag = "Transactions",
    request_body = CreateWithdrawalRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Withdrawal initiated (status may remain processing)", body = StoredTransaction),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "KYC required or wallet inactive"),
        (status = 404, description = "Wallet not found"),
        (status = 409, description = "Wallet busy with a concurrent operation"),
        (status = 422, description = "Insufficient balance or provider rejection")
    )
)]
pub async fn create_withdrawal(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<StoredTransaction>), ApiError> {
    let amount_cents = parse_amount_to_minor(&request.amount)?;
    if request.destination.trim().is_empty() {
        return Err(ApiError::bad_request("destination must not be empty"));
    }
    let tx = state
        .settlement
        .withdraw(
            &user.user_id,
            &request.wallet_id,
            amount_cents,
            request.method,
            request.destination.trim(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Fetch one of the caller's transactions.
#[utoipa::path(
    get,
    path = "/v1/transactions/{tx_id}",
    tag = "Transactions",
    params(("tx_id" = String, Path, description = "Transaction identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction", body = StoredTransaction),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn get_transaction(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> Result<Json<StoredTransaction>, ApiError> {
    let tx = state.settlement.transaction_for_user(&user.user_id, &tx_id)?;
    Ok(Json(tx))
}

/// Cancel an unconfirmed deposit.
#[utoipa::path(
    post,
    path = "/v1/transactions/{tx_id}/cancel",
    tag = "Transactions",
    params(("tx_id" = String, Path, description = "Transaction identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction after cancellation", body = StoredTransaction),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found"),
        (status = 422, description = "Transaction cannot be cancelled")
    )
)]
pub async fn cancel_transaction(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> Result<Json<StoredTransaction>, ApiError> {
    let tx = state.settlement.cancel(&user.user_id, &tx_id).await?;
    Ok(Json(tx))
}

/// Quote the fee for a prospective deposit or withdrawal.
#[utoipa::path(
    get,
    path = "/v1/fees/quote",
    tag = "Transactions",
    params(
        ("amount" = String, Query, description = "Decimal amount string"),
        ("method" = PayMethod, Query, description = "Payment method"),
        ("kind" = TxKind, Query, description = "deposit or withdrawal")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Fee quote", body = FeeQuote),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn quote_fee(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(query): Query<FeeQuoteQuery>,
) -> Result<Json<FeeQuote>, ApiError> {
    let amount_cents = parse_amount_to_minor(&query.amount)?;
    let FeeBreakdown {
        provider_cents,
        platform_cents,
    } = state
        .settlement
        .fees()
        .breakdown(query.method, query.kind, amount_cents)?;

    Ok(Json(FeeQuote {
        amount_cents,
        provider_fee_cents: provider_cents,
        platform_fee_cents: platform_cents,
        total_fee_cents: provider_cents + platform_cents,
    }))
}
