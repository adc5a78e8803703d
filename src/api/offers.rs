// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow endpoints backing peer-to-peer swap offers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::ledger::EscrowLegRequest;
use crate::state::AppState;
use crate::storage::records::EscrowOperation;

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenEscrowRequest {
    /// The caller's side of the swap.
    pub leg_a: EscrowLegRequest,
    /// The counterparty's side.
    pub leg_b: EscrowLegRequest,
}

/// Open a swap: lock both legs.
#[utoipa::path(
    post,
    path = "/v1/escrows",
    tag = "Escrow",
    request_body = OpenEscrowRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Escrow opened, both legs locked", body = EscrowOperation),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Wallet not found"),
        (status = 409, description = "Wallet busy with a concurrent operation"),
        (status = 422, description = "Insufficient spendable balance")
    )
)]
pub async fn open_escrow(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<OpenEscrowRequest>,
) -> Result<(StatusCode, Json<EscrowOperation>), ApiError> {
    let op = state
        .escrow
        .open(&user.user_id, request.leg_a, request.leg_b)
        .await?;
    Ok((StatusCode::CREATED, Json(op)))
}

/// Fetch an escrow operation the caller participates in.
#[utoipa::path(
    get,
    path = "/v1/escrows/{operation_id}",
    tag = "Escrow",
    params(("operation_id" = String, Path, description = "Escrow operation identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Escrow operation", body = EscrowOperation),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Escrow not found")
    )
)]
pub async fn get_escrow(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<EscrowOperation>, ApiError> {
    let op = state.escrow.get(&user.user_id, &operation_id)?;
    Ok(Json(op))
}

/// Settle a locked swap: both locked amounts move to their beneficiaries.
#[utoipa::path(
    post,
    path = "/v1/escrows/{operation_id}/settle",
    tag = "Escrow",
    params(("operation_id" = String, Path, description = "Escrow operation identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Escrow settled", body = EscrowOperation),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Wallet busy with a concurrent operation"),
        (status = 422, description = "Escrow already resolved")
    )
)]
pub async fn settle_escrow(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<EscrowOperation>, ApiError> {
    let op = state.escrow.settle(&user.user_id, &operation_id).await?;
    Ok(Json(op))
}

/// Release a locked swap: both locks return without moving money.
#[utoipa::path(
    post,
    path = "/v1/escrows/{operation_id}/release",
    tag = "Escrow",
    params(("operation_id" = String, Path, description = "Escrow operation identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Escrow released", body = EscrowOperation),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Escrow not found"),
        (status = 409, description = "Wallet busy with a concurrent operation"),
        (status = 422, description = "Escrow already resolved")
    )
)]
pub async fn release_escrow(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<Json<EscrowOperation>, ApiError> {
    let op = state.escrow.release(&user.user_id, &operation_id).await?;
    Ok(Json(op))
}
