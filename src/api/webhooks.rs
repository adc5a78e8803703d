// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment-provider webhook endpoint.
//!
//! The body is taken raw: the HMAC covers the exact bytes on the wire, so
//! parsing happens only after the signature verifies.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::ledger::ReconcileOutcome;
use crate::state::AppState;

/// Header carrying the base64 HMAC-SHA256 signature of the body.
const SIGNATURE_HEADER: &str = "verif-hash";

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// "applied" when the event changed the ledger, "ignored" when it was a
    /// redelivery on an already-resolved transaction, "dropped" when the
    /// authenticated event could not be used.
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

/// Receive one provider event.
///
/// Every authenticated delivery is answered 200, including ones the ledger
/// cannot use; only a bad signature is rejected.
#[utoipa::path(
    post,
    path = "/v1/webhooks/provider",
    tag = "Webhooks",
    request_body(content = String, description = "Raw provider event payload; the signature covers these exact bytes"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 401, description = "Signature verification failed")
    )
)]
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing signature header"))?;

    let outcome = state.reconciler.handle(&body, signature)?;
    let ack = match outcome {
        ReconcileOutcome::Applied(tx) => WebhookAck {
            result: "applied",
            tx_id: Some(tx.tx_id),
        },
        ReconcileOutcome::AlreadyResolved(tx) => WebhookAck {
            result: "ignored",
            tx_id: Some(tx.tx_id),
        },
        ReconcileOutcome::Dropped => WebhookAck {
            result: "dropped",
            tx_id: None,
        },
    };
    Ok(Json(ack))
}
