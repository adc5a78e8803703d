// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook reconciliation.
//!
//! The payment provider reports charge and transfer outcomes asynchronously.
//! Each delivery is authenticated with an HMAC-SHA256 signature over the raw
//! body, resolved to a transaction through its external reference, and pushed
//! through the transition table. Redelivered events land on an
//! already-terminal transaction and change nothing, so the endpoint is safe
//! to retry.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use super::error::LedgerError;
use crate::storage::ledger_db::{FailureInfo, LedgerDb, TransitionOutcome};
use crate::storage::records::{StoredTransaction, TxStatus};

type HmacSha256 = Hmac<Sha256>;

/// Provider event envelope. Fields beyond these are ignored.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    /// Our reference for the movement (tx_ref / transfer reference).
    reference: String,
    /// Provider-side failure detail, when the event is a failure.
    #[serde(default)]
    reason: Option<String>,
}

/// What a delivery did to the ledger.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The event transitioned its transaction in this call.
    Applied(StoredTransaction),
    /// The transaction was already terminal; delivery acknowledged, nothing
    /// changed.
    AlreadyResolved(StoredTransaction),
    /// Authenticated delivery the ledger cannot use (unknown event type,
    /// unknown reference, unparseable payload). Logged and acknowledged so
    /// the provider does not keep retrying it.
    Dropped,
}

impl ReconcileOutcome {
    pub fn transaction(&self) -> Option<&StoredTransaction> {
        match self {
            Self::Applied(tx) | Self::AlreadyResolved(tx) => Some(tx),
            Self::Dropped => None,
        }
    }
}

pub struct WebhookReconciler {
    db: std::sync::Arc<LedgerDb>,
    secret: String,
}

impl WebhookReconciler {
    pub fn new(db: std::sync::Arc<LedgerDb>, secret: impl Into<String>) -> Self {
        Self {
            db,
            secret: secret.into(),
        }
    }

    /// Verify the base64 HMAC-SHA256 signature over the raw payload.
    ///
    /// Comparison is constant-time via the MAC verifier.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<(), LedgerError> {
        use base64ct::{Base64, Encoding};

        let provided = Base64::decode_vec(signature.trim())
            .map_err(|_| LedgerError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| LedgerError::InvalidSignature)?;
        mac.update(payload);
        mac.verify_slice(&provided)
            .map_err(|_| LedgerError::InvalidSignature)
    }

    /// Authenticate and apply one webhook delivery.
    pub fn handle(&self, payload: &[u8], signature: &str) -> Result<ReconcileOutcome, LedgerError> {
        self.verify_signature(payload, signature)?;

        // Past this point the delivery authenticated, so anything unusable is
        // logged and dropped: a non-2xx answer would only make the provider
        // redeliver an event that can never apply.
        let event: WebhookEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unparseable webhook payload, dropped");
                return Ok(ReconcileOutcome::Dropped);
            }
        };

        let (target, failure) = match event.event.as_str() {
            "charge.completed" | "transfer.completed" => (TxStatus::Completed, None),
            "charge.failed" | "transfer.failed" => (
                TxStatus::Failed,
                Some(FailureInfo {
                    code: event.event.clone(),
                    message: event
                        .data
                        .reason
                        .clone()
                        .unwrap_or_else(|| "provider reported failure".to_string()),
                }),
            ),
            other => {
                warn!(event = %other, "unhandled webhook event type, dropped");
                return Ok(ReconcileOutcome::Dropped);
            }
        };

        let Some(tx) = self.db.find_by_provider_ref(&event.data.reference)? else {
            warn!(
                event = %event.event,
                reference = %event.data.reference,
                "webhook reference matches no transaction, dropped"
            );
            return Ok(ReconcileOutcome::Dropped);
        };

        match self.db.apply_transition(&tx.tx_id, target, failure)? {
            TransitionOutcome::Applied(tx) => {
                info!(
                    tx_id = %tx.tx_id,
                    event = %event.event,
                    reference = %event.data.reference,
                    "webhook event applied"
                );
                Ok(ReconcileOutcome::Applied(tx))
            }
            TransitionOutcome::AlreadyTerminal(tx) => {
                warn!(
                    tx_id = %tx.tx_id,
                    event = %event.event,
                    status = ?tx.status,
                    "webhook redelivery on terminal transaction, ignored"
                );
                Ok(ReconcileOutcome::AlreadyResolved(tx))
            }
        }
    }
}
