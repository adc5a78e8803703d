// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External service integrations: payment provider and identity verification.
//!
//! The settlement engine talks to the outside world only through the
//! [`PaymentProvider`] and [`KycVerifier`] traits, so tests swap in the mock
//! implementations and the binary picks real clients from configuration.

pub mod flutterwave;
pub mod kyc;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Request never reached the provider; nothing can have happened remotely.
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    /// The call timed out after the request may have been delivered; the
    /// operation's outcome is unknown.
    #[error("provider call timed out: {0}")]
    Timeout(String),

    /// The provider gave a definitive refusal.
    #[error("provider rejected: {0}")]
    Rejected(String),

    /// Required credentials are absent from the environment.
    #[error("provider not configured: {0}")]
    MissingConfig(&'static str),

    /// The provider answered with a body we could not interpret.
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Payment provider
// =============================================================================

/// Request to collect money from a user (deposit).
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Our transaction id, echoed back by webhooks as the external reference.
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    /// "card" or "mobile_money".
    pub method: String,
    /// End-user identifier forwarded to the provider's checkout.
    pub customer_id: String,
}

/// Provider acknowledgement of an initiated charge.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeOutcome {
    /// Provider-side reference for the charge.
    pub provider_ref: String,
    /// Hosted checkout URL the user completes the payment at, when the
    /// method requires one.
    pub redirect_url: Option<String>,
}

/// Request to pay money out to a user (withdrawal).
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    pub reference: String,
    pub amount_cents: i64,
    pub currency: String,
    pub method: String,
    /// Destination account: bank account or mobile money number.
    pub destination: String,
}

/// Provider acknowledgement of an initiated transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferOutcome {
    pub provider_ref: String,
}

/// Payment rails for collections and payouts.
///
/// Both calls are *initiations*: the definitive result arrives later through
/// the webhook channel. `Ok` here means the provider accepted the request,
/// not that money moved.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Initiate a collection (deposit funding).
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, ProviderError>;

    /// Initiate a payout (withdrawal).
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, ProviderError>;
}

// =============================================================================
// Identity verification
// =============================================================================

/// Verification standing of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycStatus {
    Verified,
    Pending,
    Rejected,
}

/// Identity verification gate consulted before any provider-facing movement.
#[async_trait]
pub trait KycVerifier: Send + Sync {
    async fn status(&self, user_id: &str) -> Result<KycStatus, ProviderError>;
}
