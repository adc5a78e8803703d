// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for ledger operations.

use thiserror::Error;

use crate::storage::ledger_db::LedgerDbError;

/// Everything a ledger operation can fail with.
///
/// Variants are deliberately coarse: callers branch on the variant, the API
/// layer maps each to a status code, and provider/storage details travel in
/// the payload strings rather than in the type system.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, or otherwise malformed.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Spendable balance cannot cover the requested debit or lock.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Requested status change is not in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Webhook signature did not verify against the shared secret.
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// Payment method not supported for this operation.
    #[error("unsupported payment method: {0}")]
    UnsupportedMethod(String),

    /// Escrow leg pairs a locking wallet with a beneficiary of another
    /// currency.
    #[error("currency mismatch: leg locks {locked} but beneficiary holds {beneficiary}")]
    CurrencyMismatch { locked: String, beneficiary: String },

    /// Provider could not be reached or timed out. For withdrawals the
    /// transaction stays `Processing` until reconciliation resolves it.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider gave a definitive rejection.
    #[error("payment provider rejected the request: {0}")]
    ProviderRejected(String),

    /// Could not acquire the wallet lock within the configured window.
    #[error("wallet is busy with a concurrent operation")]
    ConcurrentModification,

    /// Caller has not passed identity verification.
    #[error("identity verification required")]
    KycRequired,

    /// No wallet with the given id, or not visible to the caller.
    #[error("wallet not found")]
    WalletNotFound,

    /// No transaction with the given id, or not visible to the caller.
    #[error("transaction not found")]
    TransactionNotFound,

    /// No escrow operation with the given id.
    #[error("escrow operation not found")]
    EscrowNotFound,

    /// Wallet has been deactivated; no mutations allowed.
    #[error("wallet is inactive")]
    WalletInactive,

    /// Underlying store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{from:?}").to_ascii_lowercase(),
            to: format!("{to:?}").to_ascii_lowercase(),
        }
    }
}

impl From<crate::providers::ProviderError> for LedgerError {
    fn from(err: crate::providers::ProviderError) -> Self {
        use crate::providers::ProviderError;
        match err {
            ProviderError::Rejected(message) => Self::ProviderRejected(message),
            ProviderError::Unavailable(message) => Self::ProviderUnavailable(message),
            ProviderError::Timeout(message) => Self::ProviderUnavailable(message),
            ProviderError::MissingConfig(what) => Self::ProviderUnavailable(what.to_string()),
            ProviderError::InvalidResponse(message) => Self::ProviderUnavailable(message),
        }
    }
}

impl From<LedgerDbError> for LedgerError {
    fn from(err: LedgerDbError) -> Self {
        match err {
            LedgerDbError::InsufficientSpendable { available, required } => {
                Self::InsufficientBalance { available, required }
            }
            LedgerDbError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            LedgerDbError::WalletInactive(_) => Self::WalletInactive,
            LedgerDbError::NotFound(what) if what.starts_with("wallet") => Self::WalletNotFound,
            LedgerDbError::NotFound(what) if what.starts_with("escrow") => Self::EscrowNotFound,
            LedgerDbError::NotFound(_) => Self::TransactionNotFound,
            other => Self::Storage(other.to_string()),
        }
    }
}
