// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted ledger record types.
//!
//! All monetary values are integers in the smallest currency unit ("cents").
//! Floating point never touches a balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Payment method class attached to deposits and withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    /// Card charge (deposits) or bank transfer payout (withdrawals).
    Card,
    /// Mobile money (Orange Money style) charge or payout.
    MobileMoney,
}

impl PayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::MobileMoney => "mobile_money",
        }
    }
}

/// Kind of money movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Funds entering a wallet from the payment provider.
    Deposit,
    /// Funds leaving a wallet through the payment provider.
    Withdrawal,
    /// Reservation of funds against a pending escrow swap.
    EscrowLock,
    /// Audit record for an escrow lock returned without settlement.
    EscrowRelease,
    /// Credit of escrowed funds to a swap beneficiary.
    EscrowSettle,
}

/// Transaction lifecycle status.
///
/// Initial states per kind: deposits start `Pending`, withdrawals start
/// `Processing` (they pre-debit at creation), escrow locks start `Locked`.
/// Every other state is terminal; a terminal transaction never changes again
/// and never re-applies its balance effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Processing,
    Locked,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    Settled,
    Released,
}

impl TxStatus {
    /// True for states that accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing | Self::Locked)
    }
}

/// Custodial wallet balance record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredWallet {
    /// Unique wallet identifier (UUID).
    pub wallet_id: String,
    /// User who owns this wallet.
    pub owner_user_id: String,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Full balance in minor units. Never negative after a completed mutation.
    pub balance_cents: i64,
    /// Portion of the balance reserved by open escrow locks.
    pub locked_cents: i64,
    /// Soft-disable flag; wallets are never deleted.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl StoredWallet {
    /// Create a fresh, empty wallet for a user and currency.
    pub fn new(owner_user_id: impl Into<String>, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            wallet_id: Uuid::new_v4().to_string(),
            owner_user_id: owner_user_id.into(),
            currency: currency.into(),
            balance_cents: 0,
            locked_cents: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance available for new debits or escrow locks.
    pub fn spendable_cents(&self) -> i64 {
        self.balance_cents - self.locked_cents
    }
}

/// Persisted money-movement record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredTransaction {
    /// Unique transaction identifier (UUID).
    pub tx_id: String,
    /// Wallet whose balance this transaction affects.
    pub wallet_id: String,
    /// Movement kind.
    pub kind: TxKind,
    /// Current lifecycle status.
    pub status: TxStatus,
    /// Principal amount in minor units (always positive).
    pub amount_cents: i64,
    /// Fee in minor units. Debit-inclusive for withdrawals, informational
    /// for deposits (charged on top by the provider).
    pub fee_cents: i64,
    /// Currency inherited from the wallet.
    pub currency: String,
    /// Payment method for deposits/withdrawals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PayMethod>,
    /// External payment-provider reference, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    /// Escrow operation this transaction belongs to, for escrow kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_op: Option<String>,
    /// True once the wallet balance mutation for this transaction has been
    /// applied. Flips exactly once, atomically with the mutation itself.
    pub balance_adjusted: bool,
    /// Machine-readable failure code, if the transaction failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set when the transaction reaches `Completed` or `Settled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoredTransaction {
    fn base(
        wallet: &StoredWallet,
        kind: TxKind,
        status: TxStatus,
        amount_cents: i64,
        fee_cents: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            tx_id: Uuid::new_v4().to_string(),
            wallet_id: wallet.wallet_id.clone(),
            kind,
            status,
            amount_cents,
            fee_cents,
            currency: wallet.currency.clone(),
            method: None,
            provider_ref: None,
            escrow_op: None,
            balance_adjusted: false,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// New deposit awaiting provider confirmation. No balance effect yet.
    pub fn new_deposit(
        wallet: &StoredWallet,
        amount_cents: i64,
        fee_cents: i64,
        method: PayMethod,
    ) -> Self {
        let mut tx = Self::base(wallet, TxKind::Deposit, TxStatus::Pending, amount_cents, fee_cents);
        tx.method = Some(method);
        tx
    }

    /// New withdrawal. The pre-debit of `amount + fee` is applied at creation
    /// time, so the record is born `Processing` with `balance_adjusted` set.
    pub fn new_withdrawal(
        wallet: &StoredWallet,
        amount_cents: i64,
        fee_cents: i64,
        method: PayMethod,
    ) -> Self {
        let mut tx = Self::base(
            wallet,
            TxKind::Withdrawal,
            TxStatus::Processing,
            amount_cents,
            fee_cents,
        );
        tx.method = Some(method);
        tx.balance_adjusted = true;
        tx
    }

    /// New escrow lock leg. Reserves `amount` in `locked_cents` at creation.
    pub fn new_escrow_lock(wallet: &StoredWallet, amount_cents: i64, operation_id: &str) -> Self {
        let mut tx = Self::base(wallet, TxKind::EscrowLock, TxStatus::Locked, amount_cents, 0);
        tx.escrow_op = Some(operation_id.to_string());
        tx
    }

    /// Settlement credit for a swap beneficiary. Born terminal: the credit is
    /// applied in the same atomic unit that inserts the record.
    pub fn new_escrow_settle(
        beneficiary: &StoredWallet,
        amount_cents: i64,
        operation_id: &str,
    ) -> Self {
        let mut tx = Self::base(
            beneficiary,
            TxKind::EscrowSettle,
            TxStatus::Completed,
            amount_cents,
            0,
        );
        tx.escrow_op = Some(operation_id.to_string());
        tx.balance_adjusted = true;
        tx.completed_at = Some(tx.created_at);
        tx
    }

    /// Audit record for a lock released without settlement. No balance effect.
    pub fn new_escrow_release(wallet: &StoredWallet, amount_cents: i64, operation_id: &str) -> Self {
        let mut tx = Self::base(
            wallet,
            TxKind::EscrowRelease,
            TxStatus::Completed,
            amount_cents,
            0,
        );
        tx.escrow_op = Some(operation_id.to_string());
        tx.completed_at = Some(tx.created_at);
        tx
    }
}

/// One side of a two-party escrow swap.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscrowLeg {
    /// Wallet whose funds are locked.
    pub wallet_id: String,
    /// Wallet credited when the swap settles.
    pub beneficiary_wallet_id: String,
    /// Locked amount in minor units of the locking wallet's currency.
    pub amount_cents: i64,
    /// The `EscrowLock` transaction recording the reservation.
    pub lock_tx_id: String,
}

/// Escrow operation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscrowOpStatus {
    /// Both legs locked, awaiting settle or release.
    Locked,
    /// Both legs debited and beneficiaries credited.
    Settled,
    /// Both locks returned without balance movement.
    Released,
}

/// Two-party swap: two lock legs plus (after settlement) two credit records,
/// all sharing this operation id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscrowOperation {
    /// Unique operation identifier (UUID).
    pub operation_id: String,
    /// Initiating side.
    pub leg_a: EscrowLeg,
    /// Accepting side.
    pub leg_b: EscrowLeg,
    /// Current status.
    pub status: EscrowOpStatus,
    /// Settlement credit transaction ids, populated on settle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settle_tx_ids: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl EscrowOperation {
    pub fn new(leg_a: EscrowLeg, leg_b: EscrowLeg) -> Self {
        let now = Utc::now();
        Self {
            operation_id: Uuid::new_v4().to_string(),
            leg_a,
            leg_b,
            status: EscrowOpStatus::Locked,
            settle_tx_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Currency for a wallet, derived from the owner's country at creation.
///
/// Unknown countries default to EUR.
pub fn currency_for_country(country_code: &str) -> &'static str {
    match country_code.to_ascii_uppercase().as_str() {
        // Euro zone
        "FR" | "DE" | "IT" | "ES" | "NL" | "BE" | "AT" | "PT" | "FI" | "IE" | "LU" | "GR" => "EUR",
        // CFA franc BEAC
        "CM" | "GA" | "CF" | "TD" | "GQ" | "CG" => "XAF",
        // CFA franc BCEAO
        "CI" | "SN" | "ML" | "BJ" | "BF" | "TG" | "NE" | "GW" => "XOF",
        "NG" => "NGN",
        "GH" => "GHS",
        "KE" => "KES",
        "ZA" => "ZAR",
        _ => "EUR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spendable_subtracts_locked() {
        let mut wallet = StoredWallet::new("user-1", "EUR");
        wallet.balance_cents = 10_000;
        wallet.locked_cents = 3_000;
        assert_eq!(wallet.spendable_cents(), 7_000);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(!TxStatus::Processing.is_terminal());
        assert!(!TxStatus::Locked.is_terminal());
        for status in [
            TxStatus::Completed,
            TxStatus::Failed,
            TxStatus::Cancelled,
            TxStatus::Refunded,
            TxStatus::Settled,
            TxStatus::Released,
        ] {
            assert!(status.is_terminal(), "{status:?} should be terminal");
        }
    }

    #[test]
    fn withdrawal_is_born_pre_debited() {
        let wallet = StoredWallet::new("user-1", "XOF");
        let tx = StoredTransaction::new_withdrawal(&wallet, 5_000, 100, PayMethod::MobileMoney);
        assert_eq!(tx.status, TxStatus::Processing);
        assert!(tx.balance_adjusted);
        assert_eq!(tx.currency, "XOF");
    }

    #[test]
    fn deposit_has_no_balance_effect_at_creation() {
        let wallet = StoredWallet::new("user-1", "EUR");
        let tx = StoredTransaction::new_deposit(&wallet, 10_000, 290, PayMethod::Card);
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(!tx.balance_adjusted);
    }

    #[test]
    fn currency_mapping_defaults_to_eur() {
        assert_eq!(currency_for_country("ci"), "XOF");
        assert_eq!(currency_for_country("CM"), "XAF");
        assert_eq!(currency_for_country("NG"), "NGN");
        assert_eq!(currency_for_country("ZZ"), "EUR");
    }
}
