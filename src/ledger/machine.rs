// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction state machine.
//!
//! Pure transition table: given a transaction and a requested target status,
//! decide whether the transition is legal and which wallet mutation it
//! carries. The storage layer consults this table *inside* its write
//! transaction, so status flip and balance mutation are one atomic unit.
//!
//! ## Transition families
//!
//! | kind        | initial      | terminal targets                          |
//! |-------------|--------------|-------------------------------------------|
//! | deposit     | `Pending`    | `Completed`, `Failed`, `Cancelled`        |
//! | withdrawal  | `Processing` | `Completed`, `Failed`, `Cancelled`, `Refunded` |
//! | escrow lock | `Locked`     | `Settled`, `Released`                     |
//!
//! `Refunded` is the administrative correction for a withdrawal whose funds
//! bounced back after the provider side was already attempted; it carries the
//! same reversing effect as `Failed`.
//!
//! A transition requested on an already-terminal transaction is reported as
//! [`TransitionPlan::AlreadyTerminal`] and applies nothing. That guard is
//! what makes webhook redelivery, admin re-confirmation, and user retries
//! idempotent.

use crate::storage::records::{StoredTransaction, TxKind, TxStatus};

/// Wallet mutation carried by a legal transition, applied to the
/// transaction's own wallet exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    /// `balance_cents += amount` (deposit confirmation, withdrawal reversal).
    Credit(i64),
    /// `locked_cents -= amount` (escrow lock released).
    Unlock(i64),
    /// `balance_cents -= amount; locked_cents -= amount` (escrow lock settled).
    SettleLock(i64),
}

/// Outcome of planning a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Legal transition; apply the optional balance effect and flip status.
    Apply(Option<BalanceEffect>),
    /// Transaction is already in a terminal state; re-report it, change nothing.
    AlreadyTerminal,
    /// Source/target pair is not in the table; reject, change nothing.
    Invalid,
}

/// Decide what a transition request means for this transaction.
pub fn plan(tx: &StoredTransaction, target: TxStatus) -> TransitionPlan {
    if tx.status.is_terminal() {
        return TransitionPlan::AlreadyTerminal;
    }

    let effect = match (tx.kind, tx.status, target) {
        // Deposits credit the wallet only on confirmation, and only if the
        // credit has not been applied through another path already.
        (TxKind::Deposit, TxStatus::Pending, TxStatus::Completed) => {
            if tx.balance_adjusted {
                None
            } else {
                Some(BalanceEffect::Credit(tx.amount_cents))
            }
        }
        (TxKind::Deposit, TxStatus::Pending, TxStatus::Failed)
        | (TxKind::Deposit, TxStatus::Pending, TxStatus::Cancelled) => None,

        // Withdrawals were pre-debited at creation; completion moves nothing,
        // failure/cancellation/refund returns amount + fee.
        (TxKind::Withdrawal, TxStatus::Processing, TxStatus::Completed) => None,
        (TxKind::Withdrawal, TxStatus::Processing, TxStatus::Failed)
        | (TxKind::Withdrawal, TxStatus::Processing, TxStatus::Cancelled)
        | (TxKind::Withdrawal, TxStatus::Processing, TxStatus::Refunded) => {
            Some(BalanceEffect::Credit(tx.amount_cents + tx.fee_cents))
        }

        // Escrow lock legs.
        (TxKind::EscrowLock, TxStatus::Locked, TxStatus::Released) => {
            Some(BalanceEffect::Unlock(tx.amount_cents))
        }
        (TxKind::EscrowLock, TxStatus::Locked, TxStatus::Settled) => {
            Some(BalanceEffect::SettleLock(tx.amount_cents))
        }

        _ => return TransitionPlan::Invalid,
    };

    TransitionPlan::Apply(effect)
}

/// Whether `target` is a terminal state the operator override may force for
/// `kind`.
///
/// Only provider-facing kinds are overridable. Escrow legs move two wallets
/// and an operation record together, so forcing one leg through the generic
/// path would strand the counterpart credit; they resolve exclusively through
/// the escrow settle/release operations.
pub fn is_valid_target(kind: TxKind, target: TxStatus) -> bool {
    matches!(
        (kind, target),
        (
            TxKind::Deposit,
            TxStatus::Completed | TxStatus::Failed | TxStatus::Cancelled
        ) | (
            TxKind::Withdrawal,
            TxStatus::Completed | TxStatus::Failed | TxStatus::Cancelled | TxStatus::Refunded
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{PayMethod, StoredWallet};

    fn deposit(amount: i64) -> StoredTransaction {
        let wallet = StoredWallet::new("user-1", "EUR");
        StoredTransaction::new_deposit(&wallet, amount, 0, PayMethod::Card)
    }

    fn withdrawal(amount: i64, fee: i64) -> StoredTransaction {
        let wallet = StoredWallet::new("user-1", "EUR");
        StoredTransaction::new_withdrawal(&wallet, amount, fee, PayMethod::Card)
    }

    #[test]
    fn deposit_completion_credits_amount_once() {
        let tx = deposit(10_000);
        assert_eq!(
            plan(&tx, TxStatus::Completed),
            TransitionPlan::Apply(Some(BalanceEffect::Credit(10_000)))
        );

        let mut adjusted = deposit(10_000);
        adjusted.balance_adjusted = true;
        assert_eq!(
            plan(&adjusted, TxStatus::Completed),
            TransitionPlan::Apply(None)
        );
    }

    #[test]
    fn deposit_failure_moves_no_money() {
        let tx = deposit(10_000);
        assert_eq!(plan(&tx, TxStatus::Failed), TransitionPlan::Apply(None));
        assert_eq!(plan(&tx, TxStatus::Cancelled), TransitionPlan::Apply(None));
    }

    #[test]
    fn withdrawal_failure_reverses_amount_plus_fee() {
        let tx = withdrawal(5_000, 100);
        assert_eq!(
            plan(&tx, TxStatus::Failed),
            TransitionPlan::Apply(Some(BalanceEffect::Credit(5_100)))
        );
        assert_eq!(plan(&tx, TxStatus::Completed), TransitionPlan::Apply(None));
    }

    #[test]
    fn terminal_transactions_are_no_ops() {
        let mut tx = deposit(10_000);
        tx.status = TxStatus::Completed;
        assert_eq!(plan(&tx, TxStatus::Completed), TransitionPlan::AlreadyTerminal);
        assert_eq!(plan(&tx, TxStatus::Failed), TransitionPlan::AlreadyTerminal);
    }

    #[test]
    fn cross_family_targets_are_invalid() {
        let tx = deposit(10_000);
        assert_eq!(plan(&tx, TxStatus::Settled), TransitionPlan::Invalid);
        assert_eq!(plan(&tx, TxStatus::Processing), TransitionPlan::Invalid);

        let wd = withdrawal(5_000, 0);
        assert_eq!(plan(&wd, TxStatus::Released), TransitionPlan::Invalid);
    }

    #[test]
    fn escrow_lock_transitions() {
        let wallet = StoredWallet::new("user-1", "XOF");
        let tx = StoredTransaction::new_escrow_lock(&wallet, 9_000, "op-1");
        assert_eq!(
            plan(&tx, TxStatus::Released),
            TransitionPlan::Apply(Some(BalanceEffect::Unlock(9_000)))
        );
        assert_eq!(
            plan(&tx, TxStatus::Settled),
            TransitionPlan::Apply(Some(BalanceEffect::SettleLock(9_000)))
        );
        assert_eq!(plan(&tx, TxStatus::Completed), TransitionPlan::Invalid);
    }

    #[test]
    fn valid_target_table() {
        assert!(is_valid_target(TxKind::Deposit, TxStatus::Completed));
        assert!(!is_valid_target(TxKind::Deposit, TxStatus::Refunded));
        assert!(is_valid_target(TxKind::Withdrawal, TxStatus::Refunded));
        assert!(!is_valid_target(TxKind::EscrowLock, TxStatus::Settled));
        assert!(!is_valid_target(TxKind::EscrowLock, TxStatus::Released));
        assert!(!is_valid_target(TxKind::EscrowSettle, TxStatus::Completed));
    }
}
