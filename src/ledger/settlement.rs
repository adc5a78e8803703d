// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement engine: deposits, withdrawals, and their lifecycle.
//!
//! ## Asymmetry between the two directions
//!
//! Deposits carry no balance effect until the provider confirms: the record
//! is created `Pending` and the credit arrives with the confirmation webhook.
//! Withdrawals debit `amount + fee` at creation, atomically with the
//! spendable check, and hold the wallet's lock across the provider call so a
//! second withdrawal cannot race the same funds.
//!
//! A provider timeout on a withdrawal leaves the transaction `Processing`:
//! the money may have moved, so nothing is refunded until the webhook (or an
//! operator) says otherwise.

use std::sync::Arc;

use tracing::{info, warn};

use super::error::LedgerError;
use super::fees::FeeSchedule;
use super::locks::WalletLocks;
use crate::providers::{
    ChargeRequest, KycStatus, KycVerifier, PaymentProvider, ProviderError, TransferRequest,
};
use crate::storage::ledger_db::{FailureInfo, LedgerDb};
use crate::storage::records::{PayMethod, StoredTransaction, StoredWallet, TxKind, TxStatus};

/// Result of initiating a deposit: the pending transaction plus the hosted
/// checkout URL, when the payment method uses one.
#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub transaction: StoredTransaction,
    pub redirect_url: Option<String>,
}

pub struct SettlementEngine {
    db: Arc<LedgerDb>,
    locks: Arc<WalletLocks>,
    fees: FeeSchedule,
    provider: Arc<dyn PaymentProvider>,
    kyc: Arc<dyn KycVerifier>,
}

impl SettlementEngine {
    pub fn new(
        db: Arc<LedgerDb>,
        locks: Arc<WalletLocks>,
        fees: FeeSchedule,
        provider: Arc<dyn PaymentProvider>,
        kyc: Arc<dyn KycVerifier>,
    ) -> Self {
        Self {
            db,
            locks,
            fees,
            provider,
            kyc,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Load a wallet, requiring it to belong to `caller`.
    pub fn wallet_for_user(
        &self,
        caller_user_id: &str,
        wallet_id: &str,
    ) -> Result<StoredWallet, LedgerError> {
        let wallet = self
            .db
            .get_wallet(wallet_id)?
            .ok_or(LedgerError::WalletNotFound)?;
        if wallet.owner_user_id != caller_user_id {
            // Not revealing existence of other users' wallets.
            return Err(LedgerError::WalletNotFound);
        }
        Ok(wallet)
    }

    /// Load a transaction, requiring its wallet to belong to `caller`.
    pub fn transaction_for_user(
        &self,
        caller_user_id: &str,
        tx_id: &str,
    ) -> Result<StoredTransaction, LedgerError> {
        let tx = self
            .db
            .get_transaction(tx_id)?
            .ok_or(LedgerError::TransactionNotFound)?;
        let wallet = self
            .db
            .get_wallet(&tx.wallet_id)?
            .ok_or(LedgerError::TransactionNotFound)?;
        if wallet.owner_user_id != caller_user_id {
            return Err(LedgerError::TransactionNotFound);
        }
        Ok(tx)
    }

    async fn require_verified(&self, user_id: &str) -> Result<(), LedgerError> {
        match self.kyc.status(user_id).await? {
            KycStatus::Verified => Ok(()),
            KycStatus::Pending | KycStatus::Rejected => Err(LedgerError::KycRequired),
        }
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Initiate a deposit: create the `Pending` record, ask the provider for
    /// a charge, attach the provider reference. The wallet is credited only
    /// when the confirmation webhook arrives.
    pub async fn deposit(
        &self,
        caller_user_id: &str,
        wallet_id: &str,
        amount_cents: i64,
        method: PayMethod,
    ) -> Result<DepositReceipt, LedgerError> {
        let wallet = self.wallet_for_user(caller_user_id, wallet_id)?;
        if !wallet.is_active {
            return Err(LedgerError::WalletInactive);
        }
        self.require_verified(caller_user_id).await?;
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount(amount_cents));
        }

        let fee = self.fees.estimate(method, TxKind::Deposit, amount_cents)?;
        let tx = StoredTransaction::new_deposit(&wallet, amount_cents, fee, method);
        self.db.insert_transaction(&tx)?;

        let request = ChargeRequest {
            reference: tx.tx_id.clone(),
            amount_cents,
            currency: wallet.currency.clone(),
            method: method.as_str().to_string(),
            customer_id: caller_user_id.to_string(),
        };

        match self.provider.charge(&request).await {
            Ok(outcome) => {
                self.db.set_provider_ref(&tx.tx_id, &outcome.provider_ref)?;
                info!(
                    tx_id = %tx.tx_id,
                    wallet_id = %wallet.wallet_id,
                    amount_cents,
                    "deposit initiated"
                );
                let transaction = self
                    .db
                    .get_transaction(&tx.tx_id)?
                    .ok_or(LedgerError::TransactionNotFound)?;
                Ok(DepositReceipt {
                    transaction,
                    redirect_url: outcome.redirect_url,
                })
            }
            Err(err) => {
                // No funds at risk yet: a deposit that failed to initiate
                // is simply dead.
                let failure = FailureInfo {
                    code: "charge_init_failed".to_string(),
                    message: err.to_string(),
                };
                self.db
                    .apply_transition(&tx.tx_id, TxStatus::Failed, Some(failure))?;
                warn!(tx_id = %tx.tx_id, error = %err, "deposit initiation failed");
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Initiate a withdrawal: debit `amount + fee` up front, then ask the
    /// provider for a payout while still holding the wallet's lock.
    ///
    /// A definitive provider rejection reverses the debit immediately. An
    /// unreachable provider does not: the transaction stays `Processing` and
    /// is resolved by webhook or operator action.
    pub async fn withdraw(
        &self,
        caller_user_id: &str,
        wallet_id: &str,
        amount_cents: i64,
        method: PayMethod,
        destination: &str,
    ) -> Result<StoredTransaction, LedgerError> {
        let wallet = self.wallet_for_user(caller_user_id, wallet_id)?;
        self.require_verified(caller_user_id).await?;
        if amount_cents <= 0 {
            return Err(LedgerError::InvalidAmount(amount_cents));
        }

        let fee = self.fees.estimate(method, TxKind::Withdrawal, amount_cents)?;

        let _guard = self.locks.acquire(wallet_id).await?;

        // The debit and the spendable check are one atomic unit in the store;
        // the lock keeps a second withdrawal from even starting its provider
        // call against the same funds.
        let tx = StoredTransaction::new_withdrawal(&wallet, amount_cents, fee, method);
        self.db.debit_for_withdrawal(&tx)?;

        let request = TransferRequest {
            reference: tx.tx_id.clone(),
            amount_cents,
            currency: wallet.currency.clone(),
            method: method.as_str().to_string(),
            destination: destination.to_string(),
        };

        match self.provider.transfer(&request).await {
            Ok(outcome) => {
                self.db.set_provider_ref(&tx.tx_id, &outcome.provider_ref)?;
                info!(
                    tx_id = %tx.tx_id,
                    wallet_id = %wallet.wallet_id,
                    amount_cents,
                    fee_cents = fee,
                    "withdrawal initiated"
                );
                self.db
                    .get_transaction(&tx.tx_id)?
                    .ok_or(LedgerError::TransactionNotFound)
            }
            Err(err @ (ProviderError::Timeout(_) | ProviderError::InvalidResponse(_))) => {
                // Outcome unknown: the payout may have gone through (a garbled
                // response still means the request was delivered). Keep the
                // debit and the `Processing` status until reconciliation.
                warn!(tx_id = %tx.tx_id, error = %err, "withdrawal outcome unknown, left in doubt");
                self.db
                    .get_transaction(&tx.tx_id)?
                    .ok_or(LedgerError::TransactionNotFound)
            }
            Err(err) => {
                // The request demonstrably did not go through (rejection or
                // connect failure), so the debit reverses here and now.
                let failure = FailureInfo {
                    code: "transfer_failed".to_string(),
                    message: err.to_string(),
                };
                self.db
                    .apply_transition(&tx.tx_id, TxStatus::Failed, Some(failure))?;
                warn!(tx_id = %tx.tx_id, error = %err, "withdrawal failed, debit reversed");
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // User-initiated cancellation
    // =========================================================================

    /// Cancel a transaction the provider has not confirmed yet.
    ///
    /// Deposits cancel while `Pending` with no balance effect. Withdrawals
    /// cancel only while no provider reference exists (the transfer was never
    /// acknowledged), restoring the pre-debited `amount + fee`. Once the
    /// provider holds the transfer, resolution belongs to the webhook or an
    /// operator.
    pub async fn cancel(
        &self,
        caller_user_id: &str,
        tx_id: &str,
    ) -> Result<StoredTransaction, LedgerError> {
        let tx = self.transaction_for_user(caller_user_id, tx_id)?;
        let _guard = self.locks.acquire(&tx.wallet_id).await?;
        // A withdrawal in flight holds this lock across the provider call and
        // records the provider reference before releasing it, so the pre-lock
        // read may be stale. Re-read under the lock before deciding.
        let tx = self
            .db
            .get_transaction(tx_id)?
            .ok_or(LedgerError::TransactionNotFound)?;
        match tx.kind {
            TxKind::Deposit => {}
            TxKind::Withdrawal if tx.provider_ref.is_none() => {}
            _ => {
                return Err(LedgerError::invalid_transition(tx.status, TxStatus::Cancelled));
            }
        }
        let outcome = self.db.apply_transition(tx_id, TxStatus::Cancelled, None)?;
        if outcome.was_applied() {
            info!(%tx_id, kind = ?tx.kind, "transaction cancelled by user");
        }
        Ok(outcome.transaction().clone())
    }

    // =========================================================================
    // Operator corrections
    // =========================================================================

    /// Force a transaction into a terminal state. Administrative path for
    /// resolving in-doubt withdrawals and stuck deposits; the transition
    /// table still applies, as does terminal-state immutability.
    pub fn force_status(
        &self,
        tx_id: &str,
        target: TxStatus,
        failure: Option<FailureInfo>,
    ) -> Result<StoredTransaction, LedgerError> {
        let tx = self
            .db
            .get_transaction(tx_id)?
            .ok_or(LedgerError::TransactionNotFound)?;
        if !super::machine::is_valid_target(tx.kind, target) {
            return Err(LedgerError::invalid_transition(tx.status, target));
        }
        let outcome = self.db.apply_transition(tx_id, target, failure)?;
        info!(%tx_id, applied = outcome.was_applied(), ?target, "operator status override");
        Ok(outcome.transaction().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockBehavior, MockKyc, MockProvider};
    use std::time::Duration;

    struct Harness {
        engine: SettlementEngine,
        db: Arc<LedgerDb>,
        provider: Arc<MockProvider>,
        kyc: Arc<MockKyc>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("test.redb")).unwrap());
        let locks = Arc::new(WalletLocks::new(Duration::from_millis(200)));
        let provider = Arc::new(MockProvider::new());
        let kyc = Arc::new(MockKyc::new());
        let engine = SettlementEngine::new(
            db.clone(),
            locks,
            FeeSchedule::standard(),
            provider.clone(),
            kyc.clone(),
        );
        Harness {
            engine,
            db,
            provider,
            kyc,
            _dir: dir,
        }
    }

    fn funded_wallet(h: &Harness, owner: &str, cents: i64) -> StoredWallet {
        let wallet = h.db.create_wallet(owner, "EUR").unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, cents, 0, PayMethod::Card);
        h.db.insert_transaction(&tx).unwrap();
        h.db.apply_transition(&tx.tx_id, TxStatus::Completed, None).unwrap();
        h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn deposit_creates_pending_record_without_credit() {
        let h = harness();
        let wallet = h.db.create_wallet("alice", "EUR").unwrap();

        let receipt = h
            .engine
            .deposit("alice", &wallet.wallet_id, 10_000, PayMethod::Card)
            .await
            .unwrap();
        assert_eq!(receipt.transaction.status, TxStatus::Pending);
        assert!(receipt.redirect_url.is_some());
        assert!(receipt.transaction.provider_ref.is_some());

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 0);
    }

    #[tokio::test]
    async fn deposit_initiation_failure_marks_failed() {
        let h = harness();
        let wallet = h.db.create_wallet("alice", "EUR").unwrap();
        h.provider.set_behavior(MockBehavior::Reject("blocked".into()));

        let err = h
            .engine
            .deposit("alice", &wallet.wallet_id, 10_000, PayMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProviderRejected(_)));

        let (txs, _) = h.db.list_wallet_transactions(&wallet.wallet_id, None, 10).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn deposit_requires_wallet_ownership() {
        let h = harness();
        let wallet = h.db.create_wallet("alice", "EUR").unwrap();

        let err = h
            .engine
            .deposit("mallory", &wallet.wallet_id, 10_000, PayMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WalletNotFound));
    }

    #[tokio::test]
    async fn deposit_requires_kyc() {
        let h = harness();
        let wallet = h.db.create_wallet("alice", "EUR").unwrap();
        h.kyc.set_status("alice", KycStatus::Pending);

        let err = h
            .engine
            .deposit("alice", &wallet.wallet_id, 10_000, PayMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::KycRequired));
    }

    #[tokio::test]
    async fn withdrawal_debits_amount_plus_fee() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);

        // 5000 * 1% + 5000 * 0.5% = 75
        let tx = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap();
        assert_eq!(tx.status, TxStatus::Processing);
        assert_eq!(tx.fee_cents, 75);

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000 - 5_075);
        assert_eq!(h.provider.transfer_count(), 1);
    }

    #[tokio::test]
    async fn withdrawal_rejection_reverses_debit() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        h.provider.set_behavior(MockBehavior::Reject("no payout rail".into()));

        let err = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProviderRejected(_)));

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000);
    }

    #[tokio::test]
    async fn provider_timeout_leaves_withdrawal_in_doubt() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        h.provider.set_behavior(MockBehavior::Timeout("deadline exceeded".into()));

        let tx = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap();
        assert_eq!(tx.status, TxStatus::Processing);

        // Debit stands until reconciliation says otherwise
        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000 - 5_075);
    }

    #[tokio::test]
    async fn unreachable_provider_reverses_withdrawal_debit() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        h.provider.set_behavior(MockBehavior::Unreachable("connection refused".into()));

        let err = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProviderUnavailable(_)));

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000);
    }

    #[tokio::test]
    async fn concurrent_withdrawals_cannot_both_spend_the_same_funds() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        let engine = Arc::new(h.engine);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let wallet_id = wallet.wallet_id.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .withdraw("alice", &wallet_id, 6_000, PayMethod::Card, "FR76-0000")
                    .await
            }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientBalance { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(insufficient, 1);

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert!(wallet.balance_cents >= 0);
    }

    #[tokio::test]
    async fn pending_deposit_can_be_cancelled_acknowledged_withdrawal_cannot() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 20_000);

        let receipt = h
            .engine
            .deposit("alice", &wallet.wallet_id, 5_000, PayMethod::Card)
            .await
            .unwrap();
        let cancelled = h.engine.cancel("alice", &receipt.transaction.tx_id).await.unwrap();
        assert_eq!(cancelled.status, TxStatus::Cancelled);

        // This withdrawal got a provider reference, so it is past cancelling
        let wd = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap();
        let err = h.engine.cancel("alice", &wd.tx_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unacknowledged_withdrawal_cancel_restores_the_debit() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        h.provider.set_behavior(MockBehavior::Timeout("deadline exceeded".into()));

        let wd = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap();
        assert!(wd.provider_ref.is_none());

        let cancelled = h.engine.cancel("alice", &wd.tx_id).await.unwrap();
        assert_eq!(cancelled.status, TxStatus::Cancelled);

        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000);
    }

    #[tokio::test]
    async fn cancel_racing_an_in_flight_withdrawal_sees_the_acknowledgement() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        h.provider.set_latency(Duration::from_millis(100));

        let engine = Arc::new(h.engine);
        let withdraw = {
            let engine = engine.clone();
            let wallet_id = wallet.wallet_id.clone();
            tokio::spawn(async move {
                engine
                    .withdraw("alice", &wallet_id, 5_000, PayMethod::Card, "FR76-0000")
                    .await
            })
        };

        // The record only becomes visible once the withdrawal holds the
        // wallet lock, so from here the transfer is in flight.
        let tx_id = loop {
            let (txs, _) = h.db.list_wallet_transactions(&wallet.wallet_id, None, 10).unwrap();
            match txs.iter().find(|t| t.kind == TxKind::Withdrawal) {
                Some(tx) => break tx.tx_id.clone(),
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        };
        let cancel = engine.cancel("alice", &tx_id).await;

        let wd = withdraw.await.unwrap().unwrap();
        assert!(wd.provider_ref.is_some());

        // The cancel queued behind the lock and must re-read the record, so
        // it finds the provider reference and leaves the payout alone.
        assert!(matches!(cancel, Err(LedgerError::InvalidTransition { .. })));
        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000 - 5_075);
    }

    #[tokio::test]
    async fn force_status_refuses_escrow_legs() {
        use crate::storage::records::{EscrowLeg, EscrowOpStatus, EscrowOperation};

        let h = harness();
        let a = funded_wallet(&h, "alice", 10_000);
        let b = funded_wallet(&h, "bob", 9_000);

        let lock_a = StoredTransaction::new_escrow_lock(&a, 10_000, "swap-1");
        let lock_b = StoredTransaction::new_escrow_lock(&b, 9_000, "swap-1");
        let mut op = EscrowOperation::new(
            EscrowLeg {
                wallet_id: a.wallet_id.clone(),
                beneficiary_wallet_id: b.wallet_id.clone(),
                amount_cents: 10_000,
                lock_tx_id: lock_a.tx_id.clone(),
            },
            EscrowLeg {
                wallet_id: b.wallet_id.clone(),
                beneficiary_wallet_id: a.wallet_id.clone(),
                amount_cents: 9_000,
                lock_tx_id: lock_b.tx_id.clone(),
            },
        );
        op.operation_id = "swap-1".to_string();
        h.db.lock_escrow_legs(&op, &lock_a, &lock_b).unwrap();

        // A forced resolution of one leg would strand the counterpart credit
        for target in [TxStatus::Settled, TxStatus::Released] {
            let err = h.engine.force_status(&lock_a.tx_id, target, None).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        }

        let a_after = h.db.get_wallet(&a.wallet_id).unwrap().unwrap();
        let b_after = h.db.get_wallet(&b.wallet_id).unwrap().unwrap();
        assert_eq!(a_after.balance_cents + b_after.balance_cents, 19_000);
        assert_eq!(a_after.locked_cents, 10_000);
        assert_eq!(b_after.locked_cents, 9_000);
        assert_eq!(
            h.db.get_escrow("swap-1").unwrap().unwrap().status,
            EscrowOpStatus::Locked
        );
    }

    #[tokio::test]
    async fn force_status_respects_transition_table() {
        let h = harness();
        let wallet = funded_wallet(&h, "alice", 10_000);
        let wd = h
            .engine
            .withdraw("alice", &wallet.wallet_id, 5_000, PayMethod::Card, "FR76-0000")
            .await
            .unwrap();

        // Refunded is a legal operator target for withdrawals
        let refunded = h.engine.force_status(&wd.tx_id, TxStatus::Refunded, None).unwrap();
        assert_eq!(refunded.status, TxStatus::Refunded);
        let wallet = h.db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000);

        // Settled never is
        let err = h.engine.force_status(&wd.tx_id, TxStatus::Settled, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }
}
