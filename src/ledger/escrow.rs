// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Escrow coordination for two-party currency swaps.
//!
//! A swap locks funds on both sides (leg A and leg B), then resolves exactly
//! once: *settle* moves each locked amount to the opposite party's wallet of
//! the same currency, *release* returns both locks untouched. All four wallet
//! mutations of a resolution happen in one storage transaction; whichever
//! resolution lands first wins and the other is rejected.
//!
//! Wallet locks are taken in ascending id order, so an escrow touching the
//! same wallets as a concurrent withdrawal or another swap cannot deadlock.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use super::error::LedgerError;
use super::locks::WalletLocks;
use crate::storage::ledger_db::LedgerDb;
use crate::storage::records::{EscrowLeg, EscrowOperation, StoredTransaction, StoredWallet};

/// One side of a swap as requested by the caller.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EscrowLegRequest {
    /// Wallet whose funds are locked.
    pub wallet_id: String,
    /// Wallet credited on settlement (same currency, other party).
    pub beneficiary_wallet_id: String,
    /// Amount in minor units of the locking wallet's currency.
    pub amount_cents: i64,
}

pub struct EscrowEngine {
    db: Arc<LedgerDb>,
    locks: Arc<WalletLocks>,
}

impl EscrowEngine {
    pub fn new(db: Arc<LedgerDb>, locks: Arc<WalletLocks>) -> Self {
        Self { db, locks }
    }

    fn load_wallet(&self, wallet_id: &str) -> Result<StoredWallet, LedgerError> {
        self.db
            .get_wallet(wallet_id)?
            .ok_or(LedgerError::WalletNotFound)
    }

    fn load_operation(&self, operation_id: &str) -> Result<EscrowOperation, LedgerError> {
        self.db
            .get_escrow(operation_id)?
            .ok_or(LedgerError::EscrowNotFound)
    }

    /// True when `user_id` owns any wallet involved in the operation.
    fn is_participant(&self, op: &EscrowOperation, user_id: &str) -> Result<bool, LedgerError> {
        for wallet_id in [
            &op.leg_a.wallet_id,
            &op.leg_a.beneficiary_wallet_id,
            &op.leg_b.wallet_id,
            &op.leg_b.beneficiary_wallet_id,
        ] {
            if self.load_wallet(wallet_id)?.owner_user_id == user_id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn require_participant(&self, op: &EscrowOperation, user_id: &str) -> Result<(), LedgerError> {
        if self.is_participant(op, user_id)? {
            Ok(())
        } else {
            Err(LedgerError::EscrowNotFound)
        }
    }

    /// Look up an operation, visible to its participants only.
    pub fn get(&self, caller_user_id: &str, operation_id: &str) -> Result<EscrowOperation, LedgerError> {
        let op = self.load_operation(operation_id)?;
        self.require_participant(&op, caller_user_id)?;
        Ok(op)
    }

    /// Open a swap: lock both legs atomically.
    ///
    /// The caller must own the leg A wallet (the party triggering the match);
    /// leg B's consent is established by the offer acceptance that precedes
    /// this call. Either both legs lock or neither does.
    pub async fn open(
        &self,
        caller_user_id: &str,
        leg_a: EscrowLegRequest,
        leg_b: EscrowLegRequest,
    ) -> Result<EscrowOperation, LedgerError> {
        for leg in [&leg_a, &leg_b] {
            if leg.amount_cents <= 0 {
                return Err(LedgerError::InvalidAmount(leg.amount_cents));
            }
        }

        let wallet_a = self.load_wallet(&leg_a.wallet_id)?;
        if wallet_a.owner_user_id != caller_user_id {
            return Err(LedgerError::WalletNotFound);
        }
        let wallet_b = self.load_wallet(&leg_b.wallet_id)?;
        // Beneficiary currency must match the leg it receives from.
        for (leg, locker) in [(&leg_a, &wallet_a), (&leg_b, &wallet_b)] {
            let beneficiary = self.load_wallet(&leg.beneficiary_wallet_id)?;
            if beneficiary.currency != locker.currency {
                return Err(LedgerError::CurrencyMismatch {
                    locked: locker.currency.clone(),
                    beneficiary: beneficiary.currency,
                });
            }
        }

        let _guards = self
            .locks
            .acquire_many(&[leg_a.wallet_id.as_str(), leg_b.wallet_id.as_str()])
            .await?;

        let lock_a = StoredTransaction::new_escrow_lock(&wallet_a, leg_a.amount_cents, "");
        let lock_b = StoredTransaction::new_escrow_lock(&wallet_b, leg_b.amount_cents, "");
        let op = EscrowOperation::new(
            EscrowLeg {
                wallet_id: leg_a.wallet_id,
                beneficiary_wallet_id: leg_a.beneficiary_wallet_id,
                amount_cents: leg_a.amount_cents,
                lock_tx_id: lock_a.tx_id.clone(),
            },
            EscrowLeg {
                wallet_id: leg_b.wallet_id,
                beneficiary_wallet_id: leg_b.beneficiary_wallet_id,
                amount_cents: leg_b.amount_cents,
                lock_tx_id: lock_b.tx_id.clone(),
            },
        );
        let mut lock_a = lock_a;
        let mut lock_b = lock_b;
        lock_a.escrow_op = Some(op.operation_id.clone());
        lock_b.escrow_op = Some(op.operation_id.clone());

        self.db.lock_escrow_legs(&op, &lock_a, &lock_b)?;
        info!(
            operation_id = %op.operation_id,
            leg_a_wallet = %op.leg_a.wallet_id,
            leg_b_wallet = %op.leg_b.wallet_id,
            "escrow opened, both legs locked"
        );
        Ok(op)
    }

    /// Settle a locked swap: both locked amounts move to their beneficiaries.
    pub async fn settle(
        &self,
        caller_user_id: &str,
        operation_id: &str,
    ) -> Result<EscrowOperation, LedgerError> {
        let op = self.load_operation(operation_id)?;
        self.require_participant(&op, caller_user_id)?;

        let _guards = self
            .locks
            .acquire_many(&[op.leg_a.wallet_id.as_str(), op.leg_b.wallet_id.as_str()])
            .await?;

        let beneficiary_a = self.load_wallet(&op.leg_a.beneficiary_wallet_id)?;
        let beneficiary_b = self.load_wallet(&op.leg_b.beneficiary_wallet_id)?;
        let settle_a =
            StoredTransaction::new_escrow_settle(&beneficiary_a, op.leg_a.amount_cents, operation_id);
        let settle_b =
            StoredTransaction::new_escrow_settle(&beneficiary_b, op.leg_b.amount_cents, operation_id);

        let op = self.db.settle_escrow(operation_id, &settle_a, &settle_b)?;
        info!(operation_id = %op.operation_id, "escrow settled");
        Ok(op)
    }

    /// Release a locked swap: both locks return, no balances move.
    pub async fn release(
        &self,
        caller_user_id: &str,
        operation_id: &str,
    ) -> Result<EscrowOperation, LedgerError> {
        let op = self.load_operation(operation_id)?;
        self.require_participant(&op, caller_user_id)?;

        let _guards = self
            .locks
            .acquire_many(&[op.leg_a.wallet_id.as_str(), op.leg_b.wallet_id.as_str()])
            .await?;

        let wallet_a = self.load_wallet(&op.leg_a.wallet_id)?;
        let wallet_b = self.load_wallet(&op.leg_b.wallet_id)?;
        let release_a =
            StoredTransaction::new_escrow_release(&wallet_a, op.leg_a.amount_cents, operation_id);
        let release_b =
            StoredTransaction::new_escrow_release(&wallet_b, op.leg_b.amount_cents, operation_id);

        let op = self.db.release_escrow(operation_id, &release_a, &release_b)?;
        info!(operation_id = %op.operation_id, "escrow released");
        Ok(op)
    }
}
