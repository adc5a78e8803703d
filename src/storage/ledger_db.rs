// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! Every wallet mutation happens inside a single redb write transaction that
//! also flips the transaction status, so a crash can never leave a status and
//! its balance effect half-applied. The transition table in
//! [`crate::ledger::machine`] is consulted *inside* the write transaction;
//! callers never compute balances from a read made outside it.
//!
//! ## Table Layout
//!
//! - `wallets`: wallet_id → serialized StoredWallet
//! - `owner_wallet_index`: composite key (owner_user_id|currency) → wallet_id
//! - `transactions`: tx_id → serialized StoredTransaction
//! - `provider_ref_index`: provider reference → tx_id
//! - `wallet_tx_index`: composite key (wallet_id|!timestamp|tx_id) → kind
//! - `escrow_ops`: operation_id → serialized EscrowOperation

use std::path::Path;

use base64ct::{Base64, Encoding};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition};

use super::records::{
    EscrowOpStatus, EscrowOperation, StoredTransaction, StoredWallet, TxKind, TxStatus,
};
use crate::ledger::machine::{self, BalanceEffect, TransitionPlan};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary wallet table: wallet_id → serialized StoredWallet (JSON bytes).
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// Index: `owner_user_id|currency` → wallet_id. One wallet per pair.
const OWNER_WALLET_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("owner_wallet_index");

/// Primary transaction table: tx_id → serialized StoredTransaction (JSON bytes).
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Index: payment-provider reference → tx_id, for webhook reconciliation.
const PROVIDER_REF_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("provider_ref_index");

/// Index: composite key → kind label.
/// Key format: `wallet_id|!timestamp_be|tx_id` for descending-time range scans.
const WALLET_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("wallet_tx_index");

/// Escrow operations: operation_id → serialized EscrowOperation (JSON bytes).
const ESCROW_OPS: TableDefinition<&str, &[u8]> = TableDefinition::new("escrow_ops");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// Spendable balance check failed inside the write transaction.
    #[error("insufficient spendable balance: available {available}, required {required}")]
    InsufficientSpendable { available: i64, required: i64 },

    /// Requested status change rejected by the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Target wallet has been deactivated.
    #[error("wallet {0} is inactive")]
    WalletInactive(String),
}

pub type LedgerDbResult<T> = Result<T, LedgerDbError>;

/// Result of applying (or replaying) a transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was applied in this call.
    Applied(StoredTransaction),
    /// The transaction was already terminal; nothing changed.
    AlreadyTerminal(StoredTransaction),
}

impl TransitionOutcome {
    pub fn transaction(&self) -> &StoredTransaction {
        match self {
            Self::Applied(tx) | Self::AlreadyTerminal(tx) => tx,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Failure detail attached when a transition targets a failure state.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub code: String,
    pub message: String,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the wallet_tx_index table.
///
/// Format: `wallet_id | inverted_timestamp_be_bytes | tx_id`
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(wallet_id: &str, timestamp: i64, tx_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(wallet_id.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(wallet_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

/// Build a prefix key for range scanning all transactions of a wallet.
fn make_prefix(wallet_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(wallet_id.len() + 1);
    prefix.extend_from_slice(wallet_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with all 0xFF bytes appended).
fn make_prefix_end(wallet_id: &str) -> Vec<u8> {
    let mut end = make_prefix(wallet_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

fn owner_index_key(owner_user_id: &str, currency: &str) -> String {
    format!("{owner_user_id}|{currency}")
}

fn encode_cursor(key: &[u8]) -> String {
    Base64::encode_string(key)
}

fn decode_cursor(cursor: &str) -> Option<Vec<u8>> {
    Base64::decode_vec(cursor).ok()
}

/// Extract the tx_id portion from a composite index key.
fn extract_tx_id_from_key(key: &[u8]) -> Option<String> {
    let mut pipe_count = 0;
    for (i, &b) in key.iter().enumerate() {
        if b == b'|' {
            pipe_count += 1;
            if pipe_count == 2 {
                return String::from_utf8(key[i + 1..].to_vec()).ok();
            }
        }
    }
    None
}

// =============================================================================
// In-transaction record helpers
// =============================================================================

fn read_wallet(table: &Table<'_, &str, &[u8]>, wallet_id: &str) -> LedgerDbResult<StoredWallet> {
    let bytes = {
        let value = table
            .get(wallet_id)?
            .ok_or_else(|| LedgerDbError::NotFound(format!("wallet {wallet_id}")))?;
        value.value().to_vec()
    };
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_wallet(table: &mut Table<'_, &str, &[u8]>, wallet: &StoredWallet) -> LedgerDbResult<()> {
    let json = serde_json::to_vec(wallet)?;
    table.insert(wallet.wallet_id.as_str(), json.as_slice())?;
    Ok(())
}

fn read_tx(table: &Table<'_, &str, &[u8]>, tx_id: &str) -> LedgerDbResult<StoredTransaction> {
    let bytes = {
        let value = table
            .get(tx_id)?
            .ok_or_else(|| LedgerDbError::NotFound(format!("transaction {tx_id}")))?;
        value.value().to_vec()
    };
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_tx(table: &mut Table<'_, &str, &[u8]>, tx: &StoredTransaction) -> LedgerDbResult<()> {
    let json = serde_json::to_vec(tx)?;
    table.insert(tx.tx_id.as_str(), json.as_slice())?;
    Ok(())
}

fn kind_label(tx: &StoredTransaction) -> &'static str {
    match tx.kind {
        TxKind::Deposit => "deposit",
        TxKind::Withdrawal => "withdrawal",
        TxKind::EscrowLock => "escrow_lock",
        TxKind::EscrowRelease => "escrow_release",
        TxKind::EscrowSettle => "escrow_settle",
    }
}

/// Apply a balance effect to a wallet record, enforcing the non-negative
/// balance and lock invariants.
fn apply_effect(wallet: &mut StoredWallet, effect: BalanceEffect) -> LedgerDbResult<()> {
    match effect {
        BalanceEffect::Credit(amount) => {
            wallet.balance_cents += amount;
        }
        BalanceEffect::Unlock(amount) => {
            if wallet.locked_cents < amount {
                return Err(LedgerDbError::InsufficientSpendable {
                    available: wallet.locked_cents,
                    required: amount,
                });
            }
            wallet.locked_cents -= amount;
        }
        BalanceEffect::SettleLock(amount) => {
            if wallet.balance_cents < amount || wallet.locked_cents < amount {
                return Err(LedgerDbError::InsufficientSpendable {
                    available: wallet.balance_cents.min(wallet.locked_cents),
                    required: amount,
                });
            }
            wallet.balance_cents -= amount;
            wallet.locked_cents -= amount;
        }
    }
    wallet.updated_at = chrono::Utc::now();
    Ok(())
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(OWNER_WALLET_INDEX)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(PROVIDER_REF_INDEX)?;
            let _ = write_txn.open_table(WALLET_TX_INDEX)?;
            let _ = write_txn.open_table(ESCROW_OPS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Get the owner's wallet for a currency, creating it if absent.
    ///
    /// Wallet creation is idempotent per (owner, currency): repeated calls
    /// return the same wallet.
    pub fn create_wallet(&self, owner_user_id: &str, currency: &str) -> LedgerDbResult<StoredWallet> {
        let index_key = owner_index_key(owner_user_id, currency);

        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut index = write_txn.open_table(OWNER_WALLET_INDEX)?;

            let existing_id = index.get(index_key.as_str())?.map(|v| v.value().to_string());
            match existing_id {
                Some(id) => read_wallet(&wallets, &id)?,
                None => {
                    let wallet = StoredWallet::new(owner_user_id, currency);
                    write_wallet(&mut wallets, &wallet)?;
                    index.insert(index_key.as_str(), wallet.wallet_id.as_str())?;
                    wallet
                }
            }
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    /// Look up a wallet by id.
    pub fn get_wallet(&self, wallet_id: &str) -> LedgerDbResult<Option<StoredWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(wallet_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up an owner's wallet for a currency.
    pub fn wallet_for_owner(
        &self,
        owner_user_id: &str,
        currency: &str,
    ) -> LedgerDbResult<Option<StoredWallet>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OWNER_WALLET_INDEX)?;
        let wallet_id = match index.get(owner_index_key(owner_user_id, currency).as_str())? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(wallet_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Soft-enable or soft-disable a wallet.
    pub fn set_wallet_active(&self, wallet_id: &str, active: bool) -> LedgerDbResult<StoredWallet> {
        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallet = read_wallet(&wallets, wallet_id)?;
            wallet.is_active = active;
            wallet.updated_at = chrono::Utc::now();
            write_wallet(&mut wallets, &wallet)?;
            wallet
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Insert a transaction that carries no balance effect at creation
    /// (deposits awaiting confirmation).
    pub fn insert_transaction(&self, tx: &StoredTransaction) -> LedgerDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut txs = write_txn.open_table(TRANSACTIONS)?;
            write_tx(&mut txs, tx)?;
            self.index_transaction(&write_txn, tx)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn index_transaction(
        &self,
        write_txn: &redb::WriteTransaction,
        tx: &StoredTransaction,
    ) -> LedgerDbResult<()> {
        let mut idx = write_txn.open_table(WALLET_TX_INDEX)?;
        let key = make_index_key(&tx.wallet_id, tx.created_at.timestamp(), &tx.tx_id);
        idx.insert(key.as_slice(), kind_label(tx))?;

        if let Some(provider_ref) = &tx.provider_ref {
            let mut refs = write_txn.open_table(PROVIDER_REF_INDEX)?;
            refs.insert(provider_ref.as_str(), tx.tx_id.as_str())?;
        }
        Ok(())
    }

    /// Look up a single transaction by id.
    pub fn get_transaction(&self, tx_id: &str) -> LedgerDbResult<Option<StoredTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(tx_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a payment-provider reference to its transaction.
    pub fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> LedgerDbResult<Option<StoredTransaction>> {
        let read_txn = self.db.begin_read()?;
        let refs = read_txn.open_table(PROVIDER_REF_INDEX)?;
        let tx_id = match refs.get(provider_ref)? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        let txs = read_txn.open_table(TRANSACTIONS)?;
        match txs.get(tx_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Attach the provider's reference to a transaction once known.
    pub fn set_provider_ref(&self, tx_id: &str, provider_ref: &str) -> LedgerDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut txs = write_txn.open_table(TRANSACTIONS)?;
            let mut tx = read_tx(&txs, tx_id)?;
            tx.provider_ref = Some(provider_ref.to_string());
            tx.updated_at = chrono::Utc::now();
            write_tx(&mut txs, &tx)?;

            let mut refs = write_txn.open_table(PROVIDER_REF_INDEX)?;
            refs.insert(provider_ref, tx_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Paginated, newest-first listing of a wallet's transactions.
    ///
    /// Returns `(transactions, next_cursor)`.
    pub fn list_wallet_transactions(
        &self,
        wallet_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> LedgerDbResult<(Vec<StoredTransaction>, Option<String>)> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(WALLET_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(wallet_id);
        let prefix_end = make_prefix_end(wallet_id);

        let start: Vec<u8> = cursor
            .and_then(decode_cursor)
            .unwrap_or_else(|| prefix.clone());

        let mut results = Vec::with_capacity(limit + 1);
        let range = idx_table.range(start.as_slice()..prefix_end.as_slice())?;

        let mut skip_first = cursor.is_some();
        let mut last_key: Option<Vec<u8>> = None;

        for entry in range {
            let entry = entry?;
            let key_bytes = entry.0.value().to_vec();

            // Skip the cursor entry itself
            if skip_first {
                skip_first = false;
                continue;
            }

            if let Some(tx_id) = extract_tx_id_from_key(&key_bytes) {
                if let Some(value) = tx_table.get(tx_id.as_str())? {
                    let tx: StoredTransaction = serde_json::from_slice(value.value())?;
                    results.push(tx);
                    last_key = Some(key_bytes);
                }
            }

            if results.len() >= limit {
                break;
            }
        }

        let next_cursor = if results.len() >= limit {
            last_key.map(|k| encode_cursor(&k))
        } else {
            None
        };

        Ok((results, next_cursor))
    }

    // =========================================================================
    // Balance-mutating operations
    // =========================================================================

    /// Insert a withdrawal and apply its pre-debit atomically.
    ///
    /// The spendable check, the debit of `amount + fee`, and the insert of the
    /// `Processing` record all happen in one write transaction, so two
    /// concurrent withdrawals can never both pass the check against the same
    /// funds.
    pub fn debit_for_withdrawal(&self, tx: &StoredTransaction) -> LedgerDbResult<StoredWallet> {
        let required = tx.amount_cents + tx.fee_cents;
        let write_txn = self.db.begin_write()?;
        let wallet = {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallet = read_wallet(&wallets, &tx.wallet_id)?;
            if !wallet.is_active {
                return Err(LedgerDbError::WalletInactive(wallet.wallet_id));
            }
            if wallet.spendable_cents() < required {
                return Err(LedgerDbError::InsufficientSpendable {
                    available: wallet.spendable_cents(),
                    required,
                });
            }
            wallet.balance_cents -= required;
            wallet.updated_at = chrono::Utc::now();
            write_wallet(&mut wallets, &wallet)?;

            let mut txs = write_txn.open_table(TRANSACTIONS)?;
            write_tx(&mut txs, tx)?;
            self.index_transaction(&write_txn, tx)?;
            wallet
        };
        write_txn.commit()?;
        Ok(wallet)
    }

    /// Move a transaction to `target`, applying its balance effect atomically.
    ///
    /// Replays on terminal transactions return
    /// [`TransitionOutcome::AlreadyTerminal`] without touching anything, which
    /// is the idempotency guarantee webhook redelivery relies on. Illegal
    /// transitions return [`LedgerDbError::InvalidTransition`].
    pub fn apply_transition(
        &self,
        tx_id: &str,
        target: TxStatus,
        failure: Option<FailureInfo>,
    ) -> LedgerDbResult<TransitionOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut txs = write_txn.open_table(TRANSACTIONS)?;
            let mut tx = read_tx(&txs, tx_id)?;

            let effect = match machine::plan(&tx, target) {
                TransitionPlan::AlreadyTerminal => {
                    return Ok(TransitionOutcome::AlreadyTerminal(tx));
                }
                TransitionPlan::Invalid => {
                    return Err(LedgerDbError::InvalidTransition {
                        from: format!("{:?}", tx.status).to_ascii_lowercase(),
                        to: format!("{target:?}").to_ascii_lowercase(),
                    });
                }
                TransitionPlan::Apply(effect) => effect,
            };

            if let Some(effect) = effect {
                let mut wallets = write_txn.open_table(WALLETS)?;
                let mut wallet = read_wallet(&wallets, &tx.wallet_id)?;
                apply_effect(&mut wallet, effect)?;
                write_wallet(&mut wallets, &wallet)?;
                // The flag is monotonic: once a transaction has mutated its
                // wallet it stays marked, even when a later transition carries
                // a reversing credit. The terminal status itself records the
                // reversal, and the already-terminal guard above keeps it from
                // applying twice.
                tx.balance_adjusted = true;
            }

            let now = chrono::Utc::now();
            tx.status = target;
            tx.updated_at = now;
            if matches!(target, TxStatus::Completed | TxStatus::Settled) {
                tx.completed_at = Some(now);
            }
            if let Some(failure) = failure {
                tx.error_code = Some(failure.code);
                tx.error_message = Some(failure.message);
            }
            write_tx(&mut txs, &tx)?;
            TransitionOutcome::Applied(tx)
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Escrow
    // =========================================================================

    /// Look up an escrow operation by id.
    pub fn get_escrow(&self, operation_id: &str) -> LedgerDbResult<Option<EscrowOperation>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ESCROW_OPS)?;
        match table.get(operation_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn write_escrow(
        &self,
        write_txn: &redb::WriteTransaction,
        op: &EscrowOperation,
    ) -> LedgerDbResult<()> {
        let mut table = write_txn.open_table(ESCROW_OPS)?;
        let json = serde_json::to_vec(op)?;
        table.insert(op.operation_id.as_str(), json.as_slice())?;
        Ok(())
    }

    /// Atomically reserve both legs of a swap and record the operation.
    ///
    /// For each leg: checks the locking wallet is active and has spendable
    /// funds covering the leg amount, raises `locked_cents`, and inserts the
    /// `Locked` lock transaction. Either both legs lock or neither does.
    pub fn lock_escrow_legs(
        &self,
        op: &EscrowOperation,
        lock_a: &StoredTransaction,
        lock_b: &StoredTransaction,
    ) -> LedgerDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            for (leg, lock_tx) in [(&op.leg_a, lock_a), (&op.leg_b, lock_b)] {
                let mut wallet = read_wallet(&wallets, &leg.wallet_id)?;
                if !wallet.is_active {
                    return Err(LedgerDbError::WalletInactive(wallet.wallet_id));
                }
                if wallet.spendable_cents() < leg.amount_cents {
                    return Err(LedgerDbError::InsufficientSpendable {
                        available: wallet.spendable_cents(),
                        required: leg.amount_cents,
                    });
                }
                // Beneficiary must exist before money can ever reach it.
                read_wallet(&wallets, &leg.beneficiary_wallet_id)?;
                wallet.locked_cents += leg.amount_cents;
                wallet.updated_at = chrono::Utc::now();
                write_wallet(&mut wallets, &wallet)?;

                let mut txs = write_txn.open_table(TRANSACTIONS)?;
                let mut lock_tx = lock_tx.clone();
                lock_tx.balance_adjusted = true;
                write_tx(&mut txs, &lock_tx)?;
                drop(txs);
                self.index_transaction(&write_txn, &lock_tx)?;
            }
            self.write_escrow(&write_txn, op)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Atomically settle a locked escrow operation: both locks consumed, both
    /// beneficiaries credited, both settle records inserted.
    ///
    /// Only a `Locked` operation settles; a `Settled` or `Released` one is
    /// rejected with [`LedgerDbError::InvalidTransition`] (first resolver
    /// wins).
    pub fn settle_escrow(
        &self,
        operation_id: &str,
        settle_a: &StoredTransaction,
        settle_b: &StoredTransaction,
    ) -> LedgerDbResult<EscrowOperation> {
        let write_txn = self.db.begin_write()?;
        let op = {
            let mut op = self.load_locked_escrow(&write_txn, operation_id)?;

            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut txs = write_txn.open_table(TRANSACTIONS)?;

            for (leg, settle_tx) in [(&op.leg_a, settle_a), (&op.leg_b, settle_b)] {
                // Debit the locker: balance and lock drop together.
                let mut lock_tx = read_tx(&txs, &leg.lock_tx_id)?;
                let mut locker = read_wallet(&wallets, &leg.wallet_id)?;
                apply_effect(&mut locker, BalanceEffect::SettleLock(leg.amount_cents))?;
                write_wallet(&mut wallets, &locker)?;

                let now = chrono::Utc::now();
                lock_tx.status = TxStatus::Settled;
                lock_tx.updated_at = now;
                lock_tx.completed_at = Some(now);
                write_tx(&mut txs, &lock_tx)?;

                // Credit the beneficiary. Re-read in case it was the other
                // leg's locker within this same transaction.
                let mut beneficiary = read_wallet(&wallets, &leg.beneficiary_wallet_id)?;
                apply_effect(&mut beneficiary, BalanceEffect::Credit(leg.amount_cents))?;
                write_wallet(&mut wallets, &beneficiary)?;
                write_tx(&mut txs, settle_tx)?;
            }
            drop(txs);
            drop(wallets);
            self.index_transaction(&write_txn, settle_a)?;
            self.index_transaction(&write_txn, settle_b)?;

            op.status = EscrowOpStatus::Settled;
            op.settle_tx_ids = vec![settle_a.tx_id.clone(), settle_b.tx_id.clone()];
            op.updated_at = chrono::Utc::now();
            self.write_escrow(&write_txn, &op)?;
            op
        };
        write_txn.commit()?;
        Ok(op)
    }

    /// Atomically release a locked escrow operation: both locks returned,
    /// no balances move, audit records inserted.
    pub fn release_escrow(
        &self,
        operation_id: &str,
        release_a: &StoredTransaction,
        release_b: &StoredTransaction,
    ) -> LedgerDbResult<EscrowOperation> {
        let write_txn = self.db.begin_write()?;
        let op = {
            let mut op = self.load_locked_escrow(&write_txn, operation_id)?;

            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut txs = write_txn.open_table(TRANSACTIONS)?;

            for (leg, release_tx) in [(&op.leg_a, release_a), (&op.leg_b, release_b)] {
                let mut lock_tx = read_tx(&txs, &leg.lock_tx_id)?;
                let mut locker = read_wallet(&wallets, &leg.wallet_id)?;
                apply_effect(&mut locker, BalanceEffect::Unlock(leg.amount_cents))?;
                write_wallet(&mut wallets, &locker)?;

                lock_tx.status = TxStatus::Released;
                lock_tx.updated_at = chrono::Utc::now();
                write_tx(&mut txs, &lock_tx)?;
                write_tx(&mut txs, release_tx)?;
            }
            drop(txs);
            drop(wallets);
            self.index_transaction(&write_txn, release_a)?;
            self.index_transaction(&write_txn, release_b)?;

            op.status = EscrowOpStatus::Released;
            op.updated_at = chrono::Utc::now();
            self.write_escrow(&write_txn, &op)?;
            op
        };
        write_txn.commit()?;
        Ok(op)
    }

    fn load_locked_escrow(
        &self,
        write_txn: &redb::WriteTransaction,
        operation_id: &str,
    ) -> LedgerDbResult<EscrowOperation> {
        let table = write_txn.open_table(ESCROW_OPS)?;
        let bytes = {
            let value = table
                .get(operation_id)?
                .ok_or_else(|| LedgerDbError::NotFound(format!("escrow {operation_id}")))?;
            value.value().to_vec()
        };
        let op: EscrowOperation = serde_json::from_slice(&bytes)?;
        if op.status != EscrowOpStatus::Locked {
            return Err(LedgerDbError::InvalidTransition {
                from: format!("{:?}", op.status).to_ascii_lowercase(),
                to: "resolved".to_string(),
            });
        }
        Ok(op)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{EscrowLeg, PayMethod, TxKind};

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn funded_wallet(db: &LedgerDb, owner: &str, currency: &str, cents: i64) -> StoredWallet {
        let wallet = db.create_wallet(owner, currency).unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, cents, 0, PayMethod::Card);
        db.insert_transaction(&tx).unwrap();
        db.apply_transition(&tx.tx_id, TxStatus::Completed, None).unwrap();
        db.get_wallet(&wallet.wallet_id).unwrap().unwrap()
    }

    #[test]
    fn wallet_creation_is_idempotent_per_owner_currency() {
        let (db, _dir) = temp_db();
        let w1 = db.create_wallet("alice", "EUR").unwrap();
        let w2 = db.create_wallet("alice", "EUR").unwrap();
        assert_eq!(w1.wallet_id, w2.wallet_id);

        let w3 = db.create_wallet("alice", "XOF").unwrap();
        assert_ne!(w1.wallet_id, w3.wallet_id);
    }

    #[test]
    fn deposit_credits_exactly_once() {
        let (db, _dir) = temp_db();
        let wallet = db.create_wallet("alice", "EUR").unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, 10_000, 370, PayMethod::Card);
        db.insert_transaction(&tx).unwrap();

        let first = db.apply_transition(&tx.tx_id, TxStatus::Completed, None).unwrap();
        assert!(first.was_applied());
        assert!(first.transaction().balance_adjusted);

        // Replay is a no-op
        let replay = db.apply_transition(&tx.tx_id, TxStatus::Completed, None).unwrap();
        assert!(!replay.was_applied());

        let wallet = db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 10_000);
    }

    #[test]
    fn failed_deposit_moves_nothing() {
        let (db, _dir) = temp_db();
        let wallet = db.create_wallet("alice", "EUR").unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, 10_000, 0, PayMethod::Card);
        db.insert_transaction(&tx).unwrap();

        let failure = FailureInfo {
            code: "card_declined".to_string(),
            message: "Card declined".to_string(),
        };
        let outcome = db
            .apply_transition(&tx.tx_id, TxStatus::Failed, Some(failure))
            .unwrap();
        assert_eq!(outcome.transaction().error_code.as_deref(), Some("card_declined"));

        let wallet = db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 0);
    }

    #[test]
    fn withdrawal_pre_debits_and_reverses_on_failure() {
        let (db, _dir) = temp_db();
        let wallet = funded_wallet(&db, "alice", "EUR", 10_000);

        let tx = StoredTransaction::new_withdrawal(&wallet, 5_000, 100, PayMethod::Card);
        db.debit_for_withdrawal(&tx).unwrap();

        let after_debit = db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(after_debit.balance_cents, 4_900);

        let outcome = db.apply_transition(&tx.tx_id, TxStatus::Failed, None).unwrap();
        let after_reverse = db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(after_reverse.balance_cents, 10_000);

        // The flag is monotonic: the reversal is recorded in the status, not
        // by clearing the mutation marker.
        assert!(outcome.transaction().balance_adjusted);
    }

    #[test]
    fn unlock_beyond_locked_funds_is_an_accounting_error() {
        let mut wallet = StoredWallet::new("alice", "EUR");
        wallet.balance_cents = 10_000;
        wallet.locked_cents = 1_000;

        let err = apply_effect(&mut wallet, BalanceEffect::Unlock(2_000)).unwrap_err();
        assert!(matches!(
            err,
            LedgerDbError::InsufficientSpendable { available: 1_000, required: 2_000 }
        ));
        // Untouched, not clamped
        assert_eq!(wallet.locked_cents, 1_000);
    }

    #[test]
    fn withdrawal_rejected_when_spendable_insufficient() {
        let (db, _dir) = temp_db();
        let wallet = funded_wallet(&db, "alice", "EUR", 1_000);

        let tx = StoredTransaction::new_withdrawal(&wallet, 5_000, 100, PayMethod::Card);
        let err = db.debit_for_withdrawal(&tx).unwrap_err();
        assert!(matches!(
            err,
            LedgerDbError::InsufficientSpendable { available: 1_000, required: 5_100 }
        ));

        // Nothing inserted, nothing debited
        assert!(db.get_transaction(&tx.tx_id).unwrap().is_none());
        let wallet = db.get_wallet(&wallet.wallet_id).unwrap().unwrap();
        assert_eq!(wallet.balance_cents, 1_000);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (db, _dir) = temp_db();
        let wallet = db.create_wallet("alice", "EUR").unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, 1_000, 0, PayMethod::Card);
        db.insert_transaction(&tx).unwrap();

        let err = db.apply_transition(&tx.tx_id, TxStatus::Settled, None).unwrap_err();
        assert!(matches!(err, LedgerDbError::InvalidTransition { .. }));
    }

    #[test]
    fn provider_ref_lookup() {
        let (db, _dir) = temp_db();
        let wallet = db.create_wallet("alice", "EUR").unwrap();
        let tx = StoredTransaction::new_deposit(&wallet, 1_000, 0, PayMethod::Card);
        db.insert_transaction(&tx).unwrap();
        db.set_provider_ref(&tx.tx_id, "flw-ref-123").unwrap();

        let found = db.find_by_provider_ref("flw-ref-123").unwrap().unwrap();
        assert_eq!(found.tx_id, tx.tx_id);
        assert!(db.find_by_provider_ref("flw-ref-999").unwrap().is_none());
    }

    #[test]
    fn list_wallet_transactions_with_pagination() {
        let (db, _dir) = temp_db();
        let wallet = db.create_wallet("alice", "EUR").unwrap();

        for i in 0..5 {
            let mut tx = StoredTransaction::new_deposit(&wallet, 100 * (i + 1), 0, PayMethod::Card);
            tx.created_at = chrono::Utc::now() - chrono::Duration::seconds(5 - i);
            db.insert_transaction(&tx).unwrap();
        }

        let (page1, cursor) = db.list_wallet_transactions(&wallet.wallet_id, None, 2).unwrap();
        assert_eq!(page1.len(), 2);
        assert!(cursor.is_some());
        // Newest first
        assert!(page1[0].created_at >= page1[1].created_at);

        let (page2, cursor2) = db
            .list_wallet_transactions(&wallet.wallet_id, cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(page2.len(), 2);

        let (page3, cursor3) = db
            .list_wallet_transactions(&wallet.wallet_id, cursor2.as_deref(), 2)
            .unwrap();
        assert_eq!(page3.len(), 1);
        assert!(cursor3.is_none());
    }

    fn setup_escrow(db: &LedgerDb) -> (EscrowOperation, StoredWallet, StoredWallet, StoredWallet, StoredWallet) {
        // Alice swaps EUR for Bob's XOF.
        let alice_eur = funded_wallet(db, "alice", "EUR", 10_000);
        let alice_xof = db.create_wallet("alice", "XOF").unwrap();
        let bob_eur = db.create_wallet("bob", "EUR").unwrap();
        let bob_xof = funded_wallet(db, "bob", "XOF", 700_000);

        let lock_a = StoredTransaction::new_escrow_lock(&alice_eur, 10_000, "pending");
        let lock_b = StoredTransaction::new_escrow_lock(&bob_xof, 650_000, "pending");
        let op = EscrowOperation::new(
            EscrowLeg {
                wallet_id: alice_eur.wallet_id.clone(),
                beneficiary_wallet_id: bob_eur.wallet_id.clone(),
                amount_cents: 10_000,
                lock_tx_id: lock_a.tx_id.clone(),
            },
            EscrowLeg {
                wallet_id: bob_xof.wallet_id.clone(),
                beneficiary_wallet_id: alice_xof.wallet_id.clone(),
                amount_cents: 650_000,
                lock_tx_id: lock_b.tx_id.clone(),
            },
        );
        let mut lock_a = lock_a;
        let mut lock_b = lock_b;
        lock_a.escrow_op = Some(op.operation_id.clone());
        lock_b.escrow_op = Some(op.operation_id.clone());
        db.lock_escrow_legs(&op, &lock_a, &lock_b).unwrap();
        (op, alice_eur, alice_xof, bob_eur, bob_xof)
    }

    #[test]
    fn escrow_lock_reserves_both_legs() {
        let (db, _dir) = temp_db();
        let (op, alice_eur, _, _, bob_xof) = setup_escrow(&db);

        let alice = db.get_wallet(&alice_eur.wallet_id).unwrap().unwrap();
        assert_eq!(alice.balance_cents, 10_000);
        assert_eq!(alice.locked_cents, 10_000);
        assert_eq!(alice.spendable_cents(), 0);

        let bob = db.get_wallet(&bob_xof.wallet_id).unwrap().unwrap();
        assert_eq!(bob.locked_cents, 650_000);

        let stored = db.get_escrow(&op.operation_id).unwrap().unwrap();
        assert_eq!(stored.status, EscrowOpStatus::Locked);
    }

    #[test]
    fn escrow_lock_fails_atomically_when_second_leg_short() {
        let (db, _dir) = temp_db();
        let alice_eur = funded_wallet(&db, "alice", "EUR", 10_000);
        let alice_xof = db.create_wallet("alice", "XOF").unwrap();
        let bob_eur = db.create_wallet("bob", "EUR").unwrap();
        let bob_xof = funded_wallet(&db, "bob", "XOF", 100); // not enough

        let lock_a = StoredTransaction::new_escrow_lock(&alice_eur, 10_000, "op");
        let lock_b = StoredTransaction::new_escrow_lock(&bob_xof, 650_000, "op");
        let op = EscrowOperation::new(
            EscrowLeg {
                wallet_id: alice_eur.wallet_id.clone(),
                beneficiary_wallet_id: bob_eur.wallet_id.clone(),
                amount_cents: 10_000,
                lock_tx_id: lock_a.tx_id.clone(),
            },
            EscrowLeg {
                wallet_id: bob_xof.wallet_id.clone(),
                beneficiary_wallet_id: alice_xof.wallet_id.clone(),
                amount_cents: 650_000,
                lock_tx_id: lock_b.tx_id.clone(),
            },
        );
        assert!(db.lock_escrow_legs(&op, &lock_a, &lock_b).is_err());

        // First leg's reservation rolled back with the transaction
        let alice = db.get_wallet(&alice_eur.wallet_id).unwrap().unwrap();
        assert_eq!(alice.locked_cents, 0);
        assert!(db.get_escrow(&op.operation_id).unwrap().is_none());
    }

    #[test]
    fn escrow_settle_moves_both_legs() {
        let (db, _dir) = temp_db();
        let (op, alice_eur, alice_xof, bob_eur, bob_xof) = setup_escrow(&db);

        let bob_eur_w = db.get_wallet(&bob_eur.wallet_id).unwrap().unwrap();
        let alice_xof_w = db.get_wallet(&alice_xof.wallet_id).unwrap().unwrap();
        let settle_a = StoredTransaction::new_escrow_settle(&bob_eur_w, 10_000, &op.operation_id);
        let settle_b = StoredTransaction::new_escrow_settle(&alice_xof_w, 650_000, &op.operation_id);

        let settled = db.settle_escrow(&op.operation_id, &settle_a, &settle_b).unwrap();
        assert_eq!(settled.status, EscrowOpStatus::Settled);
        assert_eq!(settled.settle_tx_ids.len(), 2);

        let alice_eur_w = db.get_wallet(&alice_eur.wallet_id).unwrap().unwrap();
        assert_eq!(alice_eur_w.balance_cents, 0);
        assert_eq!(alice_eur_w.locked_cents, 0);

        let bob_eur_w = db.get_wallet(&bob_eur.wallet_id).unwrap().unwrap();
        assert_eq!(bob_eur_w.balance_cents, 10_000);

        let alice_xof_w = db.get_wallet(&alice_xof.wallet_id).unwrap().unwrap();
        assert_eq!(alice_xof_w.balance_cents, 650_000);

        let bob_xof_w = db.get_wallet(&bob_xof.wallet_id).unwrap().unwrap();
        assert_eq!(bob_xof_w.balance_cents, 50_000);
        assert_eq!(bob_xof_w.locked_cents, 0);

        // Lock legs are terminal now
        let lock = db.get_transaction(&op.leg_a.lock_tx_id).unwrap().unwrap();
        assert_eq!(lock.status, TxStatus::Settled);
    }

    #[test]
    fn escrow_release_returns_locks_without_moving_money() {
        let (db, _dir) = temp_db();
        let (op, alice_eur, alice_xof, bob_eur, bob_xof) = setup_escrow(&db);

        let alice_w = db.get_wallet(&alice_eur.wallet_id).unwrap().unwrap();
        let bob_w = db.get_wallet(&bob_xof.wallet_id).unwrap().unwrap();
        let rel_a = StoredTransaction::new_escrow_release(&alice_w, 10_000, &op.operation_id);
        let rel_b = StoredTransaction::new_escrow_release(&bob_w, 650_000, &op.operation_id);

        let released = db.release_escrow(&op.operation_id, &rel_a, &rel_b).unwrap();
        assert_eq!(released.status, EscrowOpStatus::Released);

        let alice = db.get_wallet(&alice_eur.wallet_id).unwrap().unwrap();
        assert_eq!(alice.balance_cents, 10_000);
        assert_eq!(alice.locked_cents, 0);

        let bob = db.get_wallet(&bob_xof.wallet_id).unwrap().unwrap();
        assert_eq!(bob.balance_cents, 700_000);
        assert_eq!(bob.locked_cents, 0);

        // Beneficiaries untouched
        assert_eq!(db.get_wallet(&bob_eur.wallet_id).unwrap().unwrap().balance_cents, 0);
        assert_eq!(db.get_wallet(&alice_xof.wallet_id).unwrap().unwrap().balance_cents, 0);
    }

    #[test]
    fn escrow_settle_then_release_first_wins() {
        let (db, _dir) = temp_db();
        let (op, _, alice_xof, bob_eur, _) = setup_escrow(&db);

        let bob_eur_w = db.get_wallet(&bob_eur.wallet_id).unwrap().unwrap();
        let alice_xof_w = db.get_wallet(&alice_xof.wallet_id).unwrap().unwrap();
        let settle_a = StoredTransaction::new_escrow_settle(&bob_eur_w, 10_000, &op.operation_id);
        let settle_b = StoredTransaction::new_escrow_settle(&alice_xof_w, 650_000, &op.operation_id);
        db.settle_escrow(&op.operation_id, &settle_a, &settle_b).unwrap();

        let rel_a = StoredTransaction::new_escrow_release(&bob_eur_w, 10_000, &op.operation_id);
        let rel_b = StoredTransaction::new_escrow_release(&alice_xof_w, 650_000, &op.operation_id);
        let err = db.release_escrow(&op.operation_id, &rel_a, &rel_b).unwrap_err();
        assert!(matches!(err, LedgerDbError::InvalidTransition { .. }));
    }

    #[test]
    fn inactive_wallet_rejects_debits() {
        let (db, _dir) = temp_db();
        let wallet = funded_wallet(&db, "alice", "EUR", 10_000);
        db.set_wallet_active(&wallet.wallet_id, false).unwrap();

        let tx = StoredTransaction::new_withdrawal(&wallet, 1_000, 0, PayMethod::Card);
        let err = db.debit_for_withdrawal(&tx).unwrap_err();
        assert!(matches!(err, LedgerDbError::WalletInactive(_)));
    }

    #[test]
    fn index_key_orders_newest_first() {
        let key_old = make_index_key("w1", 1000, "tx1");
        let key_new = make_index_key("w1", 2000, "tx2");
        assert!(key_new < key_old, "newer timestamps should sort first");
    }
}
