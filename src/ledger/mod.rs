// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger core: balances, transaction lifecycle, settlement, escrow, and
//! webhook reconciliation.

pub mod error;
pub mod escrow;
pub mod fees;
pub mod locks;
pub mod machine;
pub mod reconciler;
pub mod settlement;

pub use error::LedgerError;
pub use escrow::{EscrowEngine, EscrowLegRequest};
pub use fees::{FeeBreakdown, FeeSchedule};
pub use locks::WalletLocks;
pub use reconciler::{ReconcileOutcome, WebhookReconciler};
pub use settlement::{DepositReceipt, SettlementEngine};
