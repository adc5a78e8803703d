// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persistence layer: record types and the embedded redb ledger database.

pub mod ledger_db;
pub mod records;

pub use ledger_db::{LedgerDb, LedgerDbError, TransitionOutcome};
