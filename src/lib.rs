// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cambio - Custodial Wallet and Settlement Service
//!
//! This crate provides the backend for a peer-to-peer currency exchange:
//! custodial wallet balances, provider-backed deposits and withdrawals,
//! webhook reconciliation, and escrowed two-party swaps.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Authentication and authorization (HS256 bearer tokens)
//! - `ledger` - Balance invariants, settlement, escrow, reconciliation
//! - `providers` - Payment provider and KYC integrations
//! - `storage` - Embedded ACID ledger database (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod providers;
pub mod state;
pub mod storage;
