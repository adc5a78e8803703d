// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::ledger::{EscrowEngine, SettlementEngine, WebhookReconciler};
use crate::storage::LedgerDb;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<LedgerDb>,
    pub settlement: Arc<SettlementEngine>,
    pub escrow: Arc<EscrowEngine>,
    pub reconciler: Arc<WebhookReconciler>,
    pub auth_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        db: Arc<LedgerDb>,
        settlement: Arc<SettlementEngine>,
        escrow: Arc<EscrowEngine>,
        reconciler: Arc<WebhookReconciler>,
        auth_secret: &str,
    ) -> Self {
        Self {
            db,
            settlement,
            escrow,
            reconciler,
            auth_secret: auth_secret.into(),
        }
    }

    /// State wired to a temp database, the mock provider, and fixed secrets.
    #[cfg(test)]
    pub fn for_tests() -> (Self, tempfile::TempDir) {
        use crate::ledger::{FeeSchedule, WalletLocks};
        use crate::providers::mock::{MockKyc, MockProvider};
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("test.redb")).unwrap());
        let locks = Arc::new(WalletLocks::new(Duration::from_millis(200)));
        let settlement = Arc::new(SettlementEngine::new(
            db.clone(),
            locks.clone(),
            FeeSchedule::standard(),
            Arc::new(MockProvider::new()),
            Arc::new(MockKyc::new()),
        ));
        let escrow = Arc::new(EscrowEngine::new(db.clone(), locks));
        let reconciler = Arc::new(WebhookReconciler::new(db.clone(), "test-webhook-secret"));
        let state = Self::new(db, settlement, escrow, reconciler, "test-auth-secret");
        (state, dir)
    }
}
