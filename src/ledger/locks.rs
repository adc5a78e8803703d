// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-wallet async locks.
//!
//! Settlement holds a wallet's lock across the provider round-trip so that
//! two concurrent withdrawals from the same wallet serialize instead of both
//! passing the spendable check. Escrow acquires both wallets' locks in
//! sorted-id order, which makes lock acquisition deadlock-free.
//!
//! Acquisition is bounded: a caller that cannot get the lock within the
//! configured window gets [`LedgerError::ConcurrentModification`] instead of
//! queueing unboundedly behind a slow provider call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::LedgerError;

/// Registry of per-wallet mutexes, keyed by wallet id.
#[derive(Debug)]
pub struct WalletLocks {
    inner: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    acquire_timeout: Duration,
}

/// Guard keeping one wallet's lock held. Dropping it releases the lock.
pub struct WalletGuard {
    _guard: OwnedMutexGuard<()>,
}

impl WalletLocks {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
            acquire_timeout,
        }
    }

    fn handle(&self, wallet_id: &str) -> Arc<Mutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(wallet_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire one wallet's lock, waiting at most the configured timeout.
    pub async fn acquire(&self, wallet_id: &str) -> Result<WalletGuard, LedgerError> {
        let handle = self.handle(wallet_id);
        let guard = tokio::time::timeout(self.acquire_timeout, handle.lock_owned())
            .await
            .map_err(|_| LedgerError::ConcurrentModification)?;
        Ok(WalletGuard { _guard: guard })
    }

    /// Acquire several wallets' locks in ascending id order. Duplicate ids
    /// are collapsed so a caller passing the same wallet twice does not
    /// self-deadlock.
    pub async fn acquire_many(&self, wallet_ids: &[&str]) -> Result<Vec<WalletGuard>, LedgerError> {
        let mut ids: Vec<&str> = wallet_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_serializes_same_wallet() {
        let locks = Arc::new(WalletLocks::new(Duration::from_millis(50)));
        let guard = locks.acquire("w1").await.unwrap();

        let locks2 = locks.clone();
        let contender = tokio::spawn(async move { locks2.acquire("w1").await });
        let err = contender.await.unwrap();
        assert!(matches!(err, Err(LedgerError::ConcurrentModification)));

        drop(guard);
        assert!(locks.acquire("w1").await.is_ok());
    }

    #[tokio::test]
    async fn different_wallets_do_not_contend() {
        let locks = WalletLocks::new(Duration::from_millis(50));
        let _a = locks.acquire("w1").await.unwrap();
        let _b = locks.acquire("w2").await.unwrap();
    }

    #[tokio::test]
    async fn acquire_many_dedups_and_sorts() {
        let locks = WalletLocks::new(Duration::from_millis(50));
        let guards = locks.acquire_many(&["w2", "w1", "w2"]).await.unwrap();
        assert_eq!(guards.len(), 2);
    }
}
