// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scriptable in-process provider, used by tests and by local setups run
//! without provider credentials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ChargeOutcome, ChargeRequest, KycStatus, KycVerifier, PaymentProvider, ProviderError,
    TransferOutcome, TransferRequest,
};

/// How the mock answers the next calls.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Accept every request.
    #[default]
    Accept,
    /// Definitive refusal with the given message.
    Reject(String),
    /// Connection failure before the request got out.
    Unreachable(String),
    /// Timeout after the request may have been delivered.
    Timeout(String),
}

/// In-memory payment provider with a switchable behavior and a log of
/// received requests.
#[derive(Debug, Default)]
pub struct MockProvider {
    behavior: Mutex<MockBehavior>,
    latency: Mutex<Duration>,
    counter: AtomicU64,
    charges: Mutex<Vec<ChargeRequest>>,
    transfers: Mutex<Vec<TransferRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(|p| p.into_inner()) = behavior;
    }

    /// Delay every call by `latency` before answering, to widen race windows
    /// in concurrency tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn next_ref(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    async fn gate(&self) -> Result<(), ProviderError> {
        let delay = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.behavior.lock().unwrap_or_else(|p| p.into_inner()).clone() {
            MockBehavior::Accept => Ok(()),
            MockBehavior::Reject(message) => Err(ProviderError::Rejected(message)),
            MockBehavior::Unreachable(message) => Err(ProviderError::Unavailable(message)),
            MockBehavior::Timeout(message) => Err(ProviderError::Timeout(message)),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, ProviderError> {
        self.charges
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        self.gate().await?;
        Ok(ChargeOutcome {
            provider_ref: self.next_ref("mock-charge"),
            redirect_url: Some(format!("https://pay.invalid/checkout/{}", request.reference)),
        })
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, ProviderError> {
        self.transfers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        self.gate().await?;
        Ok(TransferOutcome {
            provider_ref: self.next_ref("mock-transfer"),
        })
    }
}

/// In-memory KYC verifier with per-user overrides. Unknown users are
/// `Verified`.
#[derive(Debug, Default)]
pub struct MockKyc {
    overrides: Mutex<HashMap<String, KycStatus>>,
}

impl MockKyc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, user_id: &str, status: KycStatus) {
        self.overrides
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.to_string(), status);
    }
}

#[async_trait]
impl KycVerifier for MockKyc {
    async fn status(&self, user_id: &str) -> Result<KycStatus, ProviderError> {
        Ok(self
            .overrides
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
            .copied()
            .unwrap_or(KycStatus::Verified))
    }
}
