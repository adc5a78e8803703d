// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity verification clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{KycStatus, KycVerifier, ProviderError};

/// Client for an external verification service exposing
/// `GET {base}/users/{user_id}/status`.
#[derive(Debug, Clone)]
pub struct KycClient {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct KycStatusResponse {
    status: String,
}

impl KycClient {
    pub fn is_configured() -> bool {
        std::env::var("KYC_API_BASE_URL").map(|v| !v.trim().is_empty()).unwrap_or(false)
            && std::env::var("KYC_API_KEY").map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = std::env::var("KYC_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ProviderError::MissingConfig("KYC_API_BASE_URL"))?;
        let api_key = std::env::var("KYC_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ProviderError::MissingConfig("KYC_API_KEY"))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl KycVerifier for KycClient {
    async fn status(&self, user_id: &str) -> Result<KycStatus, ProviderError> {
        let url = format!("{}/users/{user_id}/status", self.base_url);
        let response: KycStatusResponse = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(match response.status.as_str() {
            "verified" => KycStatus::Verified,
            "rejected" => KycStatus::Rejected,
            _ => KycStatus::Pending,
        })
    }
}

/// Allow-all verifier for development setups without a KYC service.
#[derive(Debug, Clone, Default)]
pub struct StaticKycVerifier;

#[async_trait]
impl KycVerifier for StaticKycVerifier {
    async fn status(&self, _user_id: &str) -> Result<KycStatus, ProviderError> {
        Ok(KycStatus::Verified)
    }
}
