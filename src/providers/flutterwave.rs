// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Flutterwave integration for card and mobile money rails.
//!
//! Charges go through the hosted payment page: we initiate, hand the user the
//! redirect link, and learn the outcome from webhooks. Transfers (payouts)
//! are initiated here and likewise resolved by webhooks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use super::{
    ChargeOutcome, ChargeRequest, PaymentProvider, ProviderError, TransferOutcome, TransferRequest,
};

const DEFAULT_API_BASE_URL: &str = "https://api.flutterwave.com/v3";
const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000/payments/callback";

#[derive(Debug, Clone)]
pub struct FlutterwaveClient {
    api_base_url: String,
    secret_key: String,
    redirect_url: String,
    http: Client,
}

impl FlutterwaveClient {
    pub fn is_configured() -> bool {
        std::env::var("FLW_SECRET_KEY").map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_base_url = std::env::var("FLW_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let secret_key = std::env::var("FLW_SECRET_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ProviderError::MissingConfig("FLW_SECRET_KEY"))?;
        let redirect_url = std::env::var("FLW_REDIRECT_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string());

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url,
            secret_key,
            redirect_url,
            http,
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}{path}", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let api_status = body.get("status").and_then(Value::as_str).unwrap_or("");
        if !status.is_success() || api_status != "success" {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified provider error")
                .to_string();
            return Err(ProviderError::Rejected(message));
        }
        Ok(body)
    }
}

/// Convert minor units to the decimal string Flutterwave expects.
fn format_amount(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, amount_cents % 100)
}

#[async_trait]
impl PaymentProvider for FlutterwaveClient {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, ProviderError> {
        let payload = json!({
            "tx_ref": request.reference,
            "amount": format_amount(request.amount_cents),
            "currency": request.currency,
            "payment_options": request.method,
            "redirect_url": self.redirect_url,
            "customer": { "email": request.customer_id },
        });

        let body = self.post("/payments", &payload).await?;
        let link = body
            .pointer("/data/link")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(reference = %request.reference, "flutterwave charge initiated");
        Ok(ChargeOutcome {
            // Charges are keyed by our tx_ref until the webhook supplies
            // the provider-side id.
            provider_ref: request.reference.clone(),
            redirect_url: link,
        })
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, ProviderError> {
        let payload = json!({
            "reference": request.reference,
            "amount": format_amount(request.amount_cents),
            "currency": request.currency,
            "account_number": request.destination,
            "narration": format!("wallet payout {}", request.reference),
        });

        let body = self.post("/transfers", &payload).await?;
        let provider_ref = body
            .pointer("/data/id")
            .map(|id| id.to_string())
            .ok_or_else(|| ProviderError::InvalidResponse("transfer response missing id".into()))?;

        info!(reference = %request.reference, "flutterwave transfer initiated");
        Ok(TransferOutcome { provider_ref })
    }
}
