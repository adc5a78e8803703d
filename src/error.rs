// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ledger::LedgerError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::InvalidAmount(_)
            | LedgerError::UnsupportedMethod(_)
            | LedgerError::CurrencyMismatch { .. } => Self::bad_request(message),
            LedgerError::InsufficientBalance { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::ProviderRejected(_) => Self::unprocessable(message),
            LedgerError::InvalidSignature => Self::unauthorized(message),
            LedgerError::WalletNotFound
            | LedgerError::TransactionNotFound
            | LedgerError::EscrowNotFound => Self::not_found(message),
            LedgerError::ProviderUnavailable(_) => Self::service_unavailable(message),
            LedgerError::ConcurrentModification => Self::conflict(message),
            LedgerError::KycRequired | LedgerError::WalletInactive => Self::forbidden(message),
            LedgerError::Storage(_) => Self::internal("internal storage error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unp.message, "oops");
    }

    #[test]
    fn ledger_errors_map_to_status_codes() {
        let cases = vec![
            (LedgerError::InvalidAmount(-1), StatusCode::BAD_REQUEST),
            (
                LedgerError::InsufficientBalance { available: 0, required: 10 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (LedgerError::WalletNotFound, StatusCode::NOT_FOUND),
            (
                LedgerError::ProviderUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (LedgerError::ConcurrentModification, StatusCode::CONFLICT),
            (LedgerError::KycRequired, StatusCode::FORBIDDEN),
            (LedgerError::Storage("io".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
