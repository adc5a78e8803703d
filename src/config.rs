// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTH_SECRET` | HS256 secret for API token verification | Required |
//! | `WEBHOOK_SECRET` | Shared secret for webhook HMAC verification | Required |
//! | `WALLET_LOCK_TIMEOUT_MS` | Max wait on a busy wallet before 409 | `5000` |
//! | `FLW_SECRET_KEY` | Flutterwave API secret; mock provider if absent | Optional |
//! | `FLW_API_BASE_URL` | Flutterwave API base URL | production URL |
//! | `KYC_API_BASE_URL` | Verification service base URL; allow-all if absent | Optional |
//! | `KYC_API_KEY` | Verification service API key | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const AUTH_SECRET_ENV: &str = "AUTH_SECRET";
pub const WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";
pub const WALLET_LOCK_TIMEOUT_MS_ENV: &str = "WALLET_LOCK_TIMEOUT_MS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WALLET_LOCK_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub auth_secret: String,
    pub webhook_secret: String,
    pub wallet_lock_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = env_or(DATA_DIR_ENV, DEFAULT_DATA_DIR).into();
        let host = env_or(HOST_ENV, DEFAULT_HOST);
        let port = match std::env::var(PORT_ENV) {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
                ConfigError::Invalid {
                    name: PORT_ENV,
                    value: raw,
                }
            })?,
            _ => DEFAULT_PORT,
        };

        let auth_secret = env_required(AUTH_SECRET_ENV)?;
        let webhook_secret = env_required(WEBHOOK_SECRET_ENV)?;

        let wallet_lock_timeout = match std::env::var(WALLET_LOCK_TIMEOUT_MS_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: WALLET_LOCK_TIMEOUT_MS_ENV,
                    value: raw,
                })?;
                Duration::from_millis(ms)
            }
            _ => Duration::from_millis(DEFAULT_WALLET_LOCK_TIMEOUT_MS),
        };

        Ok(Self {
            data_dir,
            host,
            port,
            auth_secret,
            webhook_secret,
            wallet_lock_timeout,
        })
    }

    /// Path of the redb database file under the data directory.
    pub fn ledger_db_path(&self) -> PathBuf {
        self.data_dir.join("ledger.redb")
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}
