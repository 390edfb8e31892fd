// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, default values and the [`ClientConfig`]
//! loaded from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `BACKEND_API_BASE_URL` | Wallet backend base URL | `http://localhost:8080` |
//! | `TURNKEY_API_BASE_URL` | Custody API base URL | `https://api.turnkey.com` |
//! | `PASSKEY_WALLET_RPID` | WebAuthn relying-party id | `localhost` |
//! | `AUTH_FRAME_ORIGIN` | Trusted origin of the email-auth signer | `https://auth.turnkey.com` |
//! | `RECOVERY_FRAME_ORIGIN` | Trusted origin of the recovery signer | `https://recovery.turnkey.com` |
//! | `EXPORT_FRAME_ORIGIN` | Trusted origin of the export signer | `https://export.turnkey.com` |
//! | `DATA_DIR` | Directory for local storage (bundles, session) | `.passkey-wallet` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::{env, path::PathBuf, time::Duration};

use url::Url;

/// Environment variable for the wallet backend base URL.
pub const BACKEND_API_BASE_URL_ENV: &str = "BACKEND_API_BASE_URL";

/// Environment variable for the custody (signing) API base URL.
pub const TURNKEY_API_BASE_URL_ENV: &str = "TURNKEY_API_BASE_URL";

/// Environment variable for the WebAuthn relying-party id.
pub const PASSKEY_WALLET_RPID_ENV: &str = "PASSKEY_WALLET_RPID";

/// Environment variable for the email-auth signer origin.
pub const AUTH_FRAME_ORIGIN_ENV: &str = "AUTH_FRAME_ORIGIN";

/// Environment variable for the recovery signer origin.
pub const RECOVERY_FRAME_ORIGIN_ENV: &str = "RECOVERY_FRAME_ORIGIN";

/// Environment variable for the wallet-export signer origin.
pub const EXPORT_FRAME_ORIGIN_ENV: &str = "EXPORT_FRAME_ORIGIN";

/// Environment variable for the local storage directory.
///
/// Holds the credential bundle, the persisted session cookie and (when the
/// software passkey is used) the development credentials.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_BACKEND_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TURNKEY_API_BASE_URL: &str = "https://api.turnkey.com";
pub const DEFAULT_RPID: &str = "localhost";
pub const DEFAULT_AUTH_FRAME_ORIGIN: &str = "https://auth.turnkey.com";
pub const DEFAULT_RECOVERY_FRAME_ORIGIN: &str = "https://recovery.turnkey.com";
pub const DEFAULT_EXPORT_FRAME_ORIGIN: &str = "https://export.turnkey.com";
pub const DEFAULT_DATA_DIR: &str = ".passkey-wallet";

/// Subdirectory of the data directory holding frame embedded keys. Host
/// storage is never opened on it.
pub const FRAME_KEY_DIR: &str = "frames";

/// Storage key under which the email-auth credential bundle is kept.
pub const BUNDLE_STORAGE_KEY: &str = "AUTH_BUNDLE";

/// Lifetime of the embedded key a credential bundle is encrypted to.
pub const EMBEDDED_KEY_TTL: Duration = Duration::from_secs(60 * 60);

/// Wallet info refresh interval.
pub const WALLET_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Wallet history refresh interval.
pub const HISTORY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// HTTP timeout applied to backend and custody requests.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a signer has to complete its handshake.
pub const FRAME_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
}

/// Client configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_base_url: Url,
    pub custody_base_url: Url,
    pub rp_id: String,
    pub auth_frame_origin: Url,
    pub recovery_frame_origin: Url,
    pub export_frame_origin: Url,
    pub data_dir: PathBuf,
    pub bundle_ttl: Duration,
    pub http_timeout: Duration,
    pub frame_init_timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend_base_url: env_url(BACKEND_API_BASE_URL_ENV, DEFAULT_BACKEND_API_BASE_URL)?,
            custody_base_url: env_url(TURNKEY_API_BASE_URL_ENV, DEFAULT_TURNKEY_API_BASE_URL)?,
            rp_id: env_or_default(PASSKEY_WALLET_RPID_ENV, DEFAULT_RPID),
            auth_frame_origin: env_url(AUTH_FRAME_ORIGIN_ENV, DEFAULT_AUTH_FRAME_ORIGIN)?,
            recovery_frame_origin: env_url(RECOVERY_FRAME_ORIGIN_ENV, DEFAULT_RECOVERY_FRAME_ORIGIN)?,
            export_frame_origin: env_url(EXPORT_FRAME_ORIGIN_ENV, DEFAULT_EXPORT_FRAME_ORIGIN)?,
            data_dir: PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            bundle_ttl: EMBEDDED_KEY_TTL,
            http_timeout: HTTP_TIMEOUT,
            frame_init_timeout: FRAME_INIT_TIMEOUT,
        })
    }

    /// Configuration pointing both APIs at the given base URL.
    ///
    /// Used by tests that run a single local backend.
    pub fn for_base_url(base: Url) -> Self {
        Self {
            backend_base_url: base.clone(),
            custody_base_url: base,
            rp_id: DEFAULT_RPID.to_string(),
            auth_frame_origin: fixed_url(DEFAULT_AUTH_FRAME_ORIGIN),
            recovery_frame_origin: fixed_url(DEFAULT_RECOVERY_FRAME_ORIGIN),
            export_frame_origin: fixed_url(DEFAULT_EXPORT_FRAME_ORIGIN),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bundle_ttl: EMBEDDED_KEY_TTL,
            http_timeout: HTTP_TIMEOUT,
            frame_init_timeout: FRAME_INIT_TIMEOUT,
        }
    }
}

fn env_or_default(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_url(var: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = env_or_default(var, default);
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: e.to_string(),
    })
}

// Only called with the compile-time defaults above.
fn fixed_url(raw: &str) -> Url {
    Url::parse(raw).expect("default origin is a valid URL")
}
