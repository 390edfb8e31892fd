// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Backend Client
//!
//! REST client for the wallet backend. Requests carry the session cookie the
//! backend sets on register/authenticate, so one [`BackendClient`] is one
//! browser-like session.
//!
//! ## Endpoints
//!
//! | Method | Path | Success |
//! |--------|------|---------|
//! | GET | `/api/registration/{email}` | 200 `{subOrganizationId}` or 204 |
//! | POST | `/api/register` | 200 |
//! | POST | `/api/authenticate` | 200 |
//! | GET | `/api/whoami` | 200 `{email, id}` or 204 |
//! | POST | `/api/turnkey-whoami` | 200 |
//! | POST | `/api/logout` | 204 |
//! | GET | `/api/wallet` | 200 |
//! | GET | `/api/wallet/history` | 200 |
//! | POST | `/api/wallet/construct-tx` | 200 |
//! | POST | `/api/wallet/send-tx` | 200 |
//! | POST | `/api/wallet/drop` | 200 |
//! | POST | `/api/email-auth` | 200, 403 when the email is unknown |
//! | POST | `/api/init-recovery` | 200, 403 when the email is unknown |
//! | POST | `/api/wallet/export` | 200 |
//!
//! Any other status is an [`ApiError::UnexpectedStatus`]. Nothing is retried.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::stamper::SignedRequest;
use crate::storage::{LocalStorage, StorageError};

pub use types::{
    AuthenticationRequest, ConstructedTransaction, CustodyIdentity, EmailAuthInit,
    RecoveryInit, RegistrationRequest, RegistrationStatus, SessionUser, TransactionHash,
    Transfer, WalletInfo,
};
use types::{
    ConstructTxBody, ExportBody, RegistrationStatusBody, SendTxBody, SignedWhoamiBody,
    TargetKeyBody,
};

/// Storage key for the persisted session cookie header.
pub const SESSION_COOKIE_KEY: &str = "SESSION_COOKIE";

/// Backend client error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("invalid backend URL: {0}")]
    Url(String),

    #[error("{method} {path} failed: {source}")]
    Request {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("no user found for email")]
    UserNotFound,

    #[error("invalid response from {path}: {reason}")]
    InvalidResponse { path: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Wallet backend client with its own cookie jar.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: Url,
    http: Client,
    cookies: Arc<Jar>,
}

impl BackendClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let cookies = Arc::new(Jar::default());
        let http = Client::builder()
            .timeout(timeout)
            .cookie_provider(cookies.clone())
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self {
            base_url,
            http,
            cookies,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // -------------------------------------------------------------------------
    // Session cookie persistence
    // -------------------------------------------------------------------------

    /// `Cookie` header value the backend would currently receive, if any.
    pub fn session_cookies(&self) -> Option<String> {
        self.cookies
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    /// Re-seed the jar from a previously exported `Cookie` header value.
    pub fn restore_session_cookies(&self, header: &str) {
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.cookies.add_cookie_str(pair, &self.base_url);
        }
    }

    /// Persist the session cookies, or drop the stored ones if there are none.
    pub fn save_session(&self, storage: &dyn LocalStorage) -> Result<(), ApiError> {
        match self.session_cookies() {
            Some(header) => storage.set_item(SESSION_COOKIE_KEY, &header)?,
            None => storage.remove_item(SESSION_COOKIE_KEY)?,
        }
        Ok(())
    }

    /// Load session cookies saved by [`save_session`](Self::save_session).
    pub fn load_session(&self, storage: &dyn LocalStorage) -> Result<bool, ApiError> {
        match storage.get_item(SESSION_COOKIE_KEY)? {
            Some(header) => {
                self.restore_session_cookies(&header);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    pub async fn registration_status(&self, email: &str) -> Result<RegistrationStatus, ApiError> {
        let url = self.endpoint(&["api", "registration", email])?;
        let response = self.send(Method::GET, self.http.get(url)).await?;

        match response.status() {
            StatusCode::OK => {
                let body: RegistrationStatusBody = read_json(response).await?;
                Ok(RegistrationStatus::Registered {
                    sub_organization_id: body.sub_organization_id,
                })
            }
            StatusCode::NO_CONTENT => Ok(RegistrationStatus::Unregistered),
            _ => Err(unexpected(response).await),
        }
    }

    pub async fn register(&self, request: &RegistrationRequest) -> Result<(), ApiError> {
        let response = self
            .post_json(&["api", "register"], request)
            .await?;
        expect_status(response, StatusCode::OK).await?;
        info!(email = %request.email, "Registered");
        Ok(())
    }

    pub async fn authenticate(&self, request: &AuthenticationRequest) -> Result<(), ApiError> {
        let response = self
            .post_json(&["api", "authenticate"], request)
            .await?;
        expect_status(response, StatusCode::OK).await?;
        info!("Authenticated");
        Ok(())
    }

    /// Session check. `None` means no current user.
    pub async fn whoami(&self) -> Result<Option<SessionUser>, ApiError> {
        let url = self.endpoint(&["api", "whoami"])?;
        let response = self.send(Method::GET, self.http.get(url)).await?;

        match response.status() {
            StatusCode::OK => Ok(Some(read_json(response).await?)),
            StatusCode::NO_CONTENT => Ok(None),
            _ => Err(unexpected(response).await),
        }
    }

    /// Relay a stamped who-am-I to the custody API. Fails when the stamping
    /// credential is no longer valid.
    pub async fn custody_whoami(&self, signed: &SignedRequest) -> Result<CustodyIdentity, ApiError> {
        let response = self
            .post_json(
                &["api", "turnkey-whoami"],
                &SignedWhoamiBody {
                    signed_whoami_request: signed,
                },
            )
            .await?;
        read_json(expect_status(response, StatusCode::OK).await?).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "logout"])?;
        let response = self
            .send(Method::POST, self.http.post(url).json(&serde_json::json!({})))
            .await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        info!("Logged out");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Wallet
    // -------------------------------------------------------------------------

    pub async fn wallet(&self) -> Result<WalletInfo, ApiError> {
        self.get_json(&["api", "wallet"]).await
    }

    pub async fn history(&self) -> Result<Vec<Transfer>, ApiError> {
        self.get_json(&["api", "wallet", "history"]).await
    }

    pub async fn construct_tx(
        &self,
        amount: &str,
        destination: &str,
    ) -> Result<ConstructedTransaction, ApiError> {
        let response = self
            .post_json(
                &["api", "wallet", "construct-tx"],
                &ConstructTxBody {
                    amount,
                    destination,
                },
            )
            .await?;
        read_json(expect_status(response, StatusCode::OK).await?).await
    }

    pub async fn send_tx(
        &self,
        signed: &SignedRequest,
        destination: &str,
    ) -> Result<TransactionHash, ApiError> {
        let response = self
            .post_json(
                &["api", "wallet", "send-tx"],
                &SendTxBody {
                    signed_send_tx: signed,
                    destination,
                },
            )
            .await?;
        let hash: TransactionHash = read_json(expect_status(response, StatusCode::OK).await?).await?;
        info!(hash = %hash.hash, "Transaction sent");
        Ok(hash)
    }

    /// Ask the faucet for a drop.
    pub async fn request_drop(&self) -> Result<TransactionHash, ApiError> {
        let response = self
            .post_json(&["api", "wallet", "drop"], &serde_json::json!({}))
            .await?;
        let hash: TransactionHash = read_json(expect_status(response, StatusCode::OK).await?).await?;
        info!(hash = %hash.hash, "Drop sent");
        Ok(hash)
    }

    /// Forward a stamped export activity; returns the export bundle.
    pub async fn export_wallet(&self, signed: &SignedRequest) -> Result<String, ApiError> {
        let response = self
            .post_json(
                &["api", "wallet", "export"],
                &ExportBody {
                    signed_export_request: signed,
                },
            )
            .await?;
        let response = expect_status(response, StatusCode::OK).await?;
        let text = response.text().await.map_err(|e| ApiError::InvalidResponse {
            path: "/api/wallet/export".to_string(),
            reason: e.to_string(),
        })?;

        // The backend answers with a JSON string; accept a bare bundle too.
        Ok(serde_json::from_str::<String>(&text).unwrap_or_else(|_| text.trim().to_string()))
    }

    // -------------------------------------------------------------------------
    // Bundle issuance
    // -------------------------------------------------------------------------

    /// Have a credential bundle for `target_public_key` emailed to `email`.
    pub async fn email_auth(
        &self,
        email: &str,
        target_public_key: &str,
    ) -> Result<EmailAuthInit, ApiError> {
        let response = self
            .post_json(
                &["api", "email-auth"],
                &TargetKeyBody {
                    email,
                    target_public_key,
                },
            )
            .await?;
        read_json(expect_known_user(response).await?).await
    }

    /// Have a recovery bundle for `target_public_key` emailed to `email`.
    pub async fn init_recovery(
        &self,
        email: &str,
        target_public_key: &str,
    ) -> Result<RecoveryInit, ApiError> {
        let response = self
            .post_json(
                &["api", "init-recovery"],
                &TargetKeyBody {
                    email,
                    target_public_key,
                },
            )
            .await?;
        read_json(expect_known_user(response).await?).await
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let response = self.send(Method::GET, self.http.get(url)).await?;
        read_json(expect_status(response, StatusCode::OK).await?).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(segments)?;
        self.send(Method::POST, self.http.post(url).json(body)).await
    }

    async fn send(&self, method: Method, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Request {
            method: method.clone(),
            path: source
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_default(),
            source,
        })?;
        debug!(
            %method,
            path = %response.url().path(),
            status = response.status().as_u16(),
            "Backend response"
        );
        Ok(response)
    }
}

async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, ApiError> {
    if response.status() == expected {
        Ok(response)
    } else {
        Err(unexpected(response).await)
    }
}

async fn expect_known_user(response: Response) -> Result<Response, ApiError> {
    match response.status() {
        StatusCode::OK => Ok(response),
        StatusCode::FORBIDDEN => Err(ApiError::UserNotFound),
        _ => Err(unexpected(response).await),
    }
}

async fn unexpected(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!(%path, status, "Unexpected backend status");
    ApiError::UnexpectedStatus { status, body }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let path = response.url().path().to_string();
    response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse {
            path,
            reason: e.to_string(),
        })
}
