// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custody API Client
//!
//! Builds custody API request bodies and stamps them. Most requests are not
//! sent from here: the [`SignedRequest`] is handed to the wallet backend,
//! which forwards it. `get_whoami` and `recover_user` go to the custody API
//! directly with the stamp header attached.
//!
//! The stamp covers the exact body string that is sent, so bodies are
//! serialized once and never re-encoded.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::stamper::{SignedRequest, StampError, Stamper};
use crate::webauthn::Attestation;

pub const WHOAMI_PATH: &str = "/public/v1/query/whoami";
pub const SIGN_TRANSACTION_PATH: &str = "/public/v1/submit/sign_transaction";
pub const EXPORT_WALLET_PATH: &str = "/public/v1/submit/export_wallet";
pub const RECOVER_USER_PATH: &str = "/public/v1/submit/recover_user";

pub const ACTIVITY_TYPE_SIGN_TRANSACTION_V2: &str = "ACTIVITY_TYPE_SIGN_TRANSACTION_V2";
pub const ACTIVITY_TYPE_EXPORT_WALLET: &str = "ACTIVITY_TYPE_EXPORT_WALLET";
pub const ACTIVITY_TYPE_RECOVER_USER: &str = "ACTIVITY_TYPE_RECOVER_USER";
pub const TRANSACTION_TYPE_ETHEREUM: &str = "TRANSACTION_TYPE_ETHEREUM";

/// Custody client error.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error(transparent)]
    Stamp(#[from] StampError),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("invalid custody URL: {0}")]
    Url(String),

    #[error("custody request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("custody API returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("custody response was invalid: {0}")]
    InvalidResponse(String),

    #[error("activity {activity_id} ended as {status}")]
    ActivityFailed { activity_id: String, status: String },
}

/// Activity status as reported by the custody API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityStatus {
    Completed,
    Pending,
    Other(String),
}

impl ActivityStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "ACTIVITY_STATUS_COMPLETED" => ActivityStatus::Completed,
            "ACTIVITY_STATUS_PENDING" => ActivityStatus::Pending,
            other => ActivityStatus::Other(other.to_string()),
        }
    }
}

/// Custody who-am-I.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Whoami {
    pub organization_id: String,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// A submitted activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: String,
    pub status: ActivityStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WhoamiBody<'a> {
    organization_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityBody<'a, P> {
    #[serde(rename = "type")]
    kind: &'static str,
    organization_id: &'a str,
    timestamp_ms: String,
    parameters: P,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignTransactionParameters<'a> {
    sign_with: &'a str,
    unsigned_transaction: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportWalletParameters<'a> {
    wallet_id: &'a str,
    target_public_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoverUserParameters<'a> {
    user_id: &'a str,
    authenticator: NewAuthenticator<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAuthenticator<'a> {
    authenticator_name: &'a str,
    challenge: &'a str,
    attestation: &'a Attestation,
}

#[derive(Debug, Deserialize)]
struct ActivityResponse {
    activity: ActivityRecord,
}

#[derive(Debug, Deserialize)]
struct ActivityRecord {
    id: String,
    status: String,
}

/// Parameters of a recovery activity.
#[derive(Debug, Clone, Copy)]
pub struct RecoverUser<'a> {
    pub organization_id: &'a str,
    pub user_id: &'a str,
    pub authenticator_name: &'a str,
    /// base64url creation challenge.
    pub challenge: &'a str,
    pub attestation: &'a Attestation,
}

#[derive(Debug, Clone)]
pub struct CustodyClient {
    base_url: Url,
    http: Client,
}

impl CustodyClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, CustodyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CustodyError::Client(e.to_string()))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn stamp_get_whoami(
        &self,
        stamper: &Stamper,
        organization_id: &str,
    ) -> Result<SignedRequest, CustodyError> {
        self.stamp_request(stamper, WHOAMI_PATH, &WhoamiBody { organization_id })
            .await
    }

    /// Query who-am-I directly against the custody API.
    pub async fn get_whoami(
        &self,
        stamper: &Stamper,
        organization_id: &str,
    ) -> Result<Whoami, CustodyError> {
        let signed = self.stamp_get_whoami(stamper, organization_id).await?;
        let body = self.submit(&signed).await?;
        serde_json::from_str(&body).map_err(|e| CustodyError::InvalidResponse(e.to_string()))
    }

    pub async fn stamp_sign_transaction(
        &self,
        stamper: &Stamper,
        organization_id: &str,
        sign_with: &str,
        unsigned_transaction: &str,
    ) -> Result<SignedRequest, CustodyError> {
        let body = ActivityBody {
            kind: ACTIVITY_TYPE_SIGN_TRANSACTION_V2,
            organization_id,
            timestamp_ms: timestamp_ms(),
            parameters: SignTransactionParameters {
                sign_with,
                unsigned_transaction,
                kind: TRANSACTION_TYPE_ETHEREUM,
            },
        };
        self.stamp_request(stamper, SIGN_TRANSACTION_PATH, &body).await
    }

    pub async fn stamp_export_wallet(
        &self,
        stamper: &Stamper,
        organization_id: &str,
        wallet_id: &str,
        target_public_key: &str,
    ) -> Result<SignedRequest, CustodyError> {
        let body = ActivityBody {
            kind: ACTIVITY_TYPE_EXPORT_WALLET,
            organization_id,
            timestamp_ms: timestamp_ms(),
            parameters: ExportWalletParameters {
                wallet_id,
                target_public_key,
            },
        };
        self.stamp_request(stamper, EXPORT_WALLET_PATH, &body).await
    }

    /// Submit `ACTIVITY_TYPE_RECOVER_USER`, stamped with the recovery
    /// credential.
    ///
    /// Only the immediate response is inspected. A completed activity
    /// deletes the recovery credential, so it cannot be used to poll.
    pub async fn recover_user(
        &self,
        stamper: &Stamper,
        params: RecoverUser<'_>,
    ) -> Result<Activity, CustodyError> {
        let body = ActivityBody {
            kind: ACTIVITY_TYPE_RECOVER_USER,
            organization_id: params.organization_id,
            timestamp_ms: timestamp_ms(),
            parameters: RecoverUserParameters {
                user_id: params.user_id,
                authenticator: NewAuthenticator {
                    authenticator_name: params.authenticator_name,
                    challenge: params.challenge,
                    attestation: params.attestation,
                },
            },
        };
        let signed = self.stamp_request(stamper, RECOVER_USER_PATH, &body).await?;
        let response = self.submit(&signed).await?;

        let record = serde_json::from_str::<ActivityResponse>(&response)
            .map_err(|e| CustodyError::InvalidResponse(e.to_string()))?
            .activity;
        let activity = Activity {
            status: ActivityStatus::parse(&record.status),
            id: record.id,
        };

        match &activity.status {
            ActivityStatus::Completed | ActivityStatus::Pending => {
                info!(activity_id = %activity.id, status = ?activity.status, "Recovery submitted");
                Ok(activity)
            }
            ActivityStatus::Other(status) => Err(CustodyError::ActivityFailed {
                activity_id: activity.id.clone(),
                status: status.clone(),
            }),
        }
    }

    async fn stamp_request<B: Serialize>(
        &self,
        stamper: &Stamper,
        path: &str,
        body: &B,
    ) -> Result<SignedRequest, CustodyError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CustodyError::Url(e.to_string()))?;
        let body = serde_json::to_string(body)
            .map_err(|e| CustodyError::InvalidResponse(format!("serialize body failed: {e}")))?;
        let stamp = stamper.stamp(&body).await?;
        debug!(%path, stamper = ?stamper.kind(), "Request stamped");

        Ok(SignedRequest {
            url: url.to_string(),
            body,
            stamp,
        })
    }

    async fn submit(&self, signed: &SignedRequest) -> Result<String, CustodyError> {
        let response = self
            .http
            .post(&signed.url)
            .header(
                signed.stamp.stamp_header_name.as_str(),
                signed.stamp.stamp_header_value.as_str(),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.body.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            warn!(url = %signed.url, status = status.as_u16(), "Custody request rejected");
            return Err(CustodyError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn timestamp_ms() -> String {
    Utc::now().timestamp_millis().to_string()
}
