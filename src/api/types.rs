// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response bodies of the wallet backend.

use serde::{Deserialize, Deserializer, Serialize};

use crate::stamper::SignedRequest;
use crate::webauthn::Attestation;

/// Outcome of `GET /api/registration/{email}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    Registered { sub_organization_id: String },
    Unregistered,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegistrationStatusBody {
    pub sub_organization_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub email: String,
    pub attestation: Attestation,
    /// base64url of the creation challenge.
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRequest {
    pub signed_whoami_request: SignedRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_organization_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedWhoamiBody<'a> {
    pub signed_whoami_request: &'a SignedRequest,
}

/// Current session user (`GET /api/whoami`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "userId", deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub sub_organization_id: Option<String>,
}

/// Custody who-am-I as relayed by `POST /api/turnkey-whoami`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyIdentity {
    pub sub_organization_id: String,
    #[serde(default)]
    pub sub_organization_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// `GET /api/wallet`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: String,
    /// Formatted with two decimals, e.g. `"0.05"`.
    pub balance: String,
    #[serde(default)]
    pub drops_left: Option<u32>,
    pub turnkey_uuid: String,
}

/// One entry of `GET /api/wallet/history`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transfer {
    #[serde(rename = "type")]
    pub kind: String,
    pub block: u64,
    pub source: String,
    pub destination: String,
    pub amount: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConstructTxBody<'a> {
    pub amount: &'a str,
    pub destination: &'a str,
}

/// `POST /api/wallet/construct-tx`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructedTransaction {
    pub unsigned_transaction: String,
    pub organization_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendTxBody<'a> {
    pub signed_send_tx: &'a SignedRequest,
    pub destination: &'a str,
}

/// Hash of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionHash {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetKeyBody<'a> {
    pub email: &'a str,
    pub target_public_key: &'a str,
}

/// `POST /api/email-auth`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAuthInit {
    pub user_id: String,
    pub api_key_id: String,
    pub organization_id: String,
}

/// `POST /api/init-recovery`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryInit {
    pub user_id: String,
    pub organization_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExportBody<'a> {
    pub signed_export_request: &'a SignedRequest,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Id>::deserialize(deserializer)?.map(|id| match id {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    }))
}
