// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # WebAuthn Module
//!
//! Registration (attestation) and assertion request construction, plus the
//! [`Authenticator`] seam behind which the platform WebAuthn API lives.
//!
//! ## Ceremonies
//!
//! 1. Signup: [`challenge::creation_options`] builds ES256-only creation
//!    options with a fresh 32-byte challenge and user handle; the
//!    authenticator returns an [`Attestation`] which is posted to the backend
//!    together with the base64url challenge.
//! 2. Login / signing: [`challenge::request_options`] wraps a payload-derived
//!    challenge; the authenticator returns an [`Assertion`].
//!
//! Authenticator failures (cancellation, unsupported authenticator, timeout)
//! are surfaced as-is. Nothing here retries.

pub mod challenge;
pub mod software;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use challenge::{
    base64url_decode, base64url_encode, creation_options, payload_challenge, random_buffer,
    request_options, CreationCeremony, ES256, PUBLIC_KEY_CREDENTIAL_TYPE,
};
pub use software::SoftwareAuthenticator;

/// WebAuthn ceremony error.
#[derive(Debug, thiserror::Error)]
pub enum WebAuthnError {
    #[error("WebAuthn ceremony was cancelled by the user")]
    Cancelled,

    #[error("authenticator not supported: {0}")]
    Unsupported(String),

    #[error("WebAuthn ceremony timed out")]
    Timeout,

    #[error("no credential registered for relying party {rp_id}")]
    NoCredential { rp_id: String },

    #[error("secure randomness unavailable")]
    RandomnessUnavailable,

    #[error("WebAuthn ceremony failed: {0}")]
    Failed(String),
}

/// Relying party entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

/// User entity of a creation ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    #[serde(with = "b64url_bytes")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

/// Allowed credential type and algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub alg: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub require_resident_key: bool,
    pub resident_key: String,
    pub user_verification: String,
}

/// `PublicKeyCredentialCreationOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    pub rp: RelyingParty,
    #[serde(with = "b64url_bytes")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub user: UserEntity,
    pub authenticator_selection: AuthenticatorSelection,
}

/// `PublicKeyCredentialRequestOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestOptions {
    pub rp_id: String,
    #[serde(with = "b64url_bytes")]
    pub challenge: Vec<u8>,
    /// Base64url credential ids; empty means any resident credential.
    pub allow_credentials: Vec<String>,
    pub user_verification: String,
}

/// Output of a create-credential ceremony, base64url fields as sent to the
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub credential_id: String,
    pub client_data_json: String,
    pub attestation_object: String,
    pub transports: Vec<String>,
}

/// Output of a get-credential ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub credential_id: String,
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// The platform WebAuthn API.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn create_credential(
        &self,
        options: &CredentialCreationOptions,
    ) -> Result<Attestation, WebAuthnError>;

    async fn get_assertion(
        &self,
        options: &CredentialRequestOptions,
    ) -> Result<Assertion, WebAuthnError>;
}

mod b64url_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::base64url_encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::base64url_decode(&s).map_err(D::Error::custom)
    }
}
