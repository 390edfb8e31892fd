// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Software passkey for development and tests.
//!
//! Generates P-256 resident credentials, returns `none`-format attestations
//! and signs assertions the way a platform authenticator would. Private keys
//! live in process memory and, when a storage backend is attached, in plain
//! local storage. Never use this against a production relying party.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ciborium::value::Value as CborValue;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    base64url_decode, base64url_encode, Assertion, Attestation, Authenticator,
    CredentialCreationOptions, CredentialRequestOptions, WebAuthnError, ES256,
    PUBLIC_KEY_CREDENTIAL_TYPE,
};
use crate::storage::LocalStorage;

/// Storage key for persisted software credentials.
pub const SOFTWARE_PASSKEYS_KEY: &str = "SOFTWARE_PASSKEYS";

// Authenticator data flags.
const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_ATTESTED_DATA: u8 = 0x40;

const CREDENTIAL_ID_LEN: usize = 16;

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredCredential {
    rp_id: String,
    credential_id: String,
    user_handle: String,
    user_name: String,
    secret_key_hex: String,
    sign_count: u32,
}

impl StoredCredential {
    fn signing_key(&self) -> Result<SigningKey, WebAuthnError> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(&self.secret_key_hex)
                .map_err(|e| WebAuthnError::Failed(format!("corrupt stored key: {e}")))?,
        );
        SigningKey::from_slice(&bytes)
            .map_err(|e| WebAuthnError::Failed(format!("corrupt stored key: {e}")))
    }
}

/// In-process WebAuthn authenticator.
pub struct SoftwareAuthenticator {
    origin: String,
    credentials: Mutex<Vec<StoredCredential>>,
    storage: Option<Arc<dyn LocalStorage>>,
    user_present: AtomicBool,
}

impl SoftwareAuthenticator {
    /// Authenticator with no persistence. `origin` ends up in client data.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            credentials: Mutex::new(Vec::new()),
            storage: None,
            user_present: AtomicBool::new(true),
        }
    }

    /// Authenticator whose credentials are loaded from and saved to
    /// `storage`.
    pub fn with_storage(origin: impl Into<String>, storage: Arc<dyn LocalStorage>) -> Self {
        let credentials = match storage.get_item(SOFTWARE_PASSKEYS_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring unreadable software passkeys");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to load software passkeys");
                Vec::new()
            }
        };

        Self {
            origin: origin.into(),
            credentials: Mutex::new(credentials),
            storage: Some(storage),
            user_present: AtomicBool::new(true),
        }
    }

    /// Simulate the user dismissing (`false`) or accepting prompts.
    pub fn set_user_present(&self, present: bool) {
        self.user_present.store(present, Ordering::SeqCst);
    }

    /// Number of stored credentials.
    pub fn credential_count(&self) -> usize {
        self.credentials.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Public key of a stored credential.
    pub fn verifying_key(&self, credential_id: &str) -> Option<VerifyingKey> {
        let credentials = self.credentials.lock().ok()?;
        let credential = credentials
            .iter()
            .find(|c| c.credential_id == credential_id)?;
        credential
            .signing_key()
            .ok()
            .map(|k| k.verifying_key().to_owned())
    }

    fn require_presence(&self) -> Result<(), WebAuthnError> {
        if self.user_present.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(WebAuthnError::Cancelled)
        }
    }

    fn client_data(&self, kind: &str, challenge: &[u8]) -> String {
        json!({
            "type": kind,
            "challenge": base64url_encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
    }

    fn persist(&self, credentials: &[StoredCredential]) {
        let Some(storage) = &self.storage else {
            return;
        };
        let result = serde_json::to_string(credentials)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                storage
                    .set_item(SOFTWARE_PASSKEYS_KEY, &raw)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!(error = %e, "failed to persist software passkeys");
        }
    }
}

#[async_trait]
impl Authenticator for SoftwareAuthenticator {
    async fn create_credential(
        &self,
        options: &CredentialCreationOptions,
    ) -> Result<Attestation, WebAuthnError> {
        self.require_presence()?;

        let supported = options
            .pub_key_cred_params
            .iter()
            .any(|p| p.kind == PUBLIC_KEY_CREDENTIAL_TYPE && p.alg == ES256);
        if !supported {
            return Err(WebAuthnError::Unsupported(
                "software authenticator only supports ES256".to_string(),
            ));
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let id_seed = super::random_buffer()?;
        let credential_id = &id_seed[..CREDENTIAL_ID_LEN];

        let cose_key = cose_public_key(signing_key.verifying_key())?;
        let mut auth_data = authenticator_data(
            &options.rp.id,
            FLAG_USER_PRESENT | FLAG_USER_VERIFIED | FLAG_ATTESTED_DATA,
            0,
        );
        auth_data.extend_from_slice(&[0u8; 16]); // aaguid
        auth_data.extend_from_slice(&(CREDENTIAL_ID_LEN as u16).to_be_bytes());
        auth_data.extend_from_slice(credential_id);
        auth_data.extend_from_slice(&cose_key);

        let attestation_object = cbor_bytes(&CborValue::Map(vec![
            (CborValue::Text("fmt".into()), CborValue::Text("none".into())),
            (CborValue::Text("attStmt".into()), CborValue::Map(Vec::new())),
            (CborValue::Text("authData".into()), CborValue::Bytes(auth_data)),
        ]))?;

        let client_data_json = self.client_data("webauthn.create", &options.challenge);
        let stored = StoredCredential {
            rp_id: options.rp.id.clone(),
            credential_id: base64url_encode(credential_id),
            user_handle: base64url_encode(&options.user.id),
            user_name: options.user.name.clone(),
            secret_key_hex: hex::encode(signing_key.to_bytes()),
            sign_count: 0,
        };
        let attestation = Attestation {
            credential_id: stored.credential_id.clone(),
            client_data_json: base64url_encode(client_data_json.as_bytes()),
            attestation_object: base64url_encode(&attestation_object),
            transports: vec!["AUTHENTICATOR_TRANSPORT_INTERNAL".to_string()],
        };

        {
            let mut credentials = self
                .credentials
                .lock()
                .map_err(|_| WebAuthnError::Failed("credential store poisoned".to_string()))?;
            credentials.push(stored);
            self.persist(&credentials);
        }

        info!(
            rp_id = %options.rp.id,
            credential_id = %attestation.credential_id,
            "Software passkey created"
        );
        Ok(attestation)
    }

    async fn get_assertion(
        &self,
        options: &CredentialRequestOptions,
    ) -> Result<Assertion, WebAuthnError> {
        self.require_presence()?;

        let mut credentials = self
            .credentials
            .lock()
            .map_err(|_| WebAuthnError::Failed("credential store poisoned".to_string()))?;

        let credential = credentials
            .iter_mut()
            .rev()
            .find(|c| {
                c.rp_id == options.rp_id
                    && (options.allow_credentials.is_empty()
                        || options.allow_credentials.contains(&c.credential_id))
            })
            .ok_or_else(|| WebAuthnError::NoCredential {
                rp_id: options.rp_id.clone(),
            })?;

        credential.sign_count = credential.sign_count.wrapping_add(1);
        let auth_data = authenticator_data(
            &options.rp_id,
            FLAG_USER_PRESENT | FLAG_USER_VERIFIED,
            credential.sign_count,
        );
        let client_data_json = self.client_data("webauthn.get", &options.challenge);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(client_data_json.as_bytes()));
        let signature: Signature = credential.signing_key()?.sign(&signed);

        let assertion = Assertion {
            credential_id: credential.credential_id.clone(),
            client_data_json: base64url_encode(client_data_json.as_bytes()),
            authenticator_data: base64url_encode(&auth_data),
            signature: base64url_encode(signature.to_der().as_bytes()),
            user_handle: Some(credential.user_handle.clone()),
        };
        debug!(
            credential_id = %assertion.credential_id,
            sign_count = credential.sign_count,
            "Software passkey assertion"
        );

        self.persist(&credentials);
        Ok(assertion)
    }
}

/// Check an assertion signature against a credential public key.
pub fn verify_assertion(key: &VerifyingKey, assertion: &Assertion) -> Result<(), WebAuthnError> {
    let decode = |field: &str, value: &str| {
        base64url_decode(value).map_err(|e| WebAuthnError::Failed(format!("bad {field}: {e}")))
    };
    let mut signed = decode("authenticatorData", &assertion.authenticator_data)?;
    let client_data = decode("clientDataJson", &assertion.client_data_json)?;
    signed.extend_from_slice(&Sha256::digest(&client_data));

    let signature = Signature::from_der(&decode("signature", &assertion.signature)?)
        .map_err(|e| WebAuthnError::Failed(format!("bad signature encoding: {e}")))?;
    key.verify(&signed, &signature)
        .map_err(|_| WebAuthnError::Failed("assertion signature mismatch".to_string()))
}

fn authenticator_data(rp_id: &str, flags: u8, sign_count: u32) -> Vec<u8> {
    let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
    data.push(flags);
    data.extend_from_slice(&sign_count.to_be_bytes());
    data
}

/// COSE_Key map for an EC2 P-256 ES256 public key.
fn cose_public_key(key: &VerifyingKey) -> Result<Vec<u8>, WebAuthnError> {
    let point = key.to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        return Err(WebAuthnError::Failed("identity public key".to_string()));
    };

    cbor_bytes(&CborValue::Map(vec![
        (CborValue::Integer(1.into()), CborValue::Integer(2.into())),
        (CborValue::Integer(3.into()), CborValue::Integer(ES256.into())),
        (CborValue::Integer((-1).into()), CborValue::Integer(1.into())),
        (CborValue::Integer((-2).into()), CborValue::Bytes(x.to_vec())),
        (CborValue::Integer((-3).into()), CborValue::Bytes(y.to_vec())),
    ]))
}

fn cbor_bytes(value: &CborValue) -> Result<Vec<u8>, WebAuthnError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| WebAuthnError::Failed(format!("CBOR encoding failed: {e}")))?;
    Ok(out)
}
