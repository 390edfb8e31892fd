// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API-key stamps (`X-Stamp`).
//!
//! The header value is base64url (unpadded) of
//! `{"publicKey": <compressed SEC1 hex>, "scheme": "SIGNATURE_SCHEME_TK_API_P256",
//! "signature": <DER ECDSA-SHA256 hex>}`.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::{Stamp, StampError};
use crate::webauthn::{base64url_decode, base64url_encode};

pub const API_KEY_STAMP_HEADER: &str = "X-Stamp";
pub const SIGNATURE_SCHEME_P256: &str = "SIGNATURE_SCHEME_TK_API_P256";

/// Decoded `X-Stamp` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStamp {
    pub public_key: String,
    pub scheme: String,
    pub signature: String,
}

/// Sign `payload` with `key`.
pub fn stamp_with_key(key: &SigningKey, payload: &[u8]) -> Result<Stamp, StampError> {
    let signature: Signature = key.sign(payload);
    let stamp = ApiKeyStamp {
        public_key: hex::encode(key.verifying_key().to_encoded_point(true).as_bytes()),
        scheme: SIGNATURE_SCHEME_P256.to_string(),
        signature: hex::encode(signature.to_der().as_bytes()),
    };
    let json = serde_json::to_vec(&stamp).map_err(|e| StampError::Encoding(e.to_string()))?;

    Ok(Stamp {
        stamp_header_name: API_KEY_STAMP_HEADER.to_string(),
        stamp_header_value: base64url_encode(&json),
    })
}

/// Verify an `X-Stamp` over `payload`, returning the decoded stamp.
pub fn verify_api_key_stamp(stamp: &Stamp, payload: &[u8]) -> Result<ApiKeyStamp, StampError> {
    if stamp.stamp_header_name != API_KEY_STAMP_HEADER {
        return Err(StampError::Invalid(format!(
            "unexpected header {}",
            stamp.stamp_header_name
        )));
    }

    let raw = base64url_decode(&stamp.stamp_header_value)
        .map_err(|e| StampError::Invalid(format!("stamp is not base64url: {e}")))?;
    let decoded: ApiKeyStamp =
        serde_json::from_slice(&raw).map_err(|e| StampError::Invalid(e.to_string()))?;

    if decoded.scheme != SIGNATURE_SCHEME_P256 {
        return Err(StampError::Invalid(format!(
            "unsupported scheme {}",
            decoded.scheme
        )));
    }

    let key_bytes = hex::decode(&decoded.public_key)
        .map_err(|e| StampError::Invalid(format!("public key is not hex: {e}")))?;
    let key = VerifyingKey::from_sec1_bytes(&key_bytes)
        .map_err(|_| StampError::Invalid("public key is not a P-256 point".to_string()))?;

    let sig_bytes = hex::decode(&decoded.signature)
        .map_err(|e| StampError::Invalid(format!("signature is not hex: {e}")))?;
    let signature = Signature::from_der(&sig_bytes)
        .map_err(|_| StampError::Invalid("signature is not DER".to_string()))?;

    key.verify(payload, &signature)
        .map_err(|_| StampError::Invalid("signature mismatch".to_string()))?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn stamp_verifies_against_payload() {
        let key = SigningKey::random(&mut OsRng);
        let payload = br#"{"organizationId":"org-1"}"#;

        let stamp = stamp_with_key(&key, payload).unwrap();
        assert_eq!(stamp.stamp_header_name, "X-Stamp");

        let decoded = verify_api_key_stamp(&stamp, payload).unwrap();
        assert_eq!(decoded.scheme, SIGNATURE_SCHEME_P256);
        assert_eq!(decoded.public_key.len(), 66);
    }

    #[test]
    fn stamp_rejects_other_payload() {
        let key = SigningKey::random(&mut OsRng);
        let stamp = stamp_with_key(&key, b"one").unwrap();
        assert!(matches!(
            verify_api_key_stamp(&stamp, b"two"),
            Err(StampError::Invalid(_))
        ));
    }

    #[test]
    fn webauthn_header_is_not_an_api_key_stamp() {
        let stamp = Stamp {
            stamp_header_name: "X-Stamp-WebAuthn".to_string(),
            stamp_header_value: "{}".to_string(),
        };
        assert!(verify_api_key_stamp(&stamp, b"").is_err());
    }
}
