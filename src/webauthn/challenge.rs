// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Challenge generation and ceremony option builders.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use super::{
    AuthenticatorSelection, CredentialCreationOptions, CredentialParameter,
    CredentialRequestOptions, RelyingParty, UserEntity, WebAuthnError,
};

/// COSE algorithm identifier for ES256 (ECDSA P-256 / SHA-256).
///
/// The only algorithm offered in creation options.
pub const ES256: i64 = -7;

/// The only defined `PublicKeyCredentialType`.
pub const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// Relying-party display name.
pub const RP_NAME: &str = "Demo Passkey Wallet";

const CHALLENGE_LEN: usize = 32;

/// Creation options together with the challenge they embed.
#[derive(Debug, Clone)]
pub struct CreationCeremony {
    pub options: CredentialCreationOptions,
}

impl CreationCeremony {
    /// The challenge as sent alongside the attestation.
    pub fn encoded_challenge(&self) -> String {
        base64url_encode(&self.options.challenge)
    }
}

/// 32 bytes from the system CSPRNG.
pub fn random_buffer() -> Result<[u8; CHALLENGE_LEN], WebAuthnError> {
    let mut buf = [0u8; CHALLENGE_LEN];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| WebAuthnError::RandomnessUnavailable)?;
    Ok(buf)
}

/// Unpadded base64url.
pub fn base64url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>, base64ct::Error> {
    Base64UrlUnpadded::decode_vec(encoded)
}

/// Build registration options for `user_name` under `rp_id`.
///
/// A fresh random challenge and user handle are generated per call.
pub fn creation_options(rp_id: &str, user_name: &str) -> Result<CreationCeremony, WebAuthnError> {
    let challenge = random_buffer()?;
    let user_handle = random_buffer()?;

    Ok(CreationCeremony {
        options: CredentialCreationOptions {
            rp: RelyingParty {
                id: rp_id.to_string(),
                name: RP_NAME.to_string(),
            },
            challenge: challenge.to_vec(),
            pub_key_cred_params: vec![CredentialParameter {
                kind: PUBLIC_KEY_CREDENTIAL_TYPE,
                alg: ES256,
            }],
            user: UserEntity {
                id: user_handle.to_vec(),
                name: user_name.to_string(),
                display_name: user_name.to_string(),
            },
            authenticator_selection: AuthenticatorSelection {
                require_resident_key: true,
                resident_key: "required".to_string(),
                user_verification: "preferred".to_string(),
            },
        },
    })
}

/// Build assertion options over an explicit challenge.
pub fn request_options(rp_id: &str, challenge: Vec<u8>) -> CredentialRequestOptions {
    CredentialRequestOptions {
        rp_id: rp_id.to_string(),
        challenge,
        allow_credentials: Vec::new(),
        user_verification: "preferred".to_string(),
    }
}

/// Challenge used when a payload is signed through WebAuthn: the lowercase
/// hex SHA-256 of the payload, as UTF-8 bytes.
pub fn payload_challenge(payload: &[u8]) -> Vec<u8> {
    hex::encode(Sha256::digest(payload)).into_bytes()
}
