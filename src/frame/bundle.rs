// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted bundle format.
//!
//! A bundle carries secret material to one embedded key:
//!
//! ```text
//! base64url( encapsulated_key[65] || nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! - `encapsulated_key`: sender's ephemeral P-256 public key (uncompressed)
//! - key: HKDF-SHA256(ikm = ECDH, salt = encapsulated_key || target_key,
//!   info = per-kind label), used as AES-256-GCM key
//! - AAD: `encapsulated_key || target_key`
//!
//! The per-kind label keeps a recovery bundle from being accepted as a
//! credential bundle and vice versa.

use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::webauthn::{base64url_decode, base64url_encode};

const ENCAPSULATED_KEY_LEN: usize = 65;

/// What a bundle carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// Session credential private key (email auth).
    Credential,
    /// Recovery credential private key.
    Recovery,
    /// Exported wallet secret (UTF-8).
    WalletExport,
}

impl BundleKind {
    fn info(self) -> &'static [u8] {
        match self {
            BundleKind::Credential => b"passkey-wallet/bundle/credential/v1",
            BundleKind::Recovery => b"passkey-wallet/bundle/recovery/v1",
            BundleKind::WalletExport => b"passkey-wallet/bundle/wallet-export/v1",
        }
    }
}

/// Bundle sealing/opening error.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("bundle is not base64url: {0}")]
    Encoding(String),

    #[error("bundle is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("invalid public key in bundle")]
    InvalidPublicKey,

    #[error("bundle failed authentication")]
    Decryption,

    #[error("bundle key derivation failed")]
    KeyDerivation,

    #[error("secure randomness unavailable")]
    Randomness,
}

/// Hex of the uncompressed SEC1 encoding, the form target keys travel in.
pub fn public_key_hex(key: &PublicKey) -> String {
    hex::encode(key.to_encoded_point(false).as_bytes())
}

/// Encrypt `plaintext` to the embedded key `target_public_key_hex`.
pub fn seal_bundle(
    kind: BundleKind,
    target_public_key_hex: &str,
    plaintext: &[u8],
) -> Result<String, BundleError> {
    let target_bytes =
        hex::decode(target_public_key_hex).map_err(|_| BundleError::InvalidPublicKey)?;
    let target = PublicKey::from_sec1_bytes(&target_bytes).map_err(|_| BundleError::InvalidPublicKey)?;
    let target_point = target.to_encoded_point(false);

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let encapsulated = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(&target);

    let key = derive_key(
        kind,
        shared.raw_secret_bytes(),
        encapsulated.as_bytes(),
        target_point.as_bytes(),
    )?;

    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| BundleError::Randomness)?;

    let aad = [encapsulated.as_bytes(), target_point.as_bytes()].concat();
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(aad.as_slice()),
        &mut in_out,
    )
    .map_err(|_| BundleError::Decryption)?;

    let mut out = Vec::with_capacity(ENCAPSULATED_KEY_LEN + NONCE_LEN + in_out.len());
    out.extend_from_slice(encapsulated.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(base64url_encode(&out))
}

/// Decrypt a bundle addressed to `recipient`.
pub(crate) fn open_bundle(
    kind: BundleKind,
    recipient: &SecretKey,
    bundle: &str,
) -> Result<Zeroizing<Vec<u8>>, BundleError> {
    let raw = base64url_decode(bundle.trim()).map_err(|e| BundleError::Encoding(e.to_string()))?;
    if raw.len() < ENCAPSULATED_KEY_LEN + NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(BundleError::Truncated(raw.len()));
    }

    let (encapsulated, rest) = raw.split_at(ENCAPSULATED_KEY_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let sender = PublicKey::from_sec1_bytes(encapsulated).map_err(|_| BundleError::InvalidPublicKey)?;
    let shared = p256::ecdh::diffie_hellman(recipient.to_nonzero_scalar(), sender.as_affine());
    let target_point = recipient.public_key().to_encoded_point(false);

    let key = derive_key(
        kind,
        shared.raw_secret_bytes(),
        encapsulated,
        target_point.as_bytes(),
    )?;

    let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| BundleError::Decryption)?;
    let aad = [encapsulated, target_point.as_bytes()].concat();
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    let plaintext = key
        .open_in_place(nonce, Aad::from(aad.as_slice()), buffer.as_mut_slice())
        .map_err(|_| BundleError::Decryption)?;

    Ok(Zeroizing::new(plaintext.to_vec()))
}

fn derive_key(
    kind: BundleKind,
    shared_secret: &[u8],
    encapsulated: &[u8],
    target: &[u8],
) -> Result<LessSafeKey, BundleError> {
    let salt_bytes = [encapsulated, target].concat();
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &salt_bytes).extract(shared_secret);
    let info = [kind.info()];
    let okm = prk
        .expand(&info, &aead::AES_256_GCM)
        .map_err(|_| BundleError::KeyDerivation)?;
    Ok(LessSafeKey::new(UnboundKey::from(okm)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> (SecretKey, String) {
        let secret = SecretKey::random(&mut OsRng);
        let public = public_key_hex(&secret.public_key());
        (secret, public)
    }

    #[test]
    fn sealed_bundle_opens_for_recipient() {
        let (secret, public) = recipient();
        let bundle = seal_bundle(BundleKind::Credential, &public, b"thirty-two bytes of key material").unwrap();

        let opened = open_bundle(BundleKind::Credential, &secret, &bundle).unwrap();
        assert_eq!(opened.as_slice(), b"thirty-two bytes of key material");
    }

    #[test]
    fn bundle_kinds_do_not_cross() {
        let (secret, public) = recipient();
        let bundle = seal_bundle(BundleKind::Recovery, &public, b"secret").unwrap();

        assert!(matches!(
            open_bundle(BundleKind::Credential, &secret, &bundle),
            Err(BundleError::Decryption)
        ));
    }

    #[test]
    fn other_recipient_cannot_open() {
        let (_, public) = recipient();
        let (other, _) = recipient();
        let bundle = seal_bundle(BundleKind::Credential, &public, b"secret").unwrap();

        assert!(open_bundle(BundleKind::Credential, &other, &bundle).is_err());
    }

    #[test]
    fn garbage_is_rejected_distinctly() {
        let (secret, _) = recipient();
        assert!(matches!(
            open_bundle(BundleKind::Credential, &secret, "not*base64"),
            Err(BundleError::Encoding(_))
        ));
        assert!(matches!(
            open_bundle(BundleKind::Credential, &secret, "AAAA"),
            Err(BundleError::Truncated(3))
        ));
    }

    #[test]
    fn public_key_hex_is_uncompressed() {
        let (_, public) = recipient();
        assert_eq!(public.len(), 130);
        assert!(public.starts_with("04"));
    }
}
