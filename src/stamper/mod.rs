// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Stamping
//!
//! A stamp is a signature over a request body, carried in an HTTP header the
//! custody API verifies. Two capabilities produce stamps:
//!
//! - [`WebauthnStamper`]: asks the authenticator for an assertion whose
//!   challenge is the SHA-256 of the body (`X-Stamp-WebAuthn`)
//! - [`IframeStamper`]: asks the isolated signer to sign the body with the
//!   key it adopted from a credential bundle (`X-Stamp`)
//!
//! Stamped requests are not sent by the stamper; they are wrapped in a
//! [`SignedRequest`] and handed to the backend, which forwards them.

pub mod api_key;
pub mod webauthn;

use serde::{Deserialize, Serialize};

use crate::frame::{BridgeError, IframeStamper};
use crate::webauthn::WebAuthnError;

pub use api_key::{
    stamp_with_key, verify_api_key_stamp, ApiKeyStamp, API_KEY_STAMP_HEADER,
    SIGNATURE_SCHEME_P256,
};
pub use webauthn::{WebauthnStamp, WebauthnStamper, WEBAUTHN_STAMP_HEADER};

/// Header name/value pair attached to a custody API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    pub stamp_header_name: String,
    pub stamp_header_value: String,
}

/// A custody API request body with its stamp, ready to be forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
    pub url: String,
    pub body: String,
    pub stamp: Stamp,
}

/// Stamping error.
#[derive(Debug, thiserror::Error)]
pub enum StampError {
    #[error(transparent)]
    WebAuthn(#[from] WebAuthnError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("stamp encoding failed: {0}")]
    Encoding(String),

    #[error("invalid stamp: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StamperKind {
    WebAuthn,
    Iframe,
}

/// Either stamping capability.
#[derive(Clone)]
pub enum Stamper {
    WebAuthn(WebauthnStamper),
    Iframe(IframeStamper),
}

impl Stamper {
    /// Stamp `payload`, the exact body that will be sent.
    pub async fn stamp(&self, payload: &str) -> Result<Stamp, StampError> {
        match self {
            Stamper::WebAuthn(stamper) => stamper.stamp(payload).await,
            Stamper::Iframe(stamper) => Ok(stamper.stamp(payload).await?),
        }
    }

    pub fn kind(&self) -> StamperKind {
        match self {
            Stamper::WebAuthn(_) => StamperKind::WebAuthn,
            Stamper::Iframe(_) => StamperKind::Iframe,
        }
    }
}

impl std::fmt::Debug for Stamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stamper::WebAuthn(s) => f.debug_tuple("WebAuthn").field(&s.rp_id()).finish(),
            Stamper::Iframe(s) => f.debug_tuple("Iframe").field(&s.state()).finish(),
        }
    }
}
