// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebAuthn stamps (`X-Stamp-WebAuthn`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Stamp, StampError};
use crate::webauthn::{payload_challenge, request_options, Authenticator};

pub const WEBAUTHN_STAMP_HEADER: &str = "X-Stamp-WebAuthn";

/// `X-Stamp-WebAuthn` value: the assertion fields, JSON encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebauthnStamp {
    pub authenticator_data: String,
    pub client_data_json: String,
    pub credential_id: String,
    pub signature: String,
}

/// Stamper bound to a relying party, backed by an [`Authenticator`].
#[derive(Clone)]
pub struct WebauthnStamper {
    rp_id: String,
    authenticator: Arc<dyn Authenticator>,
    allow_credentials: Vec<String>,
}

impl WebauthnStamper {
    pub fn new(rp_id: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            rp_id: rp_id.into(),
            authenticator,
            allow_credentials: Vec::new(),
        }
    }

    /// Restrict assertions to the given base64url credential ids.
    pub fn with_allowed_credentials(mut self, ids: Vec<String>) -> Self {
        self.allow_credentials = ids;
        self
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// Run an assertion ceremony over `payload` and wrap it as a stamp.
    pub async fn stamp(&self, payload: &str) -> Result<Stamp, StampError> {
        let mut options = request_options(&self.rp_id, payload_challenge(payload.as_bytes()));
        options.allow_credentials = self.allow_credentials.clone();

        let assertion = self.authenticator.get_assertion(&options).await?;
        debug!(
            rp_id = %self.rp_id,
            credential_id = %assertion.credential_id,
            "WebAuthn stamp produced"
        );

        let value = WebauthnStamp {
            authenticator_data: assertion.authenticator_data,
            client_data_json: assertion.client_data_json,
            credential_id: assertion.credential_id,
            signature: assertion.signature,
        };

        Ok(Stamp {
            stamp_header_name: WEBAUTHN_STAMP_HEADER.to_string(),
            stamp_header_value: serde_json::to_string(&value)
                .map_err(|e| StampError::Encoding(e.to_string()))?,
        })
    }
}
