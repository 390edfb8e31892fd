// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::custody::CustodyError;
use crate::frame::BridgeError;
use crate::stamper::StampError;
use crate::storage::StorageError;
use crate::validation::LabelError;
use crate::webauthn::WebAuthnError;

/// Error returned by the user-facing flows.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    WebAuthn(#[from] WebAuthnError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Stamp(#[from] StampError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error("another authentication is already in progress")]
    Busy,

    /// Login or signup succeeded but the session check found no user.
    #[error("backend did not establish a session")]
    SessionNotEstablished,

    #[error("{0}")]
    Precondition(String),
}

impl ClientError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// The user dismissed an authenticator prompt.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ClientError::WebAuthn(WebAuthnError::Cancelled)
                | ClientError::Stamp(StampError::WebAuthn(WebAuthnError::Cancelled))
                | ClientError::Custody(CustodyError::Stamp(StampError::WebAuthn(
                    WebAuthnError::Cancelled
                )))
        )
    }

    /// The backend has no user for the given email.
    pub fn is_user_not_found(&self) -> bool {
        matches!(self, ClientError::Api(ApiError::UserNotFound))
    }
}
