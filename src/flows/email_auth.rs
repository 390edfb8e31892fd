// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Log in with a credential bundle sent by email.
//!
//! The bundle is encrypted to the auth frame's public key, so the same frame
//! (or a frame holding the same embedded key) must be used to complete the
//! login. The bundle is stored with the one-hour TTL so later requests can
//! be stamped by the frame instead of the passkey.

use tracing::info;

use super::established_session;
use crate::api::{AuthenticationRequest, EmailAuthInit};
use crate::config::BUNDLE_STORAGE_KEY;
use crate::error::ClientError;
use crate::frame::IframeStamper;
use crate::session::AuthState;
use crate::stamper::Stamper;
use crate::state::ClientState;

/// An email login waiting for its bundle.
#[derive(Debug)]
pub struct EmailAuth {
    frame: IframeStamper,
    target_public_key: String,
    init: EmailAuthInit,
}

/// Start the auth frame and ask the backend to email a credential bundle
/// for it to `email`.
pub async fn begin_email_auth(state: &ClientState, email: &str) -> Result<EmailAuth, ClientError> {
    let frame = state.auth_frame();
    let target_public_key = frame.init().await?;
    let init = state.api().email_auth(email, &target_public_key).await?;
    info!(%email, user_id = %init.user_id, "Email auth bundle requested");

    Ok(EmailAuth {
        frame,
        target_public_key,
        init,
    })
}

impl EmailAuth {
    pub fn target_public_key(&self) -> &str {
        &self.target_public_key
    }

    pub fn organization_id(&self) -> &str {
        &self.init.organization_id
    }

    /// Inject the emailed bundle, keep it for later stamping and establish
    /// a session for its organization.
    pub async fn complete(self, state: &ClientState, bundle: &str) -> Result<AuthState, ClientError> {
        let _guard = state.begin()?;
        let bundle = bundle.trim();

        self.frame.inject_credential_bundle(bundle).await?;
        state
            .bundles
            .set(BUNDLE_STORAGE_KEY, bundle, state.config.bundle_ttl)?;

        let stamper = Stamper::Iframe(self.frame.clone());
        let signed = state
            .custody
            .stamp_get_whoami(&stamper, &self.init.organization_id)
            .await?;
        let whoami = state
            .custody
            .get_whoami(&stamper, &self.init.organization_id)
            .await?;

        state
            .api()
            .authenticate(&AuthenticationRequest {
                signed_whoami_request: signed,
                sub_organization_id: Some(whoami.organization_id),
            })
            .await?;
        established_session(state).await
    }
}
