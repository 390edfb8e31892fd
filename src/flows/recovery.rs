// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passkey recovery.
//!
//! 1. [`begin_recovery`] starts the recovery frame and has the backend email
//!    a recovery bundle encrypted to the frame's key.
//! 2. [`Recovery::recover`] injects the bundle, creates a replacement passkey
//!    and submits `ACTIVITY_TYPE_RECOVER_USER` stamped by the frame.
//!
//! The activity is checked once. A completed recovery deletes the recovery
//! credential, so the frame cannot be used to poll it afterwards; `PENDING`
//! is reported as-is and the user is sent back to log in.

use tracing::info;

use crate::api::RecoveryInit;
use crate::custody::{Activity, RecoverUser};
use crate::error::ClientError;
use crate::frame::IframeStamper;
use crate::stamper::Stamper;
use crate::state::ClientState;
use crate::validation::validate_authenticator_label;
use crate::webauthn::creation_options;

/// A recovery waiting for its bundle.
#[derive(Debug)]
pub struct Recovery {
    frame: IframeStamper,
    target_public_key: String,
    init: RecoveryInit,
}

pub async fn begin_recovery(state: &ClientState, email: &str) -> Result<Recovery, ClientError> {
    let _guard = state.begin()?;
    let frame = state.recovery_frame();
    let target_public_key = frame.init().await?;
    let init = state.api().init_recovery(email, &target_public_key).await?;
    info!(%email, user_id = %init.user_id, "Recovery initiated");

    Ok(Recovery {
        frame,
        target_public_key,
        init,
    })
}

impl Recovery {
    pub fn target_public_key(&self) -> &str {
        &self.target_public_key
    }

    pub fn user_id(&self) -> &str {
        &self.init.user_id
    }

    /// Register a new passkey named `authenticator_name` using the emailed
    /// recovery `bundle`.
    pub async fn recover(
        &self,
        state: &ClientState,
        bundle: &str,
        authenticator_name: &str,
    ) -> Result<Activity, ClientError> {
        validate_authenticator_label(authenticator_name)?;
        let _guard = state.begin()?;

        self.frame.inject_recovery_bundle(bundle.trim()).await?;

        let ceremony = creation_options(&state.config.rp_id, authenticator_name)?;
        let attestation = state
            .authenticator
            .create_credential(&ceremony.options)
            .await?;
        let challenge = ceremony.encoded_challenge();

        let activity = state
            .custody
            .recover_user(
                &Stamper::Iframe(self.frame.clone()),
                RecoverUser {
                    organization_id: &self.init.organization_id,
                    user_id: &self.init.user_id,
                    authenticator_name,
                    challenge: &challenge,
                    attestation: &attestation,
                },
            )
            .await?;

        info!(activity_id = %activity.id, "Recovery complete, log in with the new passkey");
        self.frame.clear();
        Ok(activity)
    }
}
