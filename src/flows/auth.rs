// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Register-or-authenticate by email.

use tracing::info;

use super::{current_stamper, established_session};
use crate::api::{AuthenticationRequest, RegistrationRequest, RegistrationStatus};
use crate::error::ClientError;
use crate::session::AuthState;
use crate::state::ClientState;
use crate::webauthn::creation_options;

/// Which path [`register_or_authenticate`] took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated {
        sub_organization_id: String,
        state: AuthState,
    },
    Registered {
        state: AuthState,
    },
}

/// Log in an existing user or sign up a new one, decided by the backend's
/// registration status for `email`.
pub async fn register_or_authenticate(
    state: &ClientState,
    email: &str,
) -> Result<AuthOutcome, ClientError> {
    let _guard = state.begin()?;

    match state.api().registration_status(email).await? {
        RegistrationStatus::Registered {
            sub_organization_id,
        } => {
            info!(%email, %sub_organization_id, "Existing user, authenticating");
            let auth = authenticate(state, &sub_organization_id).await?;
            Ok(AuthOutcome::Authenticated {
                sub_organization_id,
                state: auth,
            })
        }
        RegistrationStatus::Unregistered => {
            info!(%email, "Unknown user, signing up");
            let auth = signup(state, email).await?;
            Ok(AuthOutcome::Registered { state: auth })
        }
    }
}

/// Establish a backend session with a stamped who-am-I for
/// `sub_organization_id`.
pub async fn authenticate(
    state: &ClientState,
    sub_organization_id: &str,
) -> Result<AuthState, ClientError> {
    let frame = state.auth_frame();
    let stamper = current_stamper(state, &frame, sub_organization_id).await;
    let signed = state
        .custody
        .stamp_get_whoami(&stamper, sub_organization_id)
        .await?;

    state
        .api()
        .authenticate(&AuthenticationRequest {
            signed_whoami_request: signed,
            sub_organization_id: None,
        })
        .await?;
    established_session(state).await
}

/// Create a passkey and register it with the backend, which provisions the
/// custody account.
pub async fn signup(state: &ClientState, email: &str) -> Result<AuthState, ClientError> {
    let ceremony = creation_options(&state.config.rp_id, email)?;
    let attestation = state
        .authenticator
        .create_credential(&ceremony.options)
        .await?;

    state
        .api()
        .register(&RegistrationRequest {
            email: email.to_string(),
            attestation,
            challenge: ceremony.encoded_challenge(),
        })
        .await?;
    established_session(state).await
}
