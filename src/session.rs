// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication session state.
//!
//! [`Session`] wraps the backend session check. State changes are published
//! on a watch channel so long-running consumers (the CLI `watch` command,
//! pollers) can follow logins and logouts. Flows call
//! [`Session::refresh`] after anything that changes the backend session.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error};

use crate::api::BackendClient;

/// What the client knows about the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// A session check has completed.
    pub is_loaded: bool,
    pub is_logged_in: bool,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub sub_organization_id: Option<String>,
}

/// Backend session plus its last known [`AuthState`].
#[derive(Debug, Clone)]
pub struct Session {
    api: BackendClient,
    state: Arc<watch::Sender<AuthState>>,
}

impl Session {
    pub fn new(api: BackendClient) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            api,
            state: Arc::new(state),
        }
    }

    pub fn api(&self) -> &BackendClient {
        &self.api
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Re-run the session check and publish the result.
    ///
    /// A failed check resets to the initial, not-loaded state.
    pub async fn refresh(&self) -> AuthState {
        let next = match self.api.whoami().await {
            Ok(Some(user)) => AuthState {
                is_loaded: true,
                is_logged_in: true,
                email: user.email,
                user_id: user.id,
                sub_organization_id: user.sub_organization_id,
            },
            Ok(None) => AuthState {
                is_loaded: true,
                ..AuthState::default()
            },
            Err(e) => {
                error!(error = %e, "Error while loading auth status");
                AuthState::default()
            }
        };

        debug!(logged_in = next.is_logged_in, "Auth state refreshed");
        self.state.send_replace(next.clone());
        next
    }
}
