// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::BackendClient;
use crate::config::ClientConfig;
use crate::custody::CustodyClient;
use crate::error::ClientError;
use crate::frame::{FrameLauncher, IframeStamper};
use crate::session::Session;
use crate::stamper::WebauthnStamper;
use crate::storage::{CredentialBundleStore, LocalStorage};
use crate::webauthn::Authenticator;

/// Everything the flows need, shared by cheap clones.
#[derive(Clone)]
pub struct ClientState {
    pub config: ClientConfig,
    pub session: Session,
    pub custody: CustodyClient,
    pub storage: Arc<dyn LocalStorage>,
    pub bundles: CredentialBundleStore,
    pub authenticator: Arc<dyn Authenticator>,
    pub launcher: Arc<dyn FrameLauncher>,
    busy: Arc<AtomicBool>,
}

impl ClientState {
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn LocalStorage>,
        authenticator: Arc<dyn Authenticator>,
        launcher: Arc<dyn FrameLauncher>,
    ) -> Result<Self, ClientError> {
        let api = BackendClient::new(config.backend_base_url.clone(), config.http_timeout)?;
        let custody = CustodyClient::new(config.custody_base_url.clone(), config.http_timeout)?;
        let bundles = CredentialBundleStore::new(storage.clone());
        Ok(Self::from_parts(
            config,
            Session::new(api),
            custody,
            storage,
            bundles,
            authenticator,
            launcher,
        ))
    }

    pub fn from_parts(
        config: ClientConfig,
        session: Session,
        custody: CustodyClient,
        storage: Arc<dyn LocalStorage>,
        bundles: CredentialBundleStore,
        authenticator: Arc<dyn Authenticator>,
        launcher: Arc<dyn FrameLauncher>,
    ) -> Self {
        Self {
            config,
            session,
            custody,
            storage,
            bundles,
            authenticator,
            launcher,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn api(&self) -> &BackendClient {
        self.session.api()
    }

    pub fn webauthn_stamper(&self) -> WebauthnStamper {
        WebauthnStamper::new(self.config.rp_id.clone(), self.authenticator.clone())
    }

    pub fn auth_frame(&self) -> IframeStamper {
        self.frame(self.config.auth_frame_origin.clone())
    }

    pub fn recovery_frame(&self) -> IframeStamper {
        self.frame(self.config.recovery_frame_origin.clone())
    }

    pub fn export_frame(&self) -> IframeStamper {
        self.frame(self.config.export_frame_origin.clone())
    }

    fn frame(&self, origin: url::Url) -> IframeStamper {
        IframeStamper::new(origin, self.launcher.clone(), self.config.frame_init_timeout)
    }

    /// Claim the re-entrancy guard. Fails with [`ClientError::Busy`] while
    /// another guarded flow is running.
    pub fn begin(&self) -> Result<BusyGuard, ClientError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy)?;
        Ok(BusyGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the re-entrancy guard on drop.
#[must_use]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::LocalFrameLauncher;
    use crate::storage::MemoryStorage;
    use crate::webauthn::SoftwareAuthenticator;
    use url::Url;

    fn state() -> ClientState {
        let config = ClientConfig::for_base_url(Url::parse("http://127.0.0.1:9").unwrap());
        ClientState::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(SoftwareAuthenticator::new("http://localhost")),
            Arc::new(LocalFrameLauncher::new()),
        )
        .unwrap()
    }

    #[test]
    fn busy_guard_is_exclusive_until_dropped() {
        let state = state();
        let guard = state.begin().unwrap();
        assert!(state.is_busy());
        assert!(matches!(state.clone().begin(), Err(ClientError::Busy)));

        drop(guard);
        assert!(!state.is_busy());
        assert!(state.begin().is_ok());
    }

    #[test]
    fn frames_use_configured_origins() {
        let state = state();
        assert_eq!(state.auth_frame().origin(), &state.config.auth_frame_origin);
        assert_eq!(
            state.recovery_frame().origin(),
            &state.config.recovery_frame_origin
        );
        assert_eq!(state.export_frame().origin(), &state.config.export_frame_origin);
    }
}
