// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Isolated Signer Bridge
//!
//! [`IframeStamper`] talks to an isolated frame that holds an embedded P-256
//! key. Credential bundles are decrypted inside the frame; the host only ever
//! sends opaque bundles and payloads and gets stamps back.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --init--> Initializing --handshake--> Ready --clear--> Cleared
//!       ^                      |
//!       +------ failure -------+
//! ```
//!
//! - One initialization runs at a time. Concurrent `init` callers wait for
//!   the one in flight and share its outcome.
//! - The handshake must arrive within the init timeout and must come from
//!   the configured origin.
//! - Requests made while `Initializing` wait for readiness. Requests made
//!   while `Uninitialized` or `Cleared` fail.
//! - `Cleared` is terminal: the frame is torn down with its keys.

pub mod bundle;
pub mod embedded;
pub mod messages;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::stamper::Stamp;

pub use bundle::{public_key_hex, seal_bundle, BundleError, BundleKind};
pub use embedded::{LocalFrameLauncher, RevealSink};
pub use messages::{FrameChannel, FrameCommand, FrameFault, FrameReply, FrameRequest, Handshake};

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    Ready,
    Cleared,
}

/// Isolated signer bridge error.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("frame is not initialized")]
    NotInitialized,

    #[error("frame has been cleared")]
    Cleared,

    #[error("frame handshake timed out")]
    HandshakeTimeout,

    #[error("frame origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch { expected: String, actual: String },

    #[error("frame launch failed: {0}")]
    Launch(String),

    #[error("frame channel closed")]
    Closed,

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("no credential injected into frame")]
    NoCredential,

    #[error("frame has nowhere to reveal the exported secret")]
    NoRevealTarget,

    #[error("frame signing failed: {0}")]
    Signing(String),
}

impl From<FrameFault> for BridgeError {
    fn from(fault: FrameFault) -> Self {
        match fault {
            FrameFault::InvalidBundle(reason) => BridgeError::InvalidBundle(reason),
            FrameFault::NoCredential => BridgeError::NoCredential,
            FrameFault::NoRevealTarget => BridgeError::NoRevealTarget,
            FrameFault::Signing(reason) => BridgeError::Signing(reason),
        }
    }
}

/// Starts isolated frames. The frame must answer with a [`Handshake`].
pub trait FrameLauncher: Send + Sync {
    fn launch(&self, origin: &Url) -> Result<FrameChannel, BridgeError>;
}

#[derive(Clone)]
struct Connection {
    commands: mpsc::Sender<FrameCommand>,
    public_key: String,
}

struct Inner {
    origin: Url,
    launcher: Arc<dyn FrameLauncher>,
    init_timeout: Duration,
    state: watch::Sender<BridgeState>,
    conn: Mutex<Option<Connection>>,
}

/// Stamper backed by an isolated frame. Cheap to clone; clones share the
/// same frame.
#[derive(Clone)]
pub struct IframeStamper {
    inner: Arc<Inner>,
}

impl IframeStamper {
    pub fn new(origin: Url, launcher: Arc<dyn FrameLauncher>, init_timeout: Duration) -> Self {
        let (state, _) = watch::channel(BridgeState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                origin,
                launcher,
                init_timeout,
                state,
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.inner.origin
    }

    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    /// Embedded public key (uncompressed SEC1 hex), once ready.
    pub fn public_key(&self) -> Option<String> {
        self.lock_conn().as_ref().map(|c| c.public_key.clone())
    }

    /// Launch the frame and complete the handshake. Returns the embedded
    /// public key. Idempotent once ready.
    pub async fn init(&self) -> Result<String, BridgeError> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == BridgeState::Uninitialized {
                *state = BridgeState::Initializing;
                true
            } else {
                false
            }
        });

        if !claimed {
            self.wait_ready().await?;
            return self.public_key().ok_or(BridgeError::NotInitialized);
        }

        match self.handshake().await {
            Ok(conn) => {
                let public_key = conn.public_key.clone();
                let mut slot = self.lock_conn();
                let ready = self.inner.state.send_if_modified(|state| {
                    if *state == BridgeState::Initializing {
                        *state = BridgeState::Ready;
                        true
                    } else {
                        false
                    }
                });
                if !ready {
                    return Err(BridgeError::Cleared);
                }
                *slot = Some(conn);
                info!(origin = %self.inner.origin, "Frame ready");
                Ok(public_key)
            }
            Err(e) => {
                warn!(origin = %self.inner.origin, error = %e, "Frame init failed");
                self.inner.state.send_if_modified(|state| {
                    if *state == BridgeState::Initializing {
                        *state = BridgeState::Uninitialized;
                        true
                    } else {
                        false
                    }
                });
                Err(e)
            }
        }
    }

    pub async fn inject_credential_bundle(&self, bundle: &str) -> Result<(), BridgeError> {
        self.inject(BundleKind::Credential, bundle).await
    }

    pub async fn inject_recovery_bundle(&self, bundle: &str) -> Result<(), BridgeError> {
        self.inject(BundleKind::Recovery, bundle).await
    }

    /// Decrypt an export bundle; the secret is revealed inside the frame.
    pub async fn inject_wallet_export_bundle(&self, bundle: &str) -> Result<(), BridgeError> {
        self.inject(BundleKind::WalletExport, bundle).await
    }

    /// Sign `payload` with the injected credential (`X-Stamp`).
    pub async fn stamp(&self, payload: &str) -> Result<Stamp, BridgeError> {
        match self
            .request(FrameRequest::Stamp {
                payload: payload.to_string(),
            })
            .await?
        {
            FrameReply::Stamped(stamp) => Ok(stamp),
            FrameReply::Injected => Err(BridgeError::Signing("unexpected frame reply".to_string())),
        }
    }

    /// Tear the frame down. Terminal.
    pub fn clear(&self) {
        let mut slot = self.lock_conn();
        *slot = None;
        self.inner.state.send_replace(BridgeState::Cleared);
        debug!(origin = %self.inner.origin, "Frame cleared");
    }

    async fn inject(&self, kind: BundleKind, bundle: &str) -> Result<(), BridgeError> {
        match self
            .request(FrameRequest::InjectBundle {
                kind,
                bundle: bundle.to_string(),
            })
            .await?
        {
            FrameReply::Injected => Ok(()),
            FrameReply::Stamped(_) => Err(BridgeError::InvalidBundle(
                "unexpected frame reply".to_string(),
            )),
        }
    }

    async fn handshake(&self) -> Result<Connection, BridgeError> {
        let FrameChannel {
            handshake,
            commands,
        } = self.inner.launcher.launch(&self.inner.origin)?;

        let handshake = tokio::time::timeout(self.inner.init_timeout, handshake)
            .await
            .map_err(|_| BridgeError::HandshakeTimeout)?
            .map_err(|_| BridgeError::Closed)?;

        if handshake.origin.origin() != self.inner.origin.origin() {
            return Err(BridgeError::OriginMismatch {
                expected: self.inner.origin.origin().ascii_serialization(),
                actual: handshake.origin.origin().ascii_serialization(),
            });
        }

        Ok(Connection {
            commands,
            public_key: handshake.public_key,
        })
    }

    async fn wait_ready(&self) -> Result<(), BridgeError> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != BridgeState::Initializing)
            .await
            .map_err(|_| BridgeError::Closed)?;

        match state {
            BridgeState::Ready => Ok(()),
            BridgeState::Cleared => Err(BridgeError::Cleared),
            BridgeState::Uninitialized | BridgeState::Initializing => {
                Err(BridgeError::NotInitialized)
            }
        }
    }

    async fn request(&self, request: FrameRequest) -> Result<FrameReply, BridgeError> {
        match self.state() {
            BridgeState::Ready => {}
            BridgeState::Initializing => self.wait_ready().await?,
            BridgeState::Uninitialized => return Err(BridgeError::NotInitialized),
            BridgeState::Cleared => return Err(BridgeError::Cleared),
        }

        let commands = self
            .lock_conn()
            .as_ref()
            .map(|c| c.commands.clone())
            .ok_or(BridgeError::NotInitialized)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(FrameCommand {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::Closed)?;

        let reply = reply_rx.await.map_err(|_| BridgeError::Closed)??;
        Ok(reply)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        // Nothing panics while holding this lock; recover rather than poison.
        self.inner
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for IframeStamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IframeStamper")
            .field("origin", &self.inner.origin.as_str())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamper::verify_api_key_stamp;
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zeroize::Zeroizing;

    fn origin() -> Url {
        Url::parse("https://auth.wallet.example").unwrap()
    }

    fn stamper(launcher: Arc<dyn FrameLauncher>) -> IframeStamper {
        IframeStamper::new(origin(), launcher, Duration::from_millis(200))
    }

    fn credential_bundle(target: &str) -> (SigningKey, String) {
        let key = SigningKey::random(&mut OsRng);
        let bundle = seal_bundle(BundleKind::Credential, target, &key.to_bytes()).unwrap();
        (key, bundle)
    }

    struct CountingLauncher {
        launches: AtomicUsize,
        inner: LocalFrameLauncher,
    }

    impl FrameLauncher for CountingLauncher {
        fn launch(&self, origin: &Url) -> Result<FrameChannel, BridgeError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.inner.launch(origin)
        }
    }

    /// Answers the handshake after a delay.
    struct SlowLauncher(Duration);

    impl FrameLauncher for SlowLauncher {
        fn launch(&self, origin: &Url) -> Result<FrameChannel, BridgeError> {
            let channel = LocalFrameLauncher::new().launch(origin)?;
            let (tx, rx) = oneshot::channel();
            let delay = self.0;
            let upstream = channel.handshake;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Ok(handshake) = upstream.await {
                    let _ = tx.send(handshake);
                }
            });
            Ok(FrameChannel {
                handshake: rx,
                commands: channel.commands,
            })
        }
    }

    /// Never answers.
    struct SilentLauncher;

    impl FrameLauncher for SilentLauncher {
        fn launch(&self, _origin: &Url) -> Result<FrameChannel, BridgeError> {
            let (tx, rx) = oneshot::channel();
            let (commands, _) = mpsc::channel(1);
            // Keep the sender alive so the receiver waits instead of closing.
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(tx);
            });
            Ok(FrameChannel {
                handshake: rx,
                commands,
            })
        }
    }

    /// Loads the frame from a different origin.
    struct WrongOriginLauncher;

    impl FrameLauncher for WrongOriginLauncher {
        fn launch(&self, _origin: &Url) -> Result<FrameChannel, BridgeError> {
            LocalFrameLauncher::new().launch(&Url::parse("https://evil.example").unwrap())
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<String>>);

    impl RevealSink for CollectingSink {
        fn reveal(&self, secret: Zeroizing<String>) {
            self.0.lock().unwrap().push(secret.to_string());
        }
    }

    #[tokio::test]
    async fn init_exposes_uncompressed_public_key() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        assert_eq!(frame.state(), BridgeState::Uninitialized);
        assert!(frame.public_key().is_none());

        let key = frame.init().await.unwrap();
        assert_eq!(key.len(), 130);
        assert!(key.starts_with("04"));
        assert_eq!(frame.state(), BridgeState::Ready);
        assert_eq!(frame.public_key(), Some(key.clone()));

        // Idempotent once ready.
        assert_eq!(frame.init().await.unwrap(), key);
    }

    #[tokio::test]
    async fn concurrent_init_launches_once() {
        let launcher = Arc::new(CountingLauncher {
            launches: AtomicUsize::new(0),
            inner: LocalFrameLauncher::new(),
        });
        let frame = stamper(launcher.clone());

        let (a, b, c) = tokio::join!(frame.init(), frame.init(), frame.init());
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stamping_before_init_fails() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        assert!(matches!(
            frame.stamp("{}").await,
            Err(BridgeError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn stamping_while_initializing_waits_for_ready() {
        let frame = stamper(Arc::new(SlowLauncher(Duration::from_millis(50))));

        let init = frame.init();
        let stamp = async {
            tokio::task::yield_now().await;
            frame.stamp("{}").await
        };
        let (init, stamp) = tokio::join!(init, stamp);

        init.unwrap();
        // Reached the frame rather than failing as uninitialized.
        assert!(matches!(stamp, Err(BridgeError::NoCredential)));
    }

    #[tokio::test]
    async fn stamp_after_credential_injection() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        let target = frame.init().await.unwrap();
        let (key, bundle) = credential_bundle(&target);

        frame.inject_credential_bundle(&bundle).await.unwrap();
        let payload = r#"{"organizationId":"sub-org"}"#;
        let stamp = frame.stamp(payload).await.unwrap();

        assert_eq!(stamp.stamp_header_name, "X-Stamp");
        let decoded = verify_api_key_stamp(&stamp, payload.as_bytes()).unwrap();
        assert_eq!(
            decoded.public_key,
            hex::encode(key.verifying_key().to_encoded_point(true).as_bytes())
        );
    }

    #[tokio::test]
    async fn stamp_without_credential_fails() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        frame.init().await.unwrap();
        assert!(matches!(
            frame.stamp("{}").await,
            Err(BridgeError::NoCredential)
        ));
    }

    #[tokio::test]
    async fn malformed_and_foreign_bundles_are_invalid() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        let target = frame.init().await.unwrap();

        assert!(matches!(
            frame.inject_credential_bundle("garbage!").await,
            Err(BridgeError::InvalidBundle(_))
        ));

        // Sealed to a different frame's key.
        let other = stamper(Arc::new(LocalFrameLauncher::new()));
        let (_, foreign) = credential_bundle(&other.init().await.unwrap());
        assert!(matches!(
            frame.inject_credential_bundle(&foreign).await,
            Err(BridgeError::InvalidBundle(_))
        ));

        // Recovery bundle offered as a credential bundle.
        let key = SigningKey::random(&mut OsRng);
        let recovery = seal_bundle(BundleKind::Recovery, &target, &key.to_bytes()).unwrap();
        assert!(matches!(
            frame.inject_credential_bundle(&recovery).await,
            Err(BridgeError::InvalidBundle(_))
        ));
        frame.inject_recovery_bundle(&recovery).await.unwrap();
        frame.stamp("{}").await.unwrap();
    }

    #[tokio::test]
    async fn handshake_timeout_reverts_to_uninitialized() {
        let frame = stamper(Arc::new(SilentLauncher));
        assert!(matches!(
            frame.init().await,
            Err(BridgeError::HandshakeTimeout)
        ));
        assert_eq!(frame.state(), BridgeState::Uninitialized);
    }

    #[tokio::test]
    async fn handshake_from_other_origin_is_rejected() {
        let frame = stamper(Arc::new(WrongOriginLauncher));
        match frame.init().await {
            Err(BridgeError::OriginMismatch { expected, actual }) => {
                assert_eq!(expected, "https://auth.wallet.example");
                assert_eq!(actual, "https://evil.example");
            }
            other => panic!("expected origin mismatch, got {other:?}"),
        }
        assert_eq!(frame.state(), BridgeState::Uninitialized);
        assert!(frame.public_key().is_none());
    }

    #[tokio::test]
    async fn clear_is_terminal() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        let target = frame.init().await.unwrap();
        let (_, bundle) = credential_bundle(&target);
        frame.inject_credential_bundle(&bundle).await.unwrap();

        frame.clear();
        assert_eq!(frame.state(), BridgeState::Cleared);
        assert!(frame.public_key().is_none());
        assert!(matches!(frame.stamp("{}").await, Err(BridgeError::Cleared)));
        assert!(matches!(frame.init().await, Err(BridgeError::Cleared)));
    }

    #[tokio::test]
    async fn clear_during_init_wins() {
        let frame = stamper(Arc::new(SlowLauncher(Duration::from_millis(50))));
        let init = frame.init();
        let clear = async {
            tokio::task::yield_now().await;
            frame.clear();
        };
        let (init, ()) = tokio::join!(init, clear);

        assert!(matches!(init, Err(BridgeError::Cleared)));
        assert_eq!(frame.state(), BridgeState::Cleared);
    }

    #[tokio::test]
    async fn export_bundle_is_revealed_inside_frame() {
        let sink = Arc::new(CollectingSink::default());
        let frame = stamper(Arc::new(LocalFrameLauncher::with_reveal_sink(sink.clone())));
        let target = frame.init().await.unwrap();

        let mnemonic = "test test test test test test test test test test test junk";
        let bundle = seal_bundle(BundleKind::WalletExport, &target, mnemonic.as_bytes()).unwrap();
        frame.inject_wallet_export_bundle(&bundle).await.unwrap();

        assert_eq!(sink.0.lock().unwrap().as_slice(), [mnemonic.to_string()]);
    }

    #[tokio::test]
    async fn export_without_reveal_sink_fails() {
        let frame = stamper(Arc::new(LocalFrameLauncher::new()));
        let target = frame.init().await.unwrap();
        let bundle = seal_bundle(BundleKind::WalletExport, &target, b"secret").unwrap();
        assert!(matches!(
            frame.inject_wallet_export_bundle(&bundle).await,
            Err(BridgeError::NoRevealTarget)
        ));
    }
}
