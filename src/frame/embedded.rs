// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process isolated frame.
//!
//! Each launch spawns a task that owns a fresh embedded P-256 key. The task
//! announces itself with a [`Handshake`], then serves [`FrameCommand`]s until
//! the host drops its command sender. Keys are dropped (and zeroized) with
//! the task.
//!
//! A launcher given a key directory keeps one embedded key per frame origin,
//! the way a browser frame keeps its key in its own origin storage. Bundles
//! encrypted to that key stay usable across launches. The key store belongs
//! to the launcher alone and must not be reachable through host storage.

use std::path::Path;
use std::sync::Arc;

use p256::ecdsa::SigningKey;
use p256::SecretKey;
use rand_core::OsRng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use url::Url;
use zeroize::Zeroizing;

use super::bundle::{open_bundle, public_key_hex, BundleKind};
use super::messages::{FrameChannel, FrameCommand, FrameFault, FrameReply, FrameRequest, Handshake};
use super::{BridgeError, FrameLauncher};
use crate::stamper::stamp_with_key;
use crate::storage::{FileStorage, LocalStorage};

const COMMAND_BUFFER: usize = 16;

const EMBEDDED_KEY_PREFIX: &str = "EMBEDDED_KEY";

/// Where an exported wallet secret is shown. The host never receives it.
pub trait RevealSink: Send + Sync {
    fn reveal(&self, secret: Zeroizing<String>);
}

/// Launches [`EmbeddedFrame`] tasks on the current runtime.
#[derive(Clone, Default)]
pub struct LocalFrameLauncher {
    reveal: Option<Arc<dyn RevealSink>>,
    keys: Option<Arc<dyn LocalStorage>>,
}

impl LocalFrameLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames launched from here hand decrypted export bundles to `sink`.
    pub fn with_reveal_sink(sink: Arc<dyn RevealSink>) -> Self {
        Self::new().reveal_to(sink)
    }

    pub fn reveal_to(mut self, sink: Arc<dyn RevealSink>) -> Self {
        self.reveal = Some(sink);
        self
    }

    /// Persist embedded keys under `dir`, one file per origin.
    ///
    /// `dir` must not be the host's storage directory.
    pub fn with_key_dir(self, dir: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let storage =
            FileStorage::open(dir.as_ref()).map_err(|e| BridgeError::Launch(e.to_string()))?;
        Ok(self.with_key_storage(Arc::new(storage)))
    }

    pub(crate) fn with_key_storage(mut self, storage: Arc<dyn LocalStorage>) -> Self {
        self.keys = Some(storage);
        self
    }

    fn embedded_key(&self, origin: &Url) -> Result<SecretKey, BridgeError> {
        let Some(storage) = &self.keys else {
            return Ok(SecretKey::random(&mut OsRng));
        };

        let storage_key = embedded_key_name(origin);
        let stored = storage
            .get_item(&storage_key)
            .map_err(|e| BridgeError::Launch(e.to_string()))?;
        if let Some(encoded) = stored {
            let restored = hex::decode(encoded.trim())
                .ok()
                .map(Zeroizing::new)
                .and_then(|bytes| SecretKey::from_slice(&bytes).ok());
            match restored {
                Some(secret) => return Ok(secret),
                None => warn!(%origin, "Discarding unreadable embedded key"),
            }
        }

        let secret = SecretKey::random(&mut OsRng);
        let encoded = Zeroizing::new(hex::encode(secret.to_bytes()));
        storage
            .set_item(&storage_key, &encoded)
            .map_err(|e| BridgeError::Launch(e.to_string()))?;
        debug!(%origin, "Embedded key generated");
        Ok(secret)
    }
}

fn embedded_key_name(origin: &Url) -> String {
    let host: String = origin
        .host_str()
        .unwrap_or("frame")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{EMBEDDED_KEY_PREFIX}_{host}")
}

impl FrameLauncher for LocalFrameLauncher {
    fn launch(&self, origin: &Url) -> Result<FrameChannel, BridgeError> {
        let (handshake_tx, handshake_rx) = oneshot::channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let frame = EmbeddedFrame {
            embedded: self.embedded_key(origin)?,
            credential: None,
            reveal: self.reveal.clone(),
        };
        let handshake = Handshake {
            origin: origin.clone(),
            public_key: public_key_hex(&frame.embedded.public_key()),
        };

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::Launch(e.to_string()))?;
        handle.spawn(frame.run(handshake, handshake_tx, commands_rx));

        Ok(FrameChannel {
            handshake: handshake_rx,
            commands: commands_tx,
        })
    }
}

/// State held inside the frame task.
pub struct EmbeddedFrame {
    embedded: SecretKey,
    credential: Option<SigningKey>,
    reveal: Option<Arc<dyn RevealSink>>,
}

impl EmbeddedFrame {
    async fn run(
        mut self,
        handshake: Handshake,
        handshake_tx: oneshot::Sender<Handshake>,
        mut commands: mpsc::Receiver<FrameCommand>,
    ) {
        debug!(origin = %handshake.origin, "Frame started");
        if handshake_tx.send(handshake).is_err() {
            return;
        }

        while let Some(FrameCommand { request, reply }) = commands.recv().await {
            let result = self.handle(request);
            if let Err(fault) = &result {
                warn!(?fault, "Frame request failed");
            }
            // Host may have given up on the reply; nothing to do then.
            let _ = reply.send(result);
        }

        debug!("Frame stopped");
    }

    fn handle(&mut self, request: FrameRequest) -> Result<FrameReply, FrameFault> {
        match request {
            FrameRequest::InjectBundle { kind, bundle } => {
                self.inject(kind, &bundle)?;
                Ok(FrameReply::Injected)
            }
            FrameRequest::Stamp { payload } => {
                let key = self.credential.as_ref().ok_or(FrameFault::NoCredential)?;
                let stamp = stamp_with_key(key, payload.as_bytes())
                    .map_err(|e| FrameFault::Signing(e.to_string()))?;
                Ok(FrameReply::Stamped(stamp))
            }
        }
    }

    fn inject(&mut self, kind: BundleKind, bundle: &str) -> Result<(), FrameFault> {
        let plaintext = open_bundle(kind, &self.embedded, bundle)
            .map_err(|e| FrameFault::InvalidBundle(e.to_string()))?;

        match kind {
            BundleKind::Credential | BundleKind::Recovery => {
                let key = SigningKey::from_slice(&plaintext).map_err(|_| {
                    FrameFault::InvalidBundle("bundle does not carry a P-256 key".to_string())
                })?;
                self.credential = Some(key);
                info!(?kind, "Credential adopted");
            }
            BundleKind::WalletExport => {
                let sink = self.reveal.as_ref().ok_or(FrameFault::NoRevealTarget)?;
                let secret = String::from_utf8(plaintext.to_vec()).map_err(|_| {
                    FrameFault::InvalidBundle("export bundle is not UTF-8".to_string())
                })?;
                sink.reveal(Zeroizing::new(secret));
                info!("Wallet export revealed");
            }
        }
        Ok(())
    }
}
