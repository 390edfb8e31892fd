// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Messages exchanged between the host and an isolated frame.
//!
//! The host never sees key material: requests carry opaque bundles and
//! payloads, replies carry stamps or a fault.

use tokio::sync::{mpsc, oneshot};
use url::Url;

use super::bundle::BundleKind;
use crate::stamper::Stamp;

/// Request sent to the frame.
#[derive(Debug)]
pub enum FrameRequest {
    /// Decrypt `bundle` inside the frame and adopt what it carries.
    InjectBundle { kind: BundleKind, bundle: String },
    /// Sign `payload` with the adopted credential.
    Stamp { payload: String },
}

/// Successful reply from the frame.
#[derive(Debug)]
pub enum FrameReply {
    Injected,
    Stamped(Stamp),
}

/// Failure reported by the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    InvalidBundle(String),
    NoCredential,
    NoRevealTarget,
    Signing(String),
}

/// A request plus the slot its reply goes into.
#[derive(Debug)]
pub struct FrameCommand {
    pub request: FrameRequest,
    pub reply: oneshot::Sender<Result<FrameReply, FrameFault>>,
}

/// First message a frame sends once it is up.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Origin the frame was loaded from.
    pub origin: Url,
    /// Embedded public key, uncompressed SEC1 hex.
    pub public_key: String,
}

/// Host side of a launched frame.
#[derive(Debug)]
pub struct FrameChannel {
    pub handshake: oneshot::Receiver<Handshake>,
    pub commands: mpsc::Sender<FrameCommand>,
}
