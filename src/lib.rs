// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passkey Wallet - Client for a Custodial Ethereum Wallet
//!
//! Users authenticate with a passkey (WebAuthn) or with a credential bundle
//! sent by email. Requests to the custody API are stamped either by the
//! authenticator or by an isolated frame that holds the bundle's key and
//! never hands key material back.
//!
//! ## Modules
//!
//! - `webauthn` - challenge/attestation builder, authenticator trait
//! - `frame` - isolated signer bridge and bundle encryption
//! - `stamper` - WebAuthn and API-key stamps
//! - `storage` - local storage and the expiring credential bundle store
//! - `api` - wallet backend client
//! - `custody` - custody API activities
//! - `flows` - registration, login, recovery and wallet actions
//! - `session` / `poller` - auth state and periodic refetch

pub mod api;
pub mod config;
pub mod custody;
pub mod error;
pub mod flows;
pub mod frame;
pub mod logging;
pub mod poller;
pub mod session;
pub mod stamper;
pub mod state;
pub mod storage;
pub mod validation;
pub mod webauthn;

pub use error::ClientError;
pub use state::ClientState;
