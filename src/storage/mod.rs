// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Local Storage Module
//!
//! Client-side key/value persistence, the counterpart of a browser's
//! `localStorage`. Values are strings; callers layer their own encoding on
//! top (see [`CredentialBundleStore`]).
//!
//! ## Backends
//!
//! - [`MemoryStorage`] - process-local, used by tests and one-shot flows
//! - [`FileStorage`] - one JSON file per key under a data directory
//!
//! ## Storage Layout (file backend)
//!
//! ```text
//! {DATA_DIR}/
//!   AUTH_BUNDLE.json        # credential bundle + expiry
//!   SESSION_COOKIE.json     # backend session cookie
//!   SOFTWARE_PASSKEYS.json  # development passkeys (software authenticator only)
//! ```

pub mod bundle_store;
pub mod file;

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

pub use bundle_store::{Clock, CredentialBundleStore, ManualClock, SystemClock};
pub use file::FileStorage;

/// Error type for local storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations
    Io(io::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// Key contains characters that cannot be used as a file name
    InvalidKey(String),
    /// Internal lock was poisoned by a panicking writer
    Poisoned,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Json(e) => write!(f, "JSON error: {e}"),
            StorageError::InvalidKey(key) => write!(f, "Invalid storage key: {key}"),
            StorageError::Poisoned => write!(f, "Storage lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Json(e)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store.
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.remove(key);
        Ok(())
    }
}
