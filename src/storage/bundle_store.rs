// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential bundle persistence with expiry.
//!
//! Entries are stored as `{"value": ..., "expiry": <unix millis>}`. Expiry
//! is checked lazily on read; there is no background eviction. An entry that
//! is expired, unparseable or missing either field is removed on read and
//! reported as absent.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{LocalStorage, StorageResult};

/// Source of wall-clock time in unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_millis(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct StoredItem<'a> {
    value: &'a str,
    expiry: i64,
}

/// Expiring string store on top of a [`LocalStorage`] backend.
#[derive(Clone)]
pub struct CredentialBundleStore {
    storage: Arc<dyn LocalStorage>,
    clock: Arc<dyn Clock>,
}

impl CredentialBundleStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn LocalStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Store `value` under `key`, valid for `ttl` from now.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        let item = StoredItem {
            value,
            expiry: self.clock.now_millis().saturating_add(duration_millis(ttl)),
        };
        self.storage.set_item(key, &serde_json::to_string(&item)?)?;
        debug!(key, expiry = item.expiry, "stored expiring item");
        Ok(())
    }

    /// Read the value under `key` if it is present and not yet expired.
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };

        let Some((value, expiry)) = parse_item(&raw) else {
            warn!(key, "removing malformed storage entry");
            self.storage.remove_item(key)?;
            return Ok(None);
        };

        if self.clock.now_millis() > expiry {
            debug!(key, expiry, "removing expired storage entry");
            self.storage.remove_item(key)?;
            return Ok(None);
        }

        Ok(Some(value))
    }

    pub fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage.remove_item(key)
    }
}

fn parse_item(raw: &str) -> Option<(String, i64)> {
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let object = parsed.as_object()?;
    let value = object.get("value")?.as_str()?.to_string();
    let expiry = object.get("expiry")?.as_i64()?;
    Some((value, expiry))
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
