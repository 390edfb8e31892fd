// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Periodic Refetch
//!
//! Background task that refetches a resource at a fixed interval and
//! publishes the latest value through a [`PollHandle`].
//!
//! ## Strategy
//!
//! Every `interval` the poller:
//! 1. Runs the fetch once.
//! 2. Publishes the value on success. On failure the previous value stays
//!    and the error is logged.
//!
//! Fetches run one after another, so the last completed fetch wins.
//!
//! ## Shutdown
//!
//! Dropping or cancelling the handle triggers a
//! `tokio_util::sync::CancellationToken`. A fetch still in flight at that
//! point is abandoned and its result never published.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::api::{BackendClient, Transfer, WalletInfo};
use crate::config::{HISTORY_POLL_INTERVAL, WALLET_POLL_INTERVAL};

/// Fixed-interval refetch of one resource.
pub struct Poller<F> {
    name: &'static str,
    interval: Duration,
    fetch: F,
}

impl<F, Fut, T, E> Poller<F>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + Sync + 'static,
    E: Display + Send + 'static,
{
    pub fn new(name: &'static str, interval: Duration, fetch: F) -> Self {
        Self {
            name,
            interval,
            fetch,
        }
    }

    /// Start polling on the current runtime.
    pub fn spawn(self) -> PollHandle<T> {
        let shutdown = CancellationToken::new();
        let (latest, rx) = watch::channel(None);
        tokio::spawn(self.run(latest, shutdown.clone()));

        PollHandle {
            latest: rx,
            shutdown: shutdown.clone(),
            _guard: shutdown.drop_guard(),
        }
    }

    async fn run(self, latest: watch::Sender<Option<T>>, shutdown: CancellationToken) {
        info!(
            poller = self.name,
            interval_ms = self.interval.as_millis() as u64,
            "Poller starting"
        );

        loop {
            tokio::select! {
                result = (self.fetch)() => self.publish(&latest, result),
                _ = shutdown.cancelled() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!(poller = self.name, "Poller shutting down");
    }

    fn publish(&self, latest: &watch::Sender<Option<T>>, result: Result<T, E>) {
        match result {
            Ok(value) => {
                latest.send_replace(Some(value));
                debug!(poller = self.name, "Poller refreshed");
            }
            Err(e) => {
                warn!(poller = self.name, error = %e, "Poller fetch failed");
            }
        }
    }
}

/// Owner side of a running [`Poller`]. Dropping it stops the poller.
pub struct PollHandle<T> {
    latest: watch::Receiver<Option<T>>,
    shutdown: CancellationToken,
    _guard: DropGuard,
}

impl<T: Clone> PollHandle<T> {
    /// Most recent successful value.
    pub fn latest(&self) -> Option<T> {
        self.latest.borrow().clone()
    }

    /// Wait for the next published value. `None` once the poller stopped.
    pub async fn next(&mut self) -> Option<T> {
        self.latest.changed().await.ok()?;
        self.latest.borrow_and_update().clone()
    }
}

impl<T> PollHandle<T> {
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Refetch wallet info every 5 s.
pub fn watch_wallet(api: BackendClient) -> PollHandle<WalletInfo> {
    Poller::new("wallet", WALLET_POLL_INTERVAL, move || {
        let api = api.clone();
        async move { api.wallet().await }
    })
    .spawn()
}

/// Refetch wallet history every 10 s.
pub fn watch_history(api: BackendClient) -> PollHandle<Vec<Transfer>> {
    Poller::new("history", HISTORY_POLL_INTERVAL, move || {
        let api = api.clone();
        async move { api.history().await }
    })
    .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(interval: Duration, delay: Duration) -> (Arc<AtomicU32>, PollHandle<u32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let handle = Poller::new("test", interval, move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst) + 1)
            }
        })
        .spawn();
        (calls, handle)
    }

    #[tokio::test]
    async fn publishes_successive_values() {
        let (_, mut handle) = counting(Duration::from_millis(10), Duration::ZERO);

        let first = handle.next().await.unwrap();
        let second = handle.next().await.unwrap();
        assert!(second > first);
        assert_eq!(handle.latest(), Some(second));
    }

    #[tokio::test]
    async fn dropping_handle_stops_polling() {
        let (calls, mut handle) = counting(Duration::from_millis(10), Duration::ZERO);
        handle.next().await.unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn cancelled_in_flight_fetch_is_discarded() {
        let (calls, mut handle) = counting(Duration::from_millis(10), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.latest(), None);
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn failures_keep_previous_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut handle = Poller::new("flaky", Duration::from_millis(5), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok("first")
                } else {
                    Err("backend down")
                }
            }
        })
        .spawn();

        assert_eq!(handle.next().await, Some("first"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(calls.load(Ordering::SeqCst) > 1);
        assert_eq!(handle.latest(), Some("first"));
    }
}
