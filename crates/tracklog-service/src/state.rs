//! Application state shared across tasks.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracklog_store::Store;

use crate::config::Config;

/// Shared application state.
///
/// Two tasks touch the store: the MQTT ingestion loop (appends) and the
/// backup scheduler (snapshots). The mutex serializes access to the single
/// connection; snapshot consistency itself comes from SQLite's online backup,
/// not from this lock.
///
/// The store sits inside an `Option` so shutdown can actually close it: after
/// [`AppState::close_store`] takes it out, a late append observes a closed
/// store and fails instead of silently succeeding.
pub struct AppState {
    /// The data store; `None` once closed.
    pub store: Mutex<Option<Store>>,
    /// Service configuration.
    pub config: Config,
    /// Shutdown signal shared by all background tasks.
    pub shutdown: Shutdown,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Some(store)),
            config,
            shutdown: Shutdown::new(),
        })
    }

    /// Close the store, releasing the database handle.
    ///
    /// Idempotent: closing an already-closed store is a no-op.
    pub async fn close_store(&self) -> tracklog_store::Result<()> {
        let mut guard = self.store.lock().await;
        match guard.take() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }
}

/// Shutdown signal fanned out to background tasks.
///
/// A `watch` channel carrying a single flag: tasks subscribe and race their
/// work against `changed()`. Triggering is sticky; late subscribers observe
/// the flag immediately.
pub struct Shutdown {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown signal.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self { stop_tx, stop_rx }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal all tasks to stop.
    pub fn trigger(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Check whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.stop_rx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_store_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default());

        state.close_store().await.unwrap();
        state.close_store().await.unwrap();

        assert!(state.store.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let rx = shutdown.subscribe();
        assert!(*rx.borrow());
    }
}
