//! Shared synchronization state.
//!
//! The polling controller and the realtime bridge both write to one
//! [`SharedState`]; consumers observe it through a `watch` channel. Writes
//! after [`SharedState::close`] are dropped so that responses arriving after
//! teardown never touch state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

use vermilinks_types::Reading;

/// Lifecycle of the most recent poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    /// Nothing fetched yet, or the last fetch returned nothing.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The last poll produced a reading.
    Success,
    /// The last fetch failed.
    Error,
}

/// Point-in-time view of everything the dashboard renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Most recent reading from either source.
    pub latest: Option<Reading>,
    /// Sorted, bounded reading history.
    pub history: Arc<Vec<Reading>>,
    /// Whether the device is considered connected.
    pub connected: bool,
    /// Whether the push channel is up. Independent of `connected`.
    pub transport_up: bool,
    /// When `latest` was last refreshed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    /// Message from the most recent failed fetch.
    pub last_error: Option<String>,
    /// Status of the most recent poll.
    pub status: PollStatus,
    /// Whether a fetch is in flight.
    pub is_polling: bool,
}

impl SyncSnapshot {
    /// Replace the history, keeping the shared allocation when unchanged.
    pub fn set_history(&mut self, history: Vec<Reading>) {
        if *self.history != history {
            self.history = Arc::new(history);
        }
    }
}

/// Handle to the shared state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SharedState {
    tx: Arc<watch::Sender<SyncSnapshot>>,
    alive: Arc<AtomicBool>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create an empty, open state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SyncSnapshot::default());
        Self {
            tx: Arc::new(tx),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.tx.subscribe()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.tx.borrow().clone()
    }

    /// Whether writes are still accepted.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop accepting writes. Idempotent.
    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Apply `f` to the state and notify watchers if anything changed.
    ///
    /// Returns `false` without calling `f` once the state is closed.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut SyncSnapshot),
    {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            // Checked under the watch lock so a concurrent close() cannot race
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            applied = true;
            let before = state.clone();
            f(state);
            *state != before
        });
        applied
    }
}
