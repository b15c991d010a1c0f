//! Snapshot polling with caching and adaptive backoff.
//!
//! A [`PollingController`] owns one background task that keeps a single
//! `next_due` deadline. Every poll, whether it was triggered by the deadline
//! or by [`PollingController::refresh`], replaces that deadline, so there is
//! never more than one pending timer.
//!
//! ```text
//! Idle -> Loading -> Success -> (interval) -> Loading
//!                 \-> Error   -> (backoff)  -> Loading
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vermilinks_types::{RawPayload, Reading, UNKNOWN_DEVICE, is_live, merge, normalize};

use crate::error::Error;
use crate::policy::{Backoff, PollingPolicy};
use crate::source::SnapshotSource;
use crate::state::{PollStatus, SharedState};

/// What a single poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A snapshot was fetched. `None` means the backend had no reading.
    Fetched(Option<Reading>),
    /// The cached snapshot was served without a network call.
    Cached(Reading),
    /// The fetch failed with this user-facing message.
    Failed(String),
    /// The controller was stopped before the poll completed.
    Stopped,
}

impl PollOutcome {
    /// The reading this poll produced, if any.
    pub fn reading(&self) -> Option<&Reading> {
        match self {
            Self::Fetched(reading) => reading.as_ref(),
            Self::Cached(reading) => Some(reading),
            Self::Failed(_) | Self::Stopped => None,
        }
    }

    /// Whether a network call was made and succeeded.
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

enum Command {
    Refresh {
        force: bool,
        reply: oneshot::Sender<PollOutcome>,
    },
}

/// Handle to a running poll loop.
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct PollingController {
    commands: mpsc::Sender<Command>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollingController {
    /// Start polling `source` according to `policy`, writing into `state`.
    ///
    /// With `policy.immediate()` the first fetch happens right away and
    /// bypasses the cache; otherwise it waits one interval.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        source: Arc<dyn SnapshotSource>,
        policy: PollingPolicy,
        state: SharedState,
    ) -> Self {
        let (commands, rx) = mpsc::channel(8);
        let cancel_token = CancellationToken::new();

        info!(
            "Starting snapshot polling every {:?} (max {:?}, cache {:?})",
            policy.interval(),
            policy.max_interval(),
            policy.cache_ttl()
        );

        let worker = Worker::new(source, policy, state, cancel_token.clone());
        let handle = tokio::spawn(worker.run(rx));

        Self {
            commands,
            cancel_token,
            handle,
        }
    }

    /// Poll now.
    ///
    /// With `force`, the pending timer is replaced, backoff is reset and the
    /// cache is bypassed. Without it a fresh cached snapshot is served.
    /// Returns [`PollOutcome::Stopped`] once the controller is stopped.
    pub async fn refresh(&self, force: bool) -> PollOutcome {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Refresh { force, reply })
            .await
            .is_err()
        {
            return PollOutcome::Stopped;
        }
        rx.await.unwrap_or(PollOutcome::Stopped)
    }

    /// Stop polling and cancel the pending timer. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.cancel_token.is_cancelled() {
            debug!("Stopping snapshot polling");
        }
        self.cancel_token.cancel();
    }

    /// Whether the poll loop is still running.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct CachedSnapshot {
    reading: Reading,
    fetched_at: Instant,
    fetched_wall: OffsetDateTime,
}

struct Worker {
    source: Arc<dyn SnapshotSource>,
    policy: PollingPolicy,
    state: SharedState,
    cancel_token: CancellationToken,
    backoff: Backoff,
    cache: Option<CachedSnapshot>,
    next_due: Instant,
}

impl Worker {
    fn new(
        source: Arc<dyn SnapshotSource>,
        policy: PollingPolicy,
        state: SharedState,
        cancel_token: CancellationToken,
    ) -> Self {
        let backoff = policy.backoff();
        let next_due = Instant::now() + policy.interval();
        Self {
            source,
            policy,
            state,
            cancel_token,
            backoff,
            cache: None,
            next_due,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        if self.policy.immediate() {
            self.poll(true).await;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break,

                command = commands.recv() => match command {
                    Some(Command::Refresh { force, reply }) => {
                        let outcome = self.poll(force).await;
                        let _ = reply.send(outcome);
                    }
                    None => break,
                },

                _ = sleep_until(self.next_due) => {
                    self.poll(false).await;
                }
            }
        }

        self.state.update(|s| s.is_polling = false);
        debug!("Snapshot polling stopped");
    }

    async fn poll(&mut self, force: bool) -> PollOutcome {
        if self.cancel_token.is_cancelled() {
            return PollOutcome::Stopped;
        }
        if force {
            self.backoff.reset();
        }

        let now = Instant::now();
        if !force && let Some(outcome) = self.serve_cached(now) {
            return outcome;
        }

        self.state.update(|s| {
            s.is_polling = true;
            if force || s.status != PollStatus::Success {
                s.status = PollStatus::Loading;
            }
        });

        let fetch_timeout = self.policy.fetch_timeout();
        let fetch = timeout(
            fetch_timeout,
            self.source.fetch_latest(self.policy.device_id()),
        );
        let result = tokio::select! {
            _ = self.cancel_token.cancelled() => return PollOutcome::Stopped,
            result = fetch => result.unwrap_or_else(|_| Err(Error::timeout("fetch_latest", fetch_timeout))),
        };
        if self.cancel_token.is_cancelled() {
            return PollOutcome::Stopped;
        }

        match result {
            Ok(raw) => {
                self.backoff.reset();
                let outcome = self.apply_snapshot(&raw);
                self.next_due = Instant::now() + self.backoff.current();
                outcome
            }
            Err(e) => {
                let message = e.user_message();
                let delay = self.backoff.escalate();
                warn!("Snapshot fetch failed: {} (retrying in {:?})", e, delay);
                self.state.update(|s| {
                    s.is_polling = false;
                    s.status = PollStatus::Error;
                    s.last_error = Some(message.clone());
                });
                self.next_due = Instant::now() + delay;
                PollOutcome::Failed(message)
            }
        }
    }

    fn serve_cached(&mut self, now: Instant) -> Option<PollOutcome> {
        let cached = self.cache.as_ref()?;
        if now.duration_since(cached.fetched_at) > self.policy.cache_ttl() {
            return None;
        }

        let reading = cached.reading.clone();
        let fetched_wall = cached.fetched_wall;
        debug!("Serving cached snapshot for {}", reading.device_id);
        self.state.update(|s| {
            if !is_behind(&reading, s.latest.as_ref()) {
                s.connected = is_live(&reading);
                s.latest = Some(reading.clone());
                s.last_updated = Some(fetched_wall);
            }
            s.last_error = None;
            s.status = PollStatus::Success;
        });
        self.next_due = now + self.policy.interval();
        Some(PollOutcome::Cached(reading))
    }

    fn apply_snapshot(&mut self, raw: &serde_json::Value) -> PollOutcome {
        let payload = RawPayload::classify(raw);
        if payload.is_empty() {
            debug!("Snapshot empty, no current reading");
            self.cache = None;
            self.state.update(|s| {
                s.is_polling = false;
                s.latest = None;
                s.last_updated = None;
                s.last_error = None;
                s.connected = false;
                s.status = PollStatus::Idle;
            });
            return PollOutcome::Fetched(None);
        }

        let mut reading = normalize(&payload);
        if reading.device_id == UNKNOWN_DEVICE
            && let Some(id) = self.policy.device_id()
        {
            reading.device_id = id.to_string();
        }

        let live = is_live(&reading);
        let fetched_wall = OffsetDateTime::now_utc();
        debug!(
            "Fetched snapshot for {} (live: {})",
            reading.device_id, live
        );

        self.cache = Some(CachedSnapshot {
            reading: reading.clone(),
            fetched_at: Instant::now(),
            fetched_wall,
        });

        self.state.update(|s| {
            let repeat = s.history.iter().any(|r| r.is_same_sample(&reading));
            if !repeat {
                let merged = merge(&s.history, std::slice::from_ref(&reading));
                s.set_history(merged);
            }
            // A newer push reading stays current
            if !is_behind(&reading, s.latest.as_ref()) {
                s.connected = live;
                s.latest = Some(reading.clone());
            }
            s.is_polling = false;
            s.last_updated = Some(fetched_wall);
            s.last_error = None;
            s.status = PollStatus::Success;
        });
        PollOutcome::Fetched(Some(reading))
    }
}

/// Whether `reading` is an older sample of the device `current` describes.
///
/// Readings without a parsed timestamp are never behind.
fn is_behind(reading: &Reading, current: Option<&Reading>) -> bool {
    let Some(current) = current else {
        return false;
    };
    if current.device_id != reading.device_id {
        return false;
    }
    match (reading.instant(), current.instant()) {
        (Some(incoming), Some(latest)) => incoming < latest,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::mock::MockSnapshotSource;

    fn policy() -> PollingPolicy {
        PollingPolicy::builder()
            .interval(Duration::from_millis(5000))
            .max_interval(Duration::from_millis(60_000))
            .cache_ttl(Duration::from_millis(2000))
            .immediate(false)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fetches_and_updates_state() {
        let source = Arc::new(MockSnapshotSource::new());
        source.set_response(json!({
            "deviceId": "bin-1",
            "deviceOnline": true,
            "temperature": 24.1,
            "updated_at": "2024-01-01T00:00:00Z"
        }));
        let state = SharedState::new();
        let controller = PollingController::start(source.clone(), policy(), state.clone());

        let outcome = controller.refresh(false).await;
        assert!(outcome.is_fetched());
        assert_eq!(source.fetch_count(), 1);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, PollStatus::Success);
        assert!(snapshot.connected);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(
            snapshot.latest.as_ref().and_then(|r| r.temperature),
            Some(24.1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_snapshot_not_merged_twice() {
        let source = Arc::new(MockSnapshotSource::new());
        source.set_response(json!({
            "deviceId": "bin-1",
            "temperature": 24.1,
            "updated_at": "2024-01-01T00:00:00Z"
        }));
        let state = SharedState::new();
        let controller = PollingController::start(source.clone(), policy(), state.clone());

        controller.refresh(true).await;
        controller.refresh(true).await;
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(state.snapshot().history.len(), 1);
    }

    #[test]
    fn test_is_behind() {
        let latest = Reading::new("bin-1").at("2024-01-01T00:10:00Z");
        let older = Reading::new("bin-1").at("2024-01-01T00:00:00Z");

        assert!(is_behind(&older, Some(&latest)));
        assert!(!is_behind(&latest, Some(&older)));
        assert!(!is_behind(&latest, Some(&latest)));
        assert!(!is_behind(&older, None));
        assert!(!is_behind(&Reading::new("bin-1"), Some(&latest)));
        assert!(!is_behind(
            &Reading::new("bin-2").at("2024-01-01T00:00:00Z"),
            Some(&latest)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_device_falls_back_to_policy_device() {
        let source = Arc::new(MockSnapshotSource::new());
        source.set_response(json!({"data": {"temperature": 21.0, "updated_at": "2024-01-01T00:00:00Z"}}));
        let state = SharedState::new();
        let policy = PollingPolicy::builder()
            .device_id("bin-7")
            .immediate(false)
            .build();
        let controller = PollingController::start(source.clone(), policy, state.clone());

        let outcome = controller.refresh(true).await;
        assert_eq!(outcome.reading().map(|r| r.device_id.as_str()), Some("bin-7"));
        assert_eq!(source.last_device_id().as_deref(), Some("bin-7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let source = Arc::new(MockSnapshotSource::new());
        source.set_latency(Duration::from_secs(30));
        let state = SharedState::new();
        let policy = PollingPolicy::builder()
            .fetch_timeout(Duration::from_secs(1))
            .immediate(false)
            .build();
        let controller = PollingController::start(source, policy, state.clone());

        let outcome = controller.refresh(true).await;
        assert!(matches!(outcome, PollOutcome::Failed(ref m) if m.contains("timed out")));
        assert_eq!(state.snapshot().status, PollStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_unsubscribe_is_stopped() {
        let source = Arc::new(MockSnapshotSource::new());
        let state = SharedState::new();
        let controller = PollingController::start(source.clone(), policy(), state);

        controller.unsubscribe();
        controller.unsubscribe();
        tokio::task::yield_now().await;

        assert_eq!(controller.refresh(true).await, PollOutcome::Stopped);
        assert!(!controller.is_running());
        assert_eq!(source.fetch_count(), 0);
    }
}
