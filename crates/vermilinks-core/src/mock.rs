//! Mock snapshot source for testing.
//!
//! [`MockSnapshotSource`] implements [`SnapshotSource`] without a network so
//! the polling controller and engine can be driven deterministically.
//!
//! # Features
//!
//! - **Scripted responses**: queue results that are returned in order
//! - **Failure injection**: fail the next N fetches, or every fetch
//! - **Latency simulation**: delay each fetch (works with paused Tokio time)
//! - **Call inspection**: count fetches and record the requested device id

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::source::SnapshotSource;

/// A scripted snapshot source.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use vermilinks_core::{MockSnapshotSource, SnapshotSource};
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSnapshotSource::new();
///     source.set_response(json!({"deviceId": "bin-1", "temperature": 22.0}));
///     source.fail_next(1);
///
///     assert!(source.fetch_latest(None).await.is_err());
///     assert!(source.fetch_latest(None).await.is_ok());
///     assert_eq!(source.fetch_count(), 2);
/// }
/// ```
pub struct MockSnapshotSource {
    response: Mutex<Value>,
    script: Mutex<VecDeque<Result<Value>>>,
    last_device_id: Mutex<Option<String>>,
    fetch_count: AtomicU32,
    should_fail: AtomicBool,
    fail_message: Mutex<String>,
    remaining_failures: AtomicU32,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockSnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSnapshotSource")
            .field("fetch_count", &self.fetch_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockSnapshotSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSnapshotSource {
    /// Create a source that answers every fetch with `null`.
    pub fn new() -> Self {
        Self {
            response: Mutex::new(Value::Null),
            script: Mutex::new(VecDeque::new()),
            last_device_id: Mutex::new(None),
            fetch_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_message: Mutex::new("Mock failure".to_string()),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Set the default response returned when the script is empty.
    pub fn set_response(&self, value: Value) {
        if let Ok(mut response) = self.response.lock() {
            *response = value;
        }
    }

    /// Queue a response to be returned before the default.
    pub fn push_response(&self, value: Value) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(value));
        }
    }

    /// Queue an error to be returned before the default.
    pub fn push_error(&self, error: Error) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// Make every fetch fail.
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let (Some(msg), Ok(mut current)) = (message, self.fail_message.lock()) {
            *current = msg.to_string();
        }
    }

    /// Make the next `count` fetches fail, then succeed.
    pub fn fail_next(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of fetches made so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Reset the fetch counter.
    pub fn reset_fetch_count(&self) {
        self.fetch_count.store(0, Ordering::Relaxed);
    }

    /// Device id passed to the most recent fetch.
    pub fn last_device_id(&self) -> Option<String> {
        self.last_device_id
            .lock()
            .ok()
            .and_then(|id| id.clone())
    }

    fn injected_failure(&self) -> Option<Error> {
        let remaining = self.remaining_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining_failures
                .store(remaining - 1, Ordering::Relaxed);
            return Some(self.failure());
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Some(self.failure());
        }
        None
    }

    fn failure(&self) -> Error {
        let message = self
            .fail_message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|_| "Mock failure".to_string());
        Error::transport("mock://snapshot", message)
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshotSource {
    async fn fetch_latest(&self, device_id: Option<&str>) -> Result<Value> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_device_id.lock() {
            *last = device_id.map(String::from);
        }

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(error) = self.injected_failure() {
            return Err(error);
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(self
                .response
                .lock()
                .map(|r| r.clone())
                .unwrap_or(Value::Null)),
        }
    }
}
