//! Snapshot source abstraction.
//!
//! The polling controller only needs one thing from the backend: the latest
//! raw snapshot payload. [`SnapshotSource`] lets the HTTP client and the mock
//! source be swapped freely.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Something that can fetch the latest telemetry snapshot.
///
/// Implementations return the raw JSON body; classification and
/// normalization happen in the controller. A `Null` or empty body means the
/// backend has nothing to report.
///
/// # Example
///
/// ```ignore
/// use vermilinks_core::{Result, SnapshotSource};
///
/// async fn peek<S: SnapshotSource>(source: &S) -> Result<()> {
///     let raw = source.fetch_latest(Some("bin-1")).await?;
///     println!("{raw}");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the latest snapshot, optionally for one device.
    async fn fetch_latest(&self, device_id: Option<&str>) -> Result<Value>;
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn fetch_latest(&self, device_id: Option<&str>) -> Result<Value> {
        (**self).fetch_latest(device_id).await
    }
}
