//! HTTP client for the VermiLinks snapshot endpoint.
//!
//! # Example
//!
//! ```no_run
//! use vermilinks_core::client::SnapshotClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SnapshotClient::new("http://localhost:5000")?;
//! let raw = client.latest(Some("vermilinks-esp32-a")).await?;
//! println!("{raw}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::source::SnapshotSource;

/// Path of the latest-snapshot endpoint, relative to the base URL.
pub const LATEST_PATH: &str = "/api/sensors/latest";

/// HTTP client for the latest-snapshot endpoint.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SnapshotClient {
    /// Create a new snapshot client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The backend base URL (e.g., "http://localhost:5000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(base_url, client, timeout)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the latest-snapshot endpoint.
    pub fn latest_url(&self) -> String {
        format!("{}{}", self.base_url, LATEST_PATH)
    }

    /// Fetch the latest snapshot body.
    pub async fn latest(&self, device_id: Option<&str>) -> Result<Value> {
        let url = self.latest_url();
        let mut request = self.client.get(&url);
        if let Some(id) = device_id {
            request = request.query(&[("deviceId", id)]);
        }
        debug!("GET {} (device: {:?})", url, device_id);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout("fetch_latest", self.timeout)
            } else {
                Error::transport(&url, e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout("fetch_latest", self.timeout)
            } else {
                Error::transport(&url, e.to_string())
            }
        })?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(Error::api(status.as_u16(), message));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl SnapshotSource for SnapshotClient {
    async fn fetch_latest(&self, device_id: Option<&str>) -> Result<Value> {
        self.latest(device_id).await
    }
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::InvalidUrl(format!(
            "URL must start with http:// or https://, got: {}",
            base_url
        )));
    }
    Ok(base_url)
}

/// Pull a human-readable message out of an error body.
///
/// The backend uses `message`; some proxies use `error`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|message| !message.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SnapshotClient::new("http://localhost:5000");
        assert!(client.is_ok());

        let client = client.unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.latest_url(), "http://localhost:5000/api/sensors/latest");
    }

    #[test]
    fn test_client_normalizes_url() {
        let client = SnapshotClient::new("https://vermilinks.example/ ").unwrap();
        assert_eq!(client.base_url(), "https://vermilinks.example");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = SnapshotClient::new("localhost:5000");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"success":false,"message":"Device not found"}"#),
            Some("Device not found".to_string())
        );
        assert_eq!(
            error_message(r#"{"error":"Bad gateway"}"#),
            Some("Bad gateway".to_string())
        );
        assert_eq!(error_message("<html>oops</html>"), None);
        assert_eq!(error_message(r#"{"message":""}"#), None);
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        // Port 9 (discard) is almost never listening on loopback.
        let client =
            SnapshotClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.latest(None).await.unwrap_err();
        assert!(err.is_fetch_failure());
    }
}
