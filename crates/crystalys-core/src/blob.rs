//! Bulk download channel for replay and metadata artifacts

use async_trait::async_trait;

#[cfg(feature = "http")]
use crate::errors::{CrystalysError, CrystalysResult};

// ----------------------------------------------------------------------------
// Blob Store Trait
// ----------------------------------------------------------------------------

/// Transfer failures reported by a [`BlobStore`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("server answered with status {status}")]
    Status { status: u16 },
    #[error("artifact not found")]
    NotFound,
    #[error("request failed: {reason}")]
    Request { reason: String },
    #[error("transfer timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Fetches the raw bytes behind an artifact URL
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError>;
}

// ----------------------------------------------------------------------------
// HTTP Blob Store
// ----------------------------------------------------------------------------

/// Plain HTTP GET blob store
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    timeout: core::time::Duration,
}

#[cfg(feature = "http")]
impl HttpBlobStore {
    pub fn new(timeout: core::time::Duration) -> CrystalysResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrystalysError::config_error(format!("HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        tracing::debug!(url, "Fetching artifact");

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                BlobError::Timeout {
                    duration_ms: self.timeout.as_millis() as u64,
                }
            } else {
                BlobError::Request {
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(map_err)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound);
        }
        if !status.is_success() {
            return Err(BlobError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_err)?;
        tracing::debug!(url, bytes = body.len(), "Fetched artifact");
        Ok(body.to_vec())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn test_http_store_builds() {
        assert!(HttpBlobStore::new(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let store = HttpBlobStore::new(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback refuses connections
        let result = store.fetch("http://127.0.0.1:9/570/1_1.dem.bz2").await;
        assert!(matches!(
            result,
            Err(BlobError::Request { .. }) | Err(BlobError::Timeout { .. })
        ));
    }
}
