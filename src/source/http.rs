//! Shared outbound HTTP client

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, SourceFetchError};

/// Outbound client shared by every source.
///
/// Built once at startup with a fixed timeout and handed to sources at
/// construction time. Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the client cannot be created
    /// (e.g., TLS backend initialization failure).
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { inner, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body of a 2xx response
    pub async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Bytes, SourceFetchError> {
        let mut request = self.inner.get(url);
        for (name, value) in headers {
            // reqwest derives Host from the URL
            if name.eq_ignore_ascii_case("host") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "Upstream returned non-success status");
            return Err(SourceFetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
