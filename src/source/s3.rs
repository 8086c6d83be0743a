//! Object-store image source

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{FetchRequest, HttpClient, ImageSource};
use crate::constants::DEFAULT_S3_REGION;
use crate::error::{ConfigError, SourceFetchError};
use crate::s3::{canonical_uri, signed_get_headers, Credentials};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3SourceConfig {
    /// Empty credentials send unsigned requests (public buckets)
    #[serde(default, alias = "aws_access")]
    pub access_key: String,
    #[serde(default, alias = "aws_secret")]
    pub secret_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Fixed bucket; when unset the first path segment names the bucket
    #[serde(default)]
    pub bucket: Option<String>,
    /// Custom endpoint (MinIO, LocalStack); defaults to the AWS regional one
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    DEFAULT_S3_REGION.to_string()
}

/// Fetches objects with path-style, SigV4-signed GETs
#[derive(Debug, Clone)]
pub struct S3Source {
    client: HttpClient,
    endpoint: reqwest::Url,
    host: String,
    bucket: Option<String>,
    credentials: Option<Credentials>,
}

impl S3Source {
    pub fn new(config: S3SourceConfig, client: HttpClient) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let endpoint = reqwest::Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            ConfigError::Invalid(format!("invalid object-store endpoint '{}': {}", endpoint, e))
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ConfigError::Invalid(format!(
                    "object-store endpoint '{}' has no host",
                    endpoint
                )))
            }
        };

        let credentials = if config.access_key.is_empty() {
            None
        } else {
            if config.secret_key.is_empty() {
                return Err(ConfigError::Invalid(
                    "object-store secret key cannot be empty".to_string(),
                ));
            }
            Some(Credentials {
                access_key: config.access_key,
                secret_key: config.secret_key,
                region: config.region,
            })
        };

        Ok(Self {
            client,
            endpoint,
            host,
            bucket: config.bucket.filter(|b| !b.is_empty()),
            credentials,
        })
    }

    /// Split a logical path into bucket and key
    pub fn object_location(&self, path: &str) -> Result<(String, String), SourceFetchError> {
        let trimmed = path.trim_start_matches('/');
        let (bucket, key) = match &self.bucket {
            Some(bucket) => (bucket.as_str(), trimmed),
            None => trimmed
                .split_once('/')
                .ok_or_else(|| SourceFetchError::InvalidPath(path.to_string()))?,
        };
        if bucket.is_empty() || key.is_empty() {
            return Err(SourceFetchError::InvalidPath(path.to_string()));
        }
        Ok((bucket.to_string(), key.to_string()))
    }

    /// Fetch an object by logical path
    pub async fn get_object(&self, path: &str) -> Result<Bytes, SourceFetchError> {
        let (bucket, key) = self.object_location(path)?;
        let uri = canonical_uri(&format!(
            "{}/{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            bucket,
            key
        ));
        let url = format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.host,
            uri
        );

        let headers = match &self.credentials {
            Some(credentials) => signed_get_headers(credentials, &self.host, &uri, Utc::now())
                .map_err(|e| SourceFetchError::Request(format!("failed to sign request: {}", e)))?,
            None => HashMap::new(),
        };

        debug!(bucket = %bucket, key = %key, "Fetching object");
        self.client.get(&url, &headers).await
    }
}

#[async_trait]
impl ImageSource for S3Source {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, SourceFetchError> {
        self.get_object(&request.path).await
    }
}
