//! Social-media CDN source with an ordered fallback ladder
//!
//! The source holds a list of URL templates. `{path}` is replaced with the
//! logical path (without its leading `/`) and `{query}` with the cleaned request
//! query. Templates are tried in order; the first 2xx response wins and the
//! last failure is surfaced when every rung fails. Each attempt is bounded by
//! the shared client's timeout.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{FetchRequest, HttpClient, ImageSource};
use crate::error::{ConfigError, SourceFetchError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SocialSourceConfig {
    /// Named ladder: `facebook`, `facebook_graph`, `google`, `google_graph`
    #[serde(default)]
    pub preset: Option<String>,
    /// Explicit templates; override the preset when non-empty
    #[serde(default)]
    pub urls: Vec<String>,
}

/// URL templates of a named preset
pub fn preset_templates(name: &str) -> Option<Vec<String>> {
    let templates: &[&str] = match name {
        // Content CDN first, then the legacy form that keeps the query
        "facebook" => &[
            "https://scontent.xx.fbcdn.net/{path}",
            "https://scontent.xx.fbcdn.net/{path}?{query}",
        ],
        "facebook_graph" => &["https://graph.facebook.com/{path}?{query}"],
        "google" => &["https://image.google.com/{path}?{query}"],
        "google_graph" => &["https://lh3.googleusercontent.com/{path}?{query}"],
        _ => return None,
    };
    Some(templates.iter().map(|t| t.to_string()).collect())
}

pub struct SocialSource {
    client: HttpClient,
    templates: Vec<String>,
}

impl SocialSource {
    pub fn new(config: SocialSourceConfig, client: HttpClient) -> Result<Self, ConfigError> {
        let templates = if !config.urls.is_empty() {
            config.urls
        } else {
            let preset = config.preset.as_deref().ok_or_else(|| {
                ConfigError::Invalid("social source needs a preset or urls".to_string())
            })?;
            preset_templates(preset)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown social preset '{}'", preset)))?
        };
        Ok(Self { client, templates })
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }
}

/// Expand one template for a request
pub fn expand_template(template: &str, request: &FetchRequest) -> String {
    let url = template
        .replace("{path}", request.path.trim_start_matches('/'))
        .replace("{query}", &request.query);
    url.trim_end_matches(['?', '&']).to_string()
}

#[async_trait]
impl ImageSource for SocialSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, SourceFetchError> {
        let headers = HashMap::new();
        let mut last_error = SourceFetchError::InvalidPath(request.path.clone());

        for (rung, template) in self.templates.iter().enumerate() {
            let url = expand_template(template, request);
            match self.client.get(&url, &headers).await {
                Ok(bytes) => {
                    debug!(rung, url = %url, "Fetched from CDN");
                    return Ok(bytes);
                }
                Err(e) => {
                    debug!(rung, url = %url, error = %e, "CDN fetch failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
