//! Source registry
//!
//! Maps a source name to a typed factory. Each factory declares the config
//! shape it accepts as a `Deserialize` type; the registry decodes the route's
//! raw `source_config` into that shape before invoking it. A factory that
//! does not take exactly one config and return an [`ImageSource`] does not
//! type-check against [`SourceRegistry::register`].

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    HttpClient, ImageSource, PreviewSource, PreviewSourceConfig, S3Source, S3SourceConfig,
    SocialSource, SocialSourceConfig,
};
use crate::error::ConfigError;

type Factory =
    Box<dyn Fn(serde_json::Value, &HttpClient) -> Result<Arc<dyn ImageSource>, ConfigError> + Send + Sync>;

/// Registry of source factories, read-only once the server starts
pub struct SourceRegistry {
    factories: HashMap<String, Factory>,
    client: HttpClient,
}

impl SourceRegistry {
    /// Create an empty registry whose sources share `client`
    pub fn new(client: HttpClient) -> Self {
        Self {
            factories: HashMap::new(),
            client,
        }
    }

    /// Registry with `s3`, `s3_preview` and `social` registered
    pub fn with_builtin_sources(client: HttpClient) -> Self {
        let mut registry = Self::new(client);
        registry.register("s3", |config: S3SourceConfig, client: &HttpClient| {
            S3Source::new(config, client.clone())
        });
        registry.register(
            "s3_preview",
            |config: PreviewSourceConfig, client: &HttpClient| {
                PreviewSource::from_config(config, client.clone())
            },
        );
        registry.register("social", |config: SocialSourceConfig, client: &HttpClient| {
            SocialSource::new(config, client.clone())
        });
        registry
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<C, S, F>(&mut self, name: &str, factory: F)
    where
        C: DeserializeOwned + 'static,
        S: ImageSource + 'static,
        F: Fn(C, &HttpClient) -> Result<S, ConfigError> + Send + Sync + 'static,
    {
        let source_name = name.to_string();
        let erased: Factory = Box::new(move |raw, client| {
            let raw = if raw.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                raw
            };
            let config: C =
                serde_json::from_value(raw).map_err(|e| ConfigError::InvalidSourceConfig {
                    source_name: source_name.clone(),
                    expected: std::any::type_name::<C>(),
                    message: e.to_string(),
                })?;
            let source = factory(config, client)?;
            Ok(Arc::new(source) as Arc<dyn ImageSource>)
        });
        self.factories.insert(name.to_string(), erased);
    }

    /// Build the source registered under `name` from its raw config
    pub fn resolve(
        &self,
        name: &str,
        raw_config: serde_json::Value,
    ) -> Result<Arc<dyn ImageSource>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))?;
        factory(raw_config, &self.client)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
