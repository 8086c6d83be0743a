// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cache::CachePolicy;
use crate::constants::{
    DEFAULT_ADDRESS, DEFAULT_CACHE_PATH, DEFAULT_CACHE_TIME_SECS, DEFAULT_CACHE_WRITERS,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_QUALITY,
};
use crate::transform::{OutputFormat, RouteDefaults};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout of the shared outbound HTTP client
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Size of the background cache-write pool
    #[serde(default = "default_cache_writers")]
    pub cache_writers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_writers: default_cache_writers(),
        }
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_cache_writers() -> usize {
    DEFAULT_CACHE_WRITERS
}

/// Token verification settings; exactly one key source is expected
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HS256 shared secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// RS256 public key (PEM) on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_public_key_path: Option<PathBuf>,
}

/// Regex rewrite applied to the logical path before source lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewriteRule {
    #[serde(rename = "match")]
    pub pattern: String,
    pub replace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    /// URL prefix; the route name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Registered source name
    #[serde(default = "default_source")]
    pub source: String,
    /// Opaque per-source payload decoded by the source factory
    #[serde(default)]
    pub source_config: serde_json::Value,
    /// Accepted input extensions (".jpg", ...); empty means the built-in list
    #[serde(default)]
    pub allowed_formats: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    /// Seconds; 0 never expires, negative disables caching
    #[serde(default = "default_cache_time")]
    pub cache_time: i64,
    #[serde(default)]
    pub default_width: u32,
    #[serde(default)]
    pub default_height: u32,
    #[serde(default = "default_quality")]
    pub default_quality: u8,
    #[serde(default)]
    pub default_dont_crop: bool,
    #[serde(default)]
    pub default_feature_crop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_quality: Option<u8>,
    #[serde(default)]
    pub verification_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteRule>,
}

fn default_source() -> String {
    "s3".to_string()
}

fn default_cache_path() -> String {
    DEFAULT_CACHE_PATH.to_string()
}

fn default_cache_time() -> i64 {
    DEFAULT_CACHE_TIME_SECS
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

impl RouteConfig {
    /// Create a route with every optional setting at its default
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            source: source.into(),
            source_config: serde_json::Value::Null,
            allowed_formats: Vec::new(),
            error_image: None,
            output_format: None,
            cache_path: default_cache_path(),
            cache_time: default_cache_time(),
            default_width: 0,
            default_height: 0,
            default_quality: default_quality(),
            default_dont_crop: false,
            default_feature_crop: false,
            wifi_quality: None,
            verification_required: false,
            rewrite: None,
        }
    }

    /// URL prefix without surrounding slashes
    pub fn prefix(&self) -> &str {
        self.prefix
            .as_deref()
            .filter(|p| !p.trim_matches('/').is_empty())
            .unwrap_or(&self.name)
            .trim_matches('/')
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::from_secs(self.cache_time)
    }

    /// Transform defaults handed to the format resolver
    pub fn defaults(&self) -> RouteDefaults {
        RouteDefaults {
            width: self.default_width,
            height: self.default_height,
            quality: self.default_quality,
            dont_crop: self.default_dont_crop,
            feature_crop: self.default_feature_crop,
            wifi_quality: self.wifi_quality,
            output_format: self
                .output_format
                .as_deref()
                .and_then(OutputFormat::from_extension),
        }
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        let config: Config = serde_yaml::from_str(&substituted).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen_prefixes = HashSet::new();

        for route in &self.routes {
            if route.name.is_empty() {
                return Err("Route name cannot be empty".to_string());
            }

            let prefix = route.prefix();
            if prefix == crate::constants::ALIVE_PATH.trim_start_matches('/') {
                return Err(format!(
                    "Route '{}' uses the reserved prefix '{}'",
                    route.name, prefix
                ));
            }
            if prefix.contains('/') {
                return Err(format!(
                    "Route '{}' prefix '{}' must be a single path segment",
                    route.name, prefix
                ));
            }
            if !seen_prefixes.insert(prefix.to_string()) {
                return Err(format!(
                    "Duplicate prefix '{}' (route '{}')",
                    prefix, route.name
                ));
            }

            if !(1..=100).contains(&route.default_quality) {
                return Err(format!(
                    "Route '{}' default_quality must be 1-100, got {}",
                    route.name, route.default_quality
                ));
            }
            if let Some(wifi) = route.wifi_quality {
                if wifi > 100 {
                    return Err(format!(
                        "Route '{}' wifi_quality must be 0-100, got {}",
                        route.name, wifi
                    ));
                }
            }

            if let Some(format) = &route.output_format {
                if OutputFormat::from_extension(format).is_none() {
                    return Err(format!(
                        "Route '{}' has unsupported output_format '{}'",
                        route.name, format
                    ));
                }
            }

            if let Some(rewrite) = &route.rewrite {
                Regex::new(&rewrite.pattern).map_err(|e| {
                    format!(
                        "Route '{}' has invalid rewrite pattern '{}': {}",
                        route.name, rewrite.pattern, e
                    )
                })?;
            }
        }

        Ok(())
    }
}
