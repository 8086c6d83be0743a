// Router module
//
// Maps a request path onto a configured route: the first path segment
// selects the route, the rest (optionally rewritten) is the logical path
// handed to the route's image source.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tracing::{error, info};

use crate::cache::CachePolicy;
use crate::config::{Config, RouteConfig};
use crate::constants::DEFAULT_ALLOWED_EXTENSIONS;
use crate::error::ConfigError;
use crate::source::{ImageSource, SourceRegistry};
use crate::transform::RouteDefaults;

/// A route ready to serve requests
pub struct Route {
    name: String,
    prefix: String,
    source: Arc<dyn ImageSource>,
    defaults: RouteDefaults,
    cache_policy: CachePolicy,
    cache_path: String,
    error_image: Option<PathBuf>,
    verification_required: bool,
    allowed_extensions: Vec<String>,
    rewrite: Option<(Regex, String)>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("cache_policy", &self.cache_policy)
            .field("cache_path", &self.cache_path)
            .field("verification_required", &self.verification_required)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Compile a route around an already resolved source
    pub fn new(config: &RouteConfig, source: Arc<dyn ImageSource>) -> Result<Self, ConfigError> {
        let rewrite = match &config.rewrite {
            Some(rule) => {
                let regex = Regex::new(&rule.pattern).map_err(|e| ConfigError::InvalidRewrite {
                    pattern: rule.pattern.clone(),
                    message: e.to_string(),
                })?;
                Some((regex, rule.replace.clone()))
            }
            None => None,
        };

        let allowed_extensions = if config.allowed_formats.is_empty() {
            DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect()
        } else {
            config
                .allowed_formats
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect()
        };

        Ok(Self {
            name: config.name.clone(),
            prefix: config.prefix().to_string(),
            source,
            defaults: config.defaults(),
            cache_policy: config.cache_policy(),
            cache_path: config.cache_path.clone(),
            error_image: config.error_image.clone(),
            verification_required: config.verification_required,
            allowed_extensions,
            rewrite,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn source(&self) -> &Arc<dyn ImageSource> {
        &self.source
    }

    pub fn defaults(&self) -> &RouteDefaults {
        &self.defaults
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn cache_path(&self) -> &str {
        &self.cache_path
    }

    pub fn error_image(&self) -> Option<&PathBuf> {
        self.error_image.as_ref()
    }

    pub fn verification_required(&self) -> bool {
        self.verification_required
    }

    /// Logical path for a request path already matched to this route.
    ///
    /// With a rewrite rule the whole request path is rewritten; otherwise
    /// the route prefix is stripped.
    pub fn logical_path(&self, request_path: &str) -> String {
        if let Some((regex, replace)) = &self.rewrite {
            if regex.is_match(request_path) {
                return regex.replace(request_path, replace.as_str()).into_owned();
            }
        }

        let rest = request_path
            .trim_start_matches('/')
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(request_path);
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }

    /// Whether the last segment of `logical_path` may be served.
    ///
    /// An empty filename is rejected; a name without extension is accepted.
    pub fn is_allowed(&self, logical_path: &str) -> bool {
        let filename = logical_path.rsplit('/').next().unwrap_or_default();
        if filename.is_empty() {
            return false;
        }
        match extension_of(filename) {
            None => true,
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
        }
    }
}

/// Extension of a file name including the dot, if any
fn extension_of(filename: &str) -> Option<&str> {
    match filename.rfind('.') {
        Some(idx) if idx + 1 < filename.len() => Some(&filename[idx..]),
        _ => None,
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    format!(".{}", ext)
}

/// Route table keyed by prefix
#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<String, Arc<Route>>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| (route.prefix.clone(), Arc::new(route)))
            .collect();
        Router { routes }
    }

    /// Build every configured route, skipping those whose source or rewrite
    /// rule cannot be constructed
    pub fn from_config(config: &Config, registry: &SourceRegistry) -> Self {
        let mut routes = Vec::with_capacity(config.routes.len());
        for route_config in &config.routes {
            let built = registry
                .resolve(&route_config.source, route_config.source_config.clone())
                .and_then(|source| Route::new(route_config, source));
            match built {
                Ok(route) => {
                    info!(
                        route = %route.name,
                        prefix = %route.prefix,
                        source = %route_config.source,
                        "Registered route"
                    );
                    routes.push(route);
                }
                Err(e) => {
                    error!(route = %route_config.name, error = %e, "Skipping route");
                }
            }
        }
        Router::new(routes)
    }

    /// Route owning the first segment of `path`
    pub fn route(&self, path: &str) -> Option<Arc<Route>> {
        let trimmed = path.trim_start_matches('/');
        let (segment, rest) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, ""),
        };
        // `/prefix` alone carries no image
        if rest.is_empty() {
            return None;
        }
        self.routes.get(segment).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Replace every `?` after the first with `&`
pub fn clean_query(query: &str) -> String {
    query.replace('?', "&")
}

/// Decode a raw query string into a parameter map; the first occurrence of a
/// repeated key wins
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let cleaned = clean_query(query);
    let mut params = HashMap::new();
    for pair in cleaned.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }
        params.entry(key).or_insert_with(|| decode_component(value));
    }
    params
}

/// Cleaned query with every `name` parameter removed, for forwarding upstream
pub fn strip_param(query: &str, name: &str) -> String {
    clean_query(query)
        .split('&')
        .filter(|pair| {
            !pair.is_empty() && decode_component(pair.split_once('=').map_or(*pair, |(k, _)| k)) != name
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}
