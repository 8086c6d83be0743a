// Request pipeline module - request context and the per-request state machine
//
// Start -> CacheCheck -> {Serve(cached) | Fetch} -> {Transform | ErrorImage}
//       -> {Serve(generated) + cache write | ErrorImage} -> Serve(404)

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{extract_query_token, AuthVerifier, TOKEN_PARAM};
use crate::cache::{CacheKey, CacheLookup, ResultCache};
use crate::constants::MIN_CACHEABLE_BYTES;
use crate::observability::{RequestEvent, ResultType, TelemetrySink};
use crate::router::{parse_query, strip_param, Route, Router};
use crate::source::FetchRequest;
use crate::transform::{resolve, TransformEngine, TransformSpec};

/// Request context that holds all information about an HTTP request
/// as it flows through the pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    path: String,
    query: String,
    query_params: HashMap<String, String>,
    start_time: DateTime<Utc>,
}

impl RequestContext {
    /// Generates a unique request ID (UUID v4) and captures the start time.
    /// `query` is the raw query string without the leading `?`.
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            request_id: Uuid::new_v4().to_string(),
            path: path.into(),
            query_params: parse_query(&query),
            query,
            start_time: Utc::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Path plus query, as reported to telemetry
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// What the HTTP layer writes back
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
    pub content_type: Option<&'static str>,
    pub result: ResultType,
}

impl Response {
    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: Bytes::new(),
            content_type: None,
            result: ResultType::Generated,
        }
    }
}

/// A request matched to a route, with its spec resolved
struct Prepared {
    route: Arc<Route>,
    fetch: FetchRequest,
    spec: TransformSpec,
    cache_key: Option<CacheKey>,
}

enum State {
    CacheCheck(Prepared),
    Fetch(Prepared),
    Transform(Prepared, Bytes),
    ErrorImage(Arc<Route>, TransformSpec),
    Serve(Response),
}

/// Orchestrates one image request from route match to response.
///
/// Fetch and transform failures never escape: they degrade to the route's
/// error image or an empty 404.
pub struct RequestPipeline {
    router: Router,
    cache: Arc<ResultCache>,
    engine: TransformEngine,
    verifier: Option<Arc<dyn AuthVerifier>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RequestPipeline {
    pub fn new(
        router: Router,
        cache: Arc<ResultCache>,
        verifier: Option<Arc<dyn AuthVerifier>>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            router,
            cache,
            engine: TransformEngine::new(),
            verifier,
            telemetry,
        }
    }

    pub fn with_engine(mut self, engine: TransformEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Run the request to completion and record its telemetry event
    pub async fn handle(&self, ctx: &RequestContext) -> Response {
        let response = self.run(ctx).await;

        self.telemetry.record(RequestEvent {
            request_id: ctx.request_id().to_string(),
            url: ctx.url(),
            start_time: ctx.start_time(),
            end_time: Utc::now(),
            response_size: response.body.len(),
            result: response.result,
        });

        response
    }

    async fn run(&self, ctx: &RequestContext) -> Response {
        let mut state = match self.start(ctx) {
            Ok(state) => state,
            Err(response) => return response,
        };

        loop {
            state = match state {
                State::CacheCheck(prepared) => self.cache_check(ctx, prepared).await,
                State::Fetch(prepared) => self.fetch(ctx, prepared).await,
                State::Transform(prepared, raw) => self.transform(ctx, prepared, raw).await,
                State::ErrorImage(route, spec) => self.error_image(ctx, &route, spec).await,
                State::Serve(response) => return response,
            };
        }
    }

    fn start(&self, ctx: &RequestContext) -> Result<State, Response> {
        let route = match self.router.route(ctx.path()) {
            Some(route) => route,
            None => {
                debug!(request_id = %ctx.request_id(), path = %ctx.path(), "No route for path");
                return Err(Response::not_found());
            }
        };

        let spec = resolve(ctx.query_params(), route.defaults());
        let logical_path = route.logical_path(ctx.path());

        if !route.is_allowed(&logical_path) {
            info!(
                request_id = %ctx.request_id(),
                route = %route.name(),
                path = %logical_path,
                "File type not allowed"
            );
            return Ok(State::ErrorImage(route, spec));
        }

        if route.verification_required() {
            if let Some(verifier) = &self.verifier {
                let verified = extract_query_token(ctx.query_params(), TOKEN_PARAM)
                    .map(|token| verifier.verify(&token))
                    .unwrap_or(false);
                if !verified {
                    info!(
                        request_id = %ctx.request_id(),
                        route = %route.name(),
                        "Verification failed"
                    );
                    return Ok(State::ErrorImage(route, spec));
                }
            }
        }

        let cache_key = route
            .cache_policy()
            .is_enabled()
            .then(|| CacheKey::new(route.cache_path(), route.prefix(), &spec, &logical_path));

        let prepared = Prepared {
            // The verification token never leaves the process
            fetch: FetchRequest::new(logical_path, strip_param(ctx.query(), TOKEN_PARAM)),
            route,
            spec,
            cache_key,
        };
        Ok(State::CacheCheck(prepared))
    }

    async fn cache_check(&self, ctx: &RequestContext, prepared: Prepared) -> State {
        let key = match &prepared.cache_key {
            Some(key) => key,
            None => return State::Fetch(prepared),
        };

        match self.cache.lookup(key, prepared.route.cache_policy()).await {
            CacheLookup::Hit(body) => {
                debug!(request_id = %ctx.request_id(), cache_key = %key, "Cache hit");
                State::Serve(Response {
                    status: 200,
                    body,
                    content_type: Some(prepared.spec.output_format.content_type()),
                    result: ResultType::Cached,
                })
            }
            CacheLookup::Miss => State::Fetch(prepared),
        }
    }

    async fn fetch(&self, ctx: &RequestContext, prepared: Prepared) -> State {
        match prepared.route.source().fetch(&prepared.fetch).await {
            Ok(raw) => State::Transform(prepared, raw),
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    route = %prepared.route.name(),
                    path = %prepared.fetch.path,
                    status = e.status(),
                    error = %e,
                    "Source fetch failed"
                );
                State::ErrorImage(prepared.route, prepared.spec)
            }
        }
    }

    async fn transform(&self, ctx: &RequestContext, prepared: Prepared, raw: Bytes) -> State {
        let processed = match self
            .engine
            .apply_blocking(raw, prepared.spec.clone())
            .await
        {
            Ok(processed) => processed,
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    route = %prepared.route.name(),
                    path = %prepared.fetch.path,
                    error = %e,
                    "Transform failed"
                );
                return State::ErrorImage(prepared.route, prepared.spec);
            }
        };

        let body = Bytes::from(processed.data);
        let status = if body.len() > MIN_CACHEABLE_BYTES {
            if let Some(key) = &prepared.cache_key {
                self.cache.store(key, body.clone());
            }
            200
        } else {
            warn!(
                request_id = %ctx.request_id(),
                size = body.len(),
                "Image too small to cache"
            );
            404
        };

        State::Serve(Response {
            status,
            body,
            content_type: Some(processed.content_type),
            result: ResultType::Generated,
        })
    }

    async fn error_image(&self, ctx: &RequestContext, route: &Route, spec: TransformSpec) -> State {
        let path = match route.error_image() {
            Some(path) => path,
            None => return State::Serve(Response::not_found()),
        };

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    path = %path.display(),
                    error = %e,
                    "Failed to read error image"
                );
                return State::Serve(Response::not_found());
            }
        };

        match self.engine.apply_blocking(raw, spec).await {
            Ok(processed) => State::Serve(Response {
                status: 404,
                body: Bytes::from(processed.data),
                content_type: Some(processed.content_type),
                result: ResultType::Generated,
            }),
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    path = %path.display(),
                    error = %e,
                    "Failed to transform error image"
                );
                State::Serve(Response::not_found())
            }
        }
    }
}
