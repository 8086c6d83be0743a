// Request pipeline tests: sources, transforms and the on-disk cache together

use super::fake_upstream::{jpeg_fixture, png_fixture, FakeUpstream};
use async_trait::async_trait;
use bytes::Bytes;
use kagami::cache::{ResultCache, TokioFsBackend};
use kagami::config::{Config, RewriteRule, RouteConfig, ServerConfig};
use kagami::error::SourceFetchError;
use kagami::observability::{ChannelSink, RequestEvent, ResultType};
use kagami::pipeline::{RequestContext, RequestPipeline};
use kagami::router::{Route, Router};
use kagami::source::{FetchRequest, HttpClient, ImageSource, SourceRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

struct MemorySource {
    data: Bytes,
    calls: AtomicUsize,
}

#[async_trait]
impl ImageSource for MemorySource {
    async fn fetch(&self, _request: &FetchRequest) -> Result<Bytes, SourceFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }
}

fn build_pipeline(router: Router) -> (RequestPipeline, Receiver<RequestEvent>) {
    let cache = Arc::new(ResultCache::new(Arc::new(TokioFsBackend::new()), 2, 32));
    let (sink, events) = ChannelSink::new(32);
    (RequestPipeline::new(router, cache, None, Arc::new(sink)), events)
}

fn registry() -> SourceRegistry {
    SourceRegistry::with_builtin_sources(HttpClient::new(Duration::from_secs(5)).unwrap())
}

fn s3_route(name: &str, upstream: &FakeUpstream, cache_dir: &TempDir) -> RouteConfig {
    let mut route = RouteConfig::new(name, "s3");
    route.source_config = serde_json::json!({ "endpoint": upstream.url() });
    route.cache_path = cache_dir.path().to_string_lossy().into_owned();
    route
}

fn router_for(routes: Vec<RouteConfig>) -> Router {
    let config = Config {
        server: ServerConfig::default(),
        auth: None,
        routes,
    };
    Router::from_config(&config, &registry())
}

#[tokio::test]
async fn test_large_source_is_cropped_to_route_defaults() {
    // Test: 4000x3000 source with default 200x200 crop gives exactly 200x200
    let source = Arc::new(MemorySource {
        data: jpeg_fixture(4000, 3000),
        calls: AtomicUsize::new(0),
    });
    let mut config = RouteConfig::new("images", "memory");
    config.default_width = 200;
    config.default_height = 200;
    config.cache_time = -1;
    let route = Route::new(&config, source).unwrap();
    let (pipeline, _events) = build_pipeline(Router::new(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/images/big.jpg", ""))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, Some("image/jpeg"));
    let img = image::load_from_memory(&resp.body).unwrap();
    assert_eq!((img.width(), img.height()), (200, 200));
}

#[tokio::test]
async fn test_pixelation_produces_block_means() {
    // Test: 100x100 source with px=50 becomes a 2x2 grid of per-block means
    let fixture = png_fixture(100, 100);
    let src = image::load_from_memory(&fixture).unwrap().to_rgba8();

    let source = Arc::new(MemorySource {
        data: fixture,
        calls: AtomicUsize::new(0),
    });
    let mut config = RouteConfig::new("images", "memory");
    config.cache_time = -1;
    let route = Route::new(&config, source).unwrap();
    let (pipeline, _events) = build_pipeline(Router::new(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/images/grid.png", "px=50&f=png"))
        .await;
    assert_eq!(resp.status, 200);

    let out = image::load_from_memory(&resp.body).unwrap().to_rgba8();
    assert_eq!(out.dimensions(), (100, 100));

    for (bx, by) in [(0u32, 0u32), (50, 0), (0, 50), (50, 50)] {
        let mut sums = [0u64; 4];
        for y in by..by + 50 {
            for x in bx..bx + 50 {
                for (sum, value) in sums.iter_mut().zip(src.get_pixel(x, y).0) {
                    *sum += u64::from(value);
                }
            }
        }
        let expected = sums.map(|sum| (sum / 2500) as u8);

        for y in by..by + 50 {
            for x in bx..bx + 50 {
                assert_eq!(out.get_pixel(x, y).0, expected, "pixel ({}, {})", x, y);
            }
        }
    }
}

#[tokio::test]
async fn test_forbidden_source_without_error_image_is_empty_404() {
    // Test: Upstream 403 with no error image configured answers an empty 404
    let upstream = FakeUpstream::start(vec![("/bucket/secret.jpg", 403, Bytes::new())]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let router = router_for(vec![s3_route("images", &upstream, &cache_dir)]);
    let (pipeline, mut events) = build_pipeline(router);

    let resp = pipeline
        .handle(&RequestContext::new("/images/bucket/secret.jpg", "w=10"))
        .await;

    assert_eq!(resp.status, 404);
    assert!(resp.body.is_empty());
    assert_eq!(upstream.requests(), vec!["/bucket/secret.jpg".to_string()]);

    let event = events.recv().await.unwrap();
    assert_eq!(event.url, "/images/bucket/secret.jpg?w=10");
    assert_eq!(event.response_size, 0);
}

#[tokio::test]
async fn test_failed_fetch_serves_error_image_at_requested_size() {
    // Test: The configured error image is transformed like a normal request
    let upstream = FakeUpstream::start(vec![]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let error_path = cache_dir.path().join("missing.png");
    std::fs::write(&error_path, png_fixture(120, 90)).unwrap();

    let mut route = s3_route("images", &upstream, &cache_dir);
    route.error_image = Some(error_path);
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/images/bucket/gone.jpg", "w=40&h=30&f=png"))
        .await;

    assert_eq!(resp.status, 404);
    assert_eq!(resp.content_type, Some("image/png"));
    let img = image::load_from_memory(&resp.body).unwrap();
    assert_eq!((img.width(), img.height()), (40, 30));
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    // Test: Two identical requests fetch once and return identical bytes
    let upstream = FakeUpstream::start(vec![("/bucket/cat.png", 200, png_fixture(160, 120))]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let router = router_for(vec![s3_route("images", &upstream, &cache_dir)]);
    let (pipeline, mut events) = build_pipeline(router);

    let first = pipeline
        .handle(&RequestContext::new("/images/bucket/cat.png", "w=80&h=60"))
        .await;
    assert_eq!(first.status, 200);
    pipeline.cache().writer().wait_idle().await;

    let cached_files = std::fs::read_dir(cache_dir.path()).unwrap().count();
    assert_eq!(cached_files, 1);

    let second = pipeline
        .handle(&RequestContext::new("/images/bucket/cat.png", "w=80&h=60"))
        .await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, first.body);
    assert_eq!(upstream.requests().len(), 1);

    assert_eq!(events.recv().await.unwrap().result, ResultType::Generated);
    assert_eq!(events.recv().await.unwrap().result, ResultType::Cached);
}

#[tokio::test]
async fn test_different_transform_is_a_different_cache_entry() {
    // Test: Changing a transform parameter misses the cache
    let upstream = FakeUpstream::start(vec![("/bucket/cat.png", 200, png_fixture(160, 120))]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let router = router_for(vec![s3_route("images", &upstream, &cache_dir)]);
    let (pipeline, _events) = build_pipeline(router);

    for query in ["w=80&h=60", "w=80&h=60&q=50"] {
        let resp = pipeline
            .handle(&RequestContext::new("/images/bucket/cat.png", query))
            .await;
        assert_eq!(resp.status, 200);
        pipeline.cache().writer().wait_idle().await;
    }

    assert_eq!(upstream.requests().len(), 2);
    assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn test_expired_entry_is_regenerated() {
    // Test: An entry older than cache_time is treated as a miss
    let upstream = FakeUpstream::start(vec![("/bucket/cat.png", 200, png_fixture(160, 120))]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let mut route = s3_route("images", &upstream, &cache_dir);
    route.cache_time = 1;
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let ctx = || RequestContext::new("/images/bucket/cat.png", "w=80&h=60");
    assert_eq!(pipeline.handle(&ctx()).await.status, 200);
    pipeline.cache().writer().wait_idle().await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let resp = pipeline.handle(&ctx()).await;
    assert_eq!(resp.status, 200);
    assert_eq!(upstream.requests().len(), 2);
}

#[tokio::test]
async fn test_rewrite_rule_changes_source_path() {
    // Test: The rewritten logical path is what the source fetches
    let upstream =
        FakeUpstream::start(vec![("/media/originals/foo.jpg", 200, jpeg_fixture(64, 48))]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let mut route = s3_route("thumb", &upstream, &cache_dir);
    route.source_config = serde_json::json!({ "endpoint": upstream.url(), "bucket": "media" });
    route.rewrite = Some(RewriteRule {
        pattern: "^/thumb/(.*)$".to_string(),
        replace: "/originals/$1".to_string(),
    });
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/thumb/foo.jpg", "w=32"))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(upstream.requests(), vec!["/media/originals/foo.jpg".to_string()]);
}

#[tokio::test]
async fn test_social_source_falls_back_to_second_rung() {
    // Test: A failing primary CDN URL is retried once on the fallback URL
    let upstream =
        FakeUpstream::start(vec![("/legacy/12345_n.jpg", 200, jpeg_fixture(64, 64))]).await;
    let cache_dir = tempfile::tempdir().unwrap();
    let mut route = RouteConfig::new("fb", "social");
    route.cache_path = cache_dir.path().to_string_lossy().into_owned();
    route.source_config = serde_json::json!({
        "urls": [
            format!("{}/primary/{{path}}", upstream.url()),
            format!("{}/legacy/{{path}}?{{query}}", upstream.url()),
        ]
    });
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/fb/12345_n.jpg", "oh=abc&w=20"))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(
        upstream.requests(),
        vec![
            "/primary/12345_n.jpg".to_string(),
            "/legacy/12345_n.jpg?oh=abc&w=20".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_social_source_gets_cleaned_query_without_token() {
    // Test: Extra '?' separators are normalized and the token is not forwarded
    let upstream =
        FakeUpstream::start(vec![("/cdn/777_n.jpg", 200, jpeg_fixture(64, 64))]).await;
    let mut route = RouteConfig::new("fb", "social");
    route.cache_time = -1;
    route.source_config = serde_json::json!({
        "urls": [format!("{}/cdn/{{path}}?{{query}}", upstream.url())]
    });
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/fb/777_n.jpg", "oh=abc?t=secret-token&w=20"))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(upstream.requests(), vec!["/cdn/777_n.jpg?oh=abc&w=20".to_string()]);
}

#[tokio::test]
async fn test_social_source_surfaces_last_failure() {
    // Test: When every rung fails the request degrades to an empty 404
    let upstream = FakeUpstream::start(vec![]).await;
    let mut route = RouteConfig::new("fb", "social");
    route.cache_time = -1;
    route.source_config = serde_json::json!({
        "urls": [
            format!("{}/primary/{{path}}", upstream.url()),
            format!("{}/legacy/{{path}}", upstream.url()),
        ]
    });
    let (pipeline, _events) = build_pipeline(router_for(vec![route]));

    let resp = pipeline
        .handle(&RequestContext::new("/fb/1.jpg", ""))
        .await;

    assert_eq!(resp.status, 404);
    assert!(resp.body.is_empty());
    assert_eq!(upstream.requests().len(), 2);
}
