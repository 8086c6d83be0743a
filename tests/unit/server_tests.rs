// HTTP server tests over a real socket

use super::fake_upstream::{png_fixture, FakeUpstream};
use kagami::cache::{ResultCache, TokioFsBackend};
use kagami::config::{Config, RouteConfig, ServerConfig};
use kagami::observability::ChannelSink;
use kagami::pipeline::RequestPipeline;
use kagami::router::Router;
use kagami::server::ImageServer;
use kagami::source::{HttpClient, SourceRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct RunningServer {
    base_url: String,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    async fn stop(mut self) -> std::io::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap()
    }
}

async fn start_server(routes: Vec<RouteConfig>) -> RunningServer {
    let config = Config {
        server: ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        },
        auth: None,
        routes,
    };
    let registry =
        SourceRegistry::with_builtin_sources(HttpClient::new(Duration::from_secs(5)).unwrap());
    let router = Router::from_config(&config, &registry);
    let cache = Arc::new(ResultCache::new(Arc::new(TokioFsBackend::new()), 1, 16));
    let (sink, _events) = ChannelSink::new(16);
    let pipeline = RequestPipeline::new(router, cache, None, Arc::new(sink));
    let server = ImageServer::new(Arc::new(pipeline));

    let listener = ImageServer::bind(&config.server).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    RunningServer {
        base_url: format!("http://{}", addr),
        stop: Some(stop_tx),
        task,
    }
}

#[tokio::test]
async fn test_alive_returns_empty_200() {
    // Test: The liveness route answers 200 with no body
    let server = start_server(vec![]).await;

    let resp = reqwest::get(format!("{}/alive", server.base_url)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.content_length(), Some(0));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_image_request_sets_headers() {
    // Test: A generated image carries Content-Type and Content-Length
    let upstream = FakeUpstream::start(vec![(
        "/bucket/photo.png",
        200,
        png_fixture(120, 80),
    )])
    .await;
    let cache_dir = tempfile::tempdir().unwrap();
    let mut route = RouteConfig::new("images", "s3");
    route.source_config = serde_json::json!({ "endpoint": upstream.url() });
    route.cache_path = cache_dir.path().to_string_lossy().into_owned();
    let server = start_server(vec![route]).await;

    let resp = reqwest::get(format!("{}/images/bucket/photo.png?w=60&h=40&f=webp", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], "image/webp");
    let length = resp.content_length().unwrap();
    let body = resp.bytes().await.unwrap();
    assert_eq!(body.len() as u64, length);

    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (60, 40));

    // Shutdown drains the pending cache write
    server.stop().await.unwrap();
    assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    // Test: Paths outside every route prefix answer 404
    let server = start_server(vec![]).await;

    let resp = reqwest::get(format!("{}/nope/a.jpg", server.base_url)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    server.stop().await.unwrap();
}
