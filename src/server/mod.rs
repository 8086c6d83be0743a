// Server module - hyper HTTP/1 listener in front of the request pipeline

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::constants::ALIVE_PATH;
use crate::pipeline::{RequestContext, RequestPipeline};

/// HTTP front end: accepts connections and hands each GET to the pipeline
pub struct ImageServer {
    pipeline: Arc<RequestPipeline>,
}

impl ImageServer {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// Bind the listener described by the server config
    pub async fn bind(config: &ServerConfig) -> std::io::Result<TcpListener> {
        let address = format!("{}:{}", config.address, config.port);
        let listener = TcpListener::bind(&address).await?;
        info!(address = %address, "Listening");
        Ok(listener)
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Open connections finish their current request, then pending cache
    /// writes are drained before returning.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&self.pipeline),
                        stop_rx.clone(),
                    ));
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }

            while connections.try_join_next().is_some() {}
        }

        drop(listener);
        // Receivers only fail if the sender is gone
        let _ = stop_tx.send(true);
        while connections.join_next().await.is_some() {}

        let writer = self.pipeline.cache().writer();
        info!(pending = writer.pending(), "Draining cache writes");
        writer.shutdown().await;
        info!("Server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    pipeline: Arc<RequestPipeline>,
    mut stop: watch::Receiver<bool>,
) {
    let service = service_fn(move |req| handle_request(Arc::clone(&pipeline), req));
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        }
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(peer = %peer, error = %e, "Connection closed with error during shutdown");
            }
        }
    }
}

/// Answer one request. `/alive` is served here and never reaches telemetry.
pub async fn handle_request<B>(
    pipeline: Arc<RequestPipeline>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    if path == ALIVE_PATH {
        return Ok(build_response(StatusCode::OK, Bytes::new(), None));
    }

    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(build_response(StatusCode::METHOD_NOT_ALLOWED, Bytes::new(), None));
    }

    let ctx = RequestContext::new(path, req.uri().query().unwrap_or_default());
    let response = pipeline.handle(&ctx).await;
    debug!(
        request_id = %ctx.request_id(),
        path = %ctx.path(),
        status = response.status,
        size = response.body.len(),
        "Response ready"
    );

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if req.method() == Method::HEAD {
        // Content-Length still reflects the full body
        let mut head = build_response(status, Bytes::new(), response.content_type);
        head.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(response.body.len()));
        return Ok(head);
    }

    Ok(build_response(status, response.body, response.content_type))
}

fn build_response(
    status: StatusCode,
    body: Bytes,
    content_type: Option<&'static str>,
) -> Response<Full<Bytes>> {
    let length = body.len();
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MockDiskBackend, ResultCache};
    use crate::observability::ChannelSink;
    use crate::router::Router;

    fn pipeline() -> (Arc<RequestPipeline>, tokio::sync::mpsc::Receiver<crate::observability::RequestEvent>) {
        let cache = Arc::new(ResultCache::new(Arc::new(MockDiskBackend::new()), 1, 8));
        let (sink, events) = ChannelSink::new(8);
        let pipeline = RequestPipeline::new(Router::default(), cache, None, Arc::new(sink));
        (Arc::new(pipeline), events)
    }

    #[tokio::test]
    async fn test_alive_is_ok_and_not_recorded() {
        let (pipeline, mut events) = pipeline();
        let req = Request::get("/alive").body(()).unwrap();
        let resp = handle_request(pipeline, req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "0");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unrouted_path_is_recorded_404() {
        let (pipeline, mut events) = pipeline();
        let req = Request::get("/nowhere/a.jpg?w=10").body(()).unwrap();
        let resp = handle_request(pipeline, req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let event = events.try_recv().unwrap();
        assert_eq!(event.url, "/nowhere/a.jpg?w=10");
    }

    #[tokio::test]
    async fn test_post_is_rejected() {
        let (pipeline, _events) = pipeline();
        let req = Request::post("/images/a.jpg").body(()).unwrap();
        let resp = handle_request(pipeline, req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
