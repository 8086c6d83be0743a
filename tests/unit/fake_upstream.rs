// In-process HTTP upstream standing in for object stores and CDNs

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serves fixed responses keyed by request path; unknown paths get 404.
/// Every request line (`path?query`) is recorded.
pub struct FakeUpstream {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn start(routes: Vec<(&str, u16, Bytes)>) -> Self {
        let routes: Arc<HashMap<String, (u16, Bytes)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body)))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let routes = Arc::clone(&routes);
                        let recorded = Arc::clone(&recorded);
                        async move {
                            let line = match req.uri().query() {
                                Some(q) => format!("{}?{}", req.uri().path(), q),
                                None => req.uri().path().to_string(),
                            };
                            recorded.lock().push(line);
                            let (status, body) = routes
                                .get(req.uri().path())
                                .cloned()
                                .unwrap_or((404, Bytes::new()));
                            let mut resp = Response::new(Full::new(body));
                            *resp.status_mut() = StatusCode::from_u16(status).unwrap();
                            Ok::<_, Infallible>(resp)
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// PNG fixture with enough detail that encoded renditions stay well above
/// the minimum cacheable size
pub fn png_fixture(width: u32, height: u32) -> Bytes {
    use image::{ImageOutputFormat, RgbaImage};
    use std::io::Cursor;

    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 31 ^ y * 17) as u8, (x * 7 + y * 13) as u8, (x ^ y) as u8, 255])
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Png).unwrap();
    Bytes::from(buffer.into_inner())
}

/// Solid-color JPEG fixture
pub fn jpeg_fixture(width: u32, height: u32) -> Bytes {
    use image::{ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 200) as u8, (y % 200) as u8, 120])
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageOutputFormat::Jpeg(90)).unwrap();
    Bytes::from(buffer.into_inner())
}
