// Request telemetry
//
// Each served image request produces one `RequestEvent`. Sinks are
// fire-and-forget: recording never blocks or fails the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How the response body was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultType {
    Cached,
    Generated,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Cached => "CACHED",
            ResultType::Generated => "GENERATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: String,
    pub url: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub response_size: usize,
    pub result: ResultType,
}

impl RequestEvent {
    pub fn elapsed_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: RequestEvent);
}

/// Writes each event as a structured log line
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: RequestEvent) {
        info!(
            request_id = %event.request_id,
            url = %event.url,
            start_time = %event.start_time.to_rfc3339(),
            elapsed_ms = event.elapsed_ms(),
            response_size = event.response_size,
            result = event.result.as_str(),
            "Request served"
        );
    }
}

/// Forwards events to a bounded channel; events are dropped when it is full
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<RequestEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RequestEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&self, event: RequestEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "Dropped telemetry event");
        }
    }
}
