//! Bounded background cache writer
//!
//! Cache fills and stale-entry deletions never block a response. They are
//! queued onto a bounded channel drained by a fixed pool of tokio tasks. When
//! the queue is full the job is dropped with a warning. The writer tracks
//! in-flight jobs so tests can wait for the queue to settle and shutdown can
//! drain it.

use bytes::Bytes;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::DiskBackend;
use super::error::CacheError;

#[derive(Debug)]
enum CacheJob {
    Write { path: PathBuf, data: Bytes },
    Delete { path: PathBuf },
}

pub struct CacheWriter {
    sender: Mutex<Option<mpsc::Sender<CacheJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl CacheWriter {
    /// Spawn `workers` tasks sharing a queue of `queue_depth` jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<dyn DiskBackend>, workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (in_flight, _) = watch::channel(0usize);
        let in_flight = Arc::new(in_flight);

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let backend = Arc::clone(&backend);
                let in_flight = Arc::clone(&in_flight);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        run_job(backend.as_ref(), job).await;
                        in_flight.send_modify(|n| *n = n.saturating_sub(1));
                    }
                    debug!(worker_id, "Cache writer stopped");
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            in_flight,
        }
    }

    /// Queue a cache fill
    pub fn write(&self, path: PathBuf, data: Bytes) -> Result<(), CacheError> {
        self.enqueue(CacheJob::Write { path, data })
    }

    /// Queue deletion of a stale entry
    pub fn delete(&self, path: PathBuf) -> Result<(), CacheError> {
        self.enqueue(CacheJob::Delete { path })
    }

    fn enqueue(&self, job: CacheJob) -> Result<(), CacheError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(CacheError::Closed)?;

        // Count before sending so a fast worker cannot decrement first
        self.in_flight.send_modify(|n| *n += 1);
        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(CacheError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(CacheError::Closed),
                }
            }
        }
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every queued job has finished
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting jobs and wait for the queue to drain
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache writer task failed");
            }
        }
    }
}

async fn run_job(backend: &dyn DiskBackend, job: CacheJob) {
    match job {
        CacheJob::Write { path, data } => {
            let size = data.len();
            match backend.write_file_atomic(&path, data).await {
                Ok(()) => debug!(path = %path.display(), size, "Cached rendition"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to write cache entry"),
            }
        }
        CacheJob::Delete { path } => match backend.delete_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed stale cache entry"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale cache entry"),
        },
    }
}
