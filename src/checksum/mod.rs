//! Serialized checksum computation.
//!
//! Hashing requests run strictly one after another on a single worker task,
//! so files are read sequentially. Files another process holds busy are
//! retried with exponential backoff. The backoff only delays the requests
//! queued behind it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::Mutex,
    tokio::{
        spawn,
        sync::oneshot,
        task::{JoinHandle, spawn_blocking},
        time::sleep,
    },
    tracing::{debug, trace},
};

use crate::error::domain::ChecksumError;

mod config;
mod hasher;

pub use {
    config::ChecksumConfig,
    hasher::{ChecksumSource, FileChecksummer, is_busy},
};

/// One queued checksum request.
struct ChecksumRequest {
    path: PathBuf,
    responder: oneshot::Sender<Result<String, ChecksumError>>,
}

/// Single-worker checksum queue.
///
/// Must be created inside a tokio runtime.
pub struct ChecksumQueue {
    /// Sender for new requests.
    sender: Sender<ChecksumRequest>,
    /// Receiver kept to drain queued requests on `kill`.
    receiver: Receiver<ChecksumRequest>,
    /// Worker task handle, taken on `kill`.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChecksumQueue {
    /// Creates a queue hashing files on disk.
    ///
    /// # Arguments
    ///
    /// * `config` - Retry configuration.
    ///
    /// # Returns
    ///
    /// A new `ChecksumQueue` with its worker running.
    #[must_use]
    pub fn new(config: ChecksumConfig) -> Self {
        Self::with_source(FileChecksummer, config)
    }

    /// Creates a queue computing checksums with a custom source.
    ///
    /// # Arguments
    ///
    /// * `source` - Checksum implementation.
    /// * `config` - Retry configuration.
    ///
    /// # Returns
    ///
    /// A new `ChecksumQueue` with its worker running.
    pub fn with_source<S: ChecksumSource>(source: S, config: ChecksumConfig) -> Self {
        let (sender, receiver) = unbounded();
        let worker = spawn(Self::run_worker(
            receiver.clone(),
            Arc::new(source),
            config,
        ));

        Self {
            sender,
            receiver,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a checksum computation.
    ///
    /// # Arguments
    ///
    /// * `path` - File to hash.
    ///
    /// # Returns
    ///
    /// The base64 encoded digest of the file.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumError::Io` if the file cannot be read (after retries
    /// for busy files) and `ChecksumError::Abandoned` if the queue is killed
    /// before the request completes.
    pub async fn push<P: AsRef<Path>>(&self, path: P) -> Result<String, ChecksumError> {
        let path = path.as_ref().to_path_buf();
        let (responder, response) = oneshot::channel();

        let request = ChecksumRequest {
            path: path.clone(),
            responder,
        };
        if self.sender.send(request).await.is_err() {
            return Err(ChecksumError::Abandoned { path });
        }

        response
            .await
            .unwrap_or(Err(ChecksumError::Abandoned { path }))
    }

    /// Cancels queued and in-flight requests without completing them.
    ///
    /// Their callers get `ChecksumError::Abandoned`. Later pushes fail the
    /// same way.
    pub fn kill(&self) {
        self.sender.close();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }

        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        debug!("Checksum queue killed, {} queued request(s) dropped", dropped);
    }

    /// Number of requests waiting behind the one in flight.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    async fn run_worker(
        receiver: Receiver<ChecksumRequest>,
        source: Arc<dyn ChecksumSource>,
        config: ChecksumConfig,
    ) {
        while let Ok(request) = receiver.recv().await {
            let result = compute_with_retry(&source, &request.path, &config).await;
            // The caller may have stopped waiting.
            let _ = request.responder.send(result);
        }
        trace!("Checksum worker stopped");
    }
}

impl Drop for ChecksumQueue {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn compute_with_retry(
    source: &Arc<dyn ChecksumSource>,
    path: &Path,
    config: &ChecksumConfig,
) -> Result<String, ChecksumError> {
    let mut attempt = 0;
    loop {
        let task_source = Arc::clone(source);
        let task_path = path.to_path_buf();
        let outcome = spawn_blocking(move || task_source.checksum(&task_path)).await;

        match outcome {
            Ok(Ok(checksum)) => return Ok(checksum),
            Ok(Err(e)) if is_busy(&e) && attempt < config.max_retries => {
                let delay = config.retry_delay(attempt);
                debug!(
                    "File {:?} is busy, retrying checksum in {:?} (attempt {})",
                    path,
                    delay,
                    attempt + 1
                );
                sleep(delay).await;
                attempt += 1;
            }
            Ok(Err(e)) => {
                return Err(ChecksumError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                return Err(ChecksumError::Worker {
                    reason: e.to_string(),
                });
            }
        }
    }
}
