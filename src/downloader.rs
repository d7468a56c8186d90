//! Downloader - the public entry point
//!
//! Wires configuration, transport, dispatcher and queue together and exposes
//! the caller-facing operations: build, enqueue, pause, resume, cancel by id
//! or tag, cancel everything, observe.

use crate::config::DownloaderConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{EngineError, Result};
use crate::protocol::{DownloadEvent, DownloadId};
use crate::queue::DownloadRequestQueue;
use crate::request::{DownloadCallbacks, DownloadInfo, DownloadRequest, DownloadRequestBuilder};
use crate::transport::Transport;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Queue-based file downloader
pub struct Downloader {
    config: DownloaderConfig,
    queue: DownloadRequestQueue,
}

impl Downloader {
    /// Create a downloader using the built-in HTTP transport.
    ///
    /// Must be called from within a Tokio runtime; executions are spawned on it.
    #[cfg(feature = "http")]
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        config.validate()?;
        let transport = crate::transport::HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a downloader on top of a custom transport
    pub fn with_transport(config: DownloaderConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            EngineError::Internal(format!("Downloader requires a Tokio runtime: {}", e))
        })?;

        let dispatcher = Arc::new(Dispatcher::new(transport, runtime, &config));

        tracing::debug!(
            download_dir = ?config.download_dir,
            max_concurrent = ?config.max_concurrent_downloads,
            range_resume = config.range_resume,
            "Downloader created"
        );

        Ok(Self {
            config,
            queue: DownloadRequestQueue::new(dispatcher),
        })
    }

    /// Start a request with this downloader's timeouts already applied
    pub fn new_request(
        &self,
        url: impl Into<String>,
        dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> DownloadRequestBuilder {
        DownloadRequest::builder(url, dir, file_name)
            .connect_timeout(self.config.connect_timeout_duration())
            .read_timeout(self.config.read_timeout_duration())
    }

    /// Like [`new_request`](Self::new_request), targeting `config.download_dir`
    pub fn new_request_in_default_dir(
        &self,
        url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> DownloadRequestBuilder {
        self.new_request(url, self.config.download_dir.clone(), file_name)
    }

    /// Register the request with its hooks and start it
    pub fn enqueue(&self, request: DownloadRequest, callbacks: DownloadCallbacks) -> DownloadId {
        self.queue.enqueue(Arc::new(request.with_callbacks(callbacks)))
    }

    pub fn pause(&self, id: DownloadId) {
        self.queue.pause(id);
    }

    /// Restart a paused (or finished) request from scratch
    pub fn resume(&self, id: DownloadId) {
        self.queue.resume(id);
    }

    pub fn cancel(&self, id: DownloadId) {
        self.queue.cancel(id);
    }

    pub fn cancel_tag(&self, tag: &str) {
        self.queue.cancel_tag(tag);
    }

    /// Cancel every transfer. Afterwards the downloader accepts no more work.
    pub fn cancel_all(&self) {
        self.queue.cancel_all();
    }

    /// Receive every lifecycle event after the matching hook has run
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.queue.dispatcher().subscribe()
    }

    /// Snapshot of a registered request
    pub fn status(&self, id: DownloadId) -> Option<DownloadInfo> {
        self.queue.get(id).map(|r| r.snapshot())
    }

    /// Snapshots of all registered requests
    pub fn list(&self) -> Vec<DownloadInfo> {
        self.queue.requests().iter().map(|r| r.snapshot()).collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.dispatcher().is_shutdown()
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .field("registered", &self.queue.len())
            .finish()
    }
}
