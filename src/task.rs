//! Transfer task - one execution of one request
//!
//! `Created -> Connecting -> Streaming -> {Completed | Cancelled | Failed}`.
//!
//! Bytes go to `<file>.temp` and the file is renamed into place only after the
//! stream ends. The stop signal is honoured between reads and while waiting on
//! connect or read, never in the middle of a write.

use crate::dispatcher::EventSink;
use crate::error::{EngineError, NetworkErrorKind, Result};
use crate::protocol::{DownloadEvent, DownloadProgress, DownloadStatus};
use crate::request::DownloadRequest;
use crate::transport::{BodyReader, ConnectRequest, Connection, Transport, PARTIAL_CONTENT};

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Read buffer size per streaming iteration
pub const BUFFER_SIZE: usize = 4096;

/// Why an execution was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `pause`: the registry entry is kept
    Paused,
    /// `cancel`, `cancel_all`, or superseded by a new execution
    Cancelled,
}

/// Cancellation token plus the reason it fired. The first reason wins.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopSignal {
    /// A signal that also fires when `parent` is cancelled
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn stop(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason for the stop. A parent teardown carries no reason and counts as a cancel.
    pub fn reason(&self) -> StopReason {
        self.reason.get().copied().unwrap_or(StopReason::Cancelled)
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// Engine-wide knobs the task needs
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskSettings {
    pub range_resume: bool,
    /// Pauses emit `Paused` rather than `Failed("Cancelled")`
    pub notify_pause: bool,
}

/// How `execute` ended when it did not fail
enum Outcome {
    Completed,
    Stopped(StopReason),
}

/// I/O resources owned by one execution
#[derive(Default)]
struct Resources {
    connection: Option<Box<dyn Connection>>,
    body: Option<BodyReader>,
    file: Option<File>,
    /// Bytes written to the temp file by this execution
    written: u64,
}

pub(crate) struct TransferTask {
    request: Arc<DownloadRequest>,
    transport: Arc<dyn Transport>,
    signal: StopSignal,
    events: EventSink,
    settings: TaskSettings,
    limiter: Option<Arc<Semaphore>>,
}

impl TransferTask {
    pub(crate) fn new(
        request: Arc<DownloadRequest>,
        transport: Arc<dyn Transport>,
        signal: StopSignal,
        events: EventSink,
        settings: TaskSettings,
        limiter: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            request,
            transport,
            signal,
            events,
            settings,
            limiter,
        }
    }

    /// Run the execution to a terminal state. Never returns an error: every
    /// outcome is reported through the event sink.
    pub(crate) async fn run(self) {
        let id = self.request.id();
        self.request.set_status(DownloadStatus::InProgress);
        self.events.emit(DownloadEvent::Started { id });

        let mut resources = Resources::default();
        let result = self.execute(&mut resources).await;
        let written = resources.written;
        self.release(&mut resources).await;

        match result {
            Ok(Outcome::Completed) => {
                if let Err(e) = self.complete().await {
                    self.fail(e, written).await;
                }
            }
            Ok(Outcome::Stopped(reason)) => self.stopped(reason).await,
            Err(EngineError::EmptyBody) => {
                tracing::debug!(id = %id, "Transport returned no body, nothing to transfer");
                self.request.set_status(DownloadStatus::Unknown);
            }
            Err(e) if e.is_cancelled() => self.stopped(self.signal.reason()).await,
            Err(e) => self.fail(e, written).await,
        }
    }

    async fn execute(&self, res: &mut Resources) -> Result<Outcome> {
        let _permit = match &self.limiter {
            Some(limiter) => {
                let limiter = Arc::clone(limiter);
                tokio::select! {
                    biased;
                    _ = self.signal.stopped() => return Ok(Outcome::Stopped(self.signal.reason())),
                    permit = limiter.acquire_owned() => {
                        Some(permit.map_err(|_| EngineError::Shutdown)?)
                    }
                }
            }
            None => None,
        };

        // Connecting
        let temp_path = self.request.temp_path();
        let resume_from = if self.settings.range_resume {
            existing_len(&temp_path).await
        } else {
            0
        };

        let connect = ConnectRequest {
            url: self.request.url(),
            headers: self.request.headers().to_vec(),
            connect_timeout: self.request.connect_timeout(),
            read_timeout: self.request.read_timeout(),
            range_start: (resume_from > 0).then_some(resume_from),
        };

        let connection = self
            .guarded(self.request.connect_timeout(), self.transport.connect(&connect))
            .await?;
        let connection = res.connection.insert(connection);

        let status = connection.status_code();
        if status >= 400 {
            return Err(EngineError::network(
                NetworkErrorKind::HttpStatus(status),
                format!("HTTP error: {}", status),
            ));
        }

        if let Some(final_url) = connection.final_url() {
            if final_url != connect.url {
                tracing::debug!(id = %self.request.id(), url = final_url, "Following redirect");
                self.request.set_url(final_url);
            }
        }

        let partial = resume_from > 0 && status == PARTIAL_CONTENT;
        let content_length = connection.content_length();
        if partial {
            if self.request.progress().total_bytes == 0 {
                if let Some(len) = content_length {
                    self.request.set_total_bytes(resume_from + len);
                }
            }
            self.request.set_downloaded_bytes(resume_from);
            tracing::debug!(id = %self.request.id(), offset = resume_from, "Continuing partial file");
        } else {
            // A restart must not inherit the length of an earlier response
            self.request.set_total_bytes(content_length.unwrap_or(0));
            self.request.set_downloaded_bytes(0);
        }

        let body = match connection.take_body() {
            Some(body) => res.body.insert(body),
            None => return Err(EngineError::EmptyBody),
        };

        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::io(parent, "Failed to create directory", e))?;
        }

        let file = if partial {
            OpenOptions::new()
                .append(true)
                .open(&temp_path)
                .await
                .map_err(|e| EngineError::io(&temp_path, "Failed to open file for append", e))?
        } else {
            File::create(&temp_path)
                .await
                .map_err(|e| EngineError::io(&temp_path, "Failed to create file", e))?
        };
        let file = res.file.insert(file);

        // Streaming
        let id = self.request.id();
        let read_timeout = self.request.read_timeout();
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let n = self
                .guarded(read_timeout, async {
                    body.read(&mut buf).await.map_err(EngineError::from)
                })
                .await?;

            if n == 0 {
                break;
            }

            if self.signal.is_stopped() {
                return Ok(Outcome::Stopped(self.signal.reason()));
            }

            let total = self.request.progress().total_bytes;
            let before = self.request.progress().downloaded_bytes;
            if total > 0 && before + n as u64 > total {
                return Err(EngineError::network(
                    NetworkErrorKind::Other,
                    format!("Received more than the advertised {} bytes", total),
                ));
            }

            file.write_all(&buf[..n])
                .await
                .map_err(|e| EngineError::io(&temp_path, "Failed to write", e))?;
            res.written += n as u64;

            let downloaded = self.request.add_downloaded_bytes(n as u64);
            let progress = DownloadProgress {
                total_bytes: total,
                downloaded_bytes: downloaded,
            };
            self.events.emit(DownloadEvent::Progress {
                id,
                percent: progress.percent(),
                downloaded_bytes: downloaded,
                total_bytes: total,
            });
        }

        let progress = self.request.progress();
        if progress.total_bytes > 0 && progress.downloaded_bytes < progress.total_bytes {
            return Err(EngineError::network(
                NetworkErrorKind::Incomplete,
                format!(
                    "Incomplete download: received {} bytes, expected {} bytes",
                    progress.downloaded_bytes, progress.total_bytes
                ),
            ));
        }

        file.flush()
            .await
            .map_err(|e| EngineError::io(&temp_path, "Failed to flush", e))?;
        file.sync_all()
            .await
            .map_err(|e| EngineError::io(&temp_path, "Failed to sync", e))?;

        Ok(Outcome::Completed)
    }

    /// Race `fut` against the stop signal, bounded by `timeout` unless zero
    async fn guarded<T, F>(&self, timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async move {
            if timeout.is_zero() {
                fut.await
            } else {
                tokio::time::timeout(timeout, fut).await?
            }
        };

        tokio::select! {
            biased;
            _ = self.signal.stopped() => Err(EngineError::Cancelled),
            result = bounded => result,
        }
    }

    /// Close connection, stream and file independently. Errors are logged only.
    async fn release(&self, res: &mut Resources) {
        let id = self.request.id();

        if let Some(mut connection) = res.connection.take() {
            if let Err(e) = connection.close().await {
                tracing::debug!(id = %id, "Failed to close connection: {}", e);
            }
        }

        drop(res.body.take());

        if let Some(mut file) = res.file.take() {
            if let Err(e) = file.flush().await {
                tracing::debug!(id = %id, "Failed to flush output file: {}", e);
            }
            // Waits for in-flight writes so the handle is really closed before rename/delete
            drop(file.into_std().await);
        }
    }

    async fn complete(&self) -> Result<()> {
        let temp_path = self.request.temp_path();
        let final_path = self.request.final_path();

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| EngineError::io(&final_path, "Failed to rename file", e))?;

        self.request.set_status(DownloadStatus::Completed);
        tracing::info!(
            id = %self.request.id(),
            path = ?final_path,
            bytes = self.request.progress().downloaded_bytes,
            "Download completed"
        );
        self.events.emit(DownloadEvent::Completed {
            id: self.request.id(),
            path: final_path,
        });
        Ok(())
    }

    async fn stopped(&self, reason: StopReason) {
        let id = self.request.id();
        // A paused range-resumable transfer keeps its partial file
        if !(reason == StopReason::Paused && self.settings.range_resume) {
            remove_temp(&self.request.temp_path()).await;
        }
        self.request.set_status(DownloadStatus::Cancelled);

        if reason == StopReason::Paused && self.settings.notify_pause {
            tracing::info!(id = %id, "Download paused");
            self.events.emit(DownloadEvent::Paused { id });
        } else {
            tracing::info!(id = %id, ?reason, "Download cancelled");
            self.events.emit(DownloadEvent::Failed {
                id,
                error: EngineError::Cancelled.to_string(),
            });
        }
    }

    async fn fail(&self, error: EngineError, written: u64) {
        let id = self.request.id();
        // Keep the partial file only if a later execution can continue it
        if !(self.settings.range_resume && written > 0) {
            remove_temp(&self.request.temp_path()).await;
        }
        self.request.set_status(DownloadStatus::Failed);
        tracing::warn!(id = %id, retryable = error.is_retryable(), "Download failed: {}", error);
        self.events.emit(DownloadEvent::Failed {
            id,
            error: error.to_string(),
        });
    }
}

async fn existing_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

async fn remove_temp(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove temp file {:?}: {}", path, e),
    }
}
