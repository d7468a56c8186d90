//! Dispatcher - concurrency domain for transfer executions
//!
//! Every execution is spawned as a child of one root cancellation token, so
//! `cancel_all` stops all of them at once. Executions are tracked by id, not
//! by request object: a new request for the same transfer always waits for
//! the previous execution to finish its cleanup. Executions never call
//! request hooks themselves: they push events into a channel drained by a
//! single delivery loop, which runs the hooks in order and then broadcasts
//! the event.

use crate::config::DownloaderConfig;
use crate::error::EngineError;
use crate::protocol::{DownloadEvent, DownloadId, DownloadStatus};
use crate::request::{DownloadCallbacks, DownloadRequest};
use crate::task::{StopReason, StopSignal, TaskSettings, TransferTask};
use crate::transport::Transport;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a spawned execution
struct ExecutionHandle {
    signal: StopSignal,
    task: JoinHandle<()>,
}

impl ExecutionHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// One event on its way to the delivery loop
struct Delivery {
    callbacks: Arc<DownloadCallbacks>,
    event: DownloadEvent,
}

/// Write side of the delivery channel for one execution
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<Delivery>,
    callbacks: Arc<DownloadCallbacks>,
}

impl EventSink {
    pub(crate) fn emit(&self, event: DownloadEvent) {
        let delivery = Delivery {
            callbacks: Arc::clone(&self.callbacks),
            event,
        };
        if self.tx.send(delivery).is_err() {
            tracing::debug!("Delivery loop gone, dropping event");
        }
    }
}

/// Schedules transfer executions and marshals their events
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    domain: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    settings: TaskSettings,
    /// Latest execution per id, kept until replaced so successors can await it
    executions: Mutex<HashMap<DownloadId, ExecutionHandle>>,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
    event_tx: broadcast::Sender<DownloadEvent>,
}

impl Dispatcher {
    /// Create a dispatcher and start its delivery loop on `runtime`
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle, config: &DownloaderConfig) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        runtime.spawn(run_delivery(delivery_rx, event_tx.clone()));

        Self {
            transport,
            runtime,
            domain: CancellationToken::new(),
            limiter: config
                .max_concurrent_downloads
                .map(|max| Arc::new(Semaphore::new(max))),
            settings: TaskSettings {
                range_resume: config.range_resume,
                notify_pause: config.notify_pause,
            },
            executions: Mutex::new(HashMap::new()),
            delivery_tx,
            event_tx,
        }
    }

    /// Spawn an execution for `request` and return immediately.
    ///
    /// A still-running earlier execution with the same id, whether of this
    /// request or of one it replaced, is stopped and awaited before the new
    /// one touches the temp file.
    pub fn enqueue(&self, request: &Arc<DownloadRequest>) -> DownloadId {
        let id = request.id();
        let events = EventSink {
            tx: self.delivery_tx.clone(),
            callbacks: request.callbacks(),
        };

        if self.domain.is_cancelled() {
            tracing::warn!(id = %id, "Enqueue after cancel_all rejected");
            request.set_status(DownloadStatus::Failed);
            events.emit(DownloadEvent::Failed {
                id,
                error: EngineError::Shutdown.to_string(),
            });
            return id;
        }

        let signal = StopSignal::child_of(&self.domain);
        let task = TransferTask::new(
            Arc::clone(request),
            Arc::clone(&self.transport),
            signal.clone(),
            events,
            self.settings.clone(),
            self.limiter.clone(),
        );

        self.chain(id, signal, |previous| async move {
            if let Some(prev) = previous {
                let _ = prev.await;
            }
            task.run().await;
        });

        tracing::debug!(id = %id, "Execution scheduled");
        id
    }

    /// Stop the request's execution. Reported as `on_error("Cancelled")`,
    /// or as `on_pause` when `notify_pause` is enabled.
    pub fn pause(&self, request: &DownloadRequest) {
        self.stop(request, StopReason::Paused);
    }

    /// Stop the request's execution so that it reports `on_error("Cancelled")`
    pub fn cancel(&self, request: &DownloadRequest) {
        if !self.stop(request, StopReason::Cancelled) && self.settings.range_resume {
            // A paused range-resumable transfer leaves its temp file behind.
            // Chained so a later execution for the id starts after the removal.
            let temp_path = request.temp_path();
            let signal = StopSignal::child_of(&self.domain);
            self.chain(request.id(), signal, |previous| async move {
                if let Some(prev) = previous {
                    let _ = prev.await;
                }
                if let Err(e) = tokio::fs::remove_file(&temp_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::debug!("Failed to remove {:?}: {}", temp_path, e);
                    }
                }
            });
        }
    }

    /// Tear down the whole domain. Terminal: later `enqueue` calls fail.
    pub fn cancel_all(&self) {
        tracing::info!("Cancelling all transfers");
        self.domain.cancel();
    }

    /// Whether `cancel_all` has been called
    pub fn is_shutdown(&self) -> bool {
        self.domain.is_cancelled()
    }

    /// Receive every delivered event
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.event_tx.subscribe()
    }

    /// Status becomes `Cancelled` either way. Returns whether a live
    /// execution received the signal.
    fn stop(&self, request: &DownloadRequest, reason: StopReason) -> bool {
        request.set_status(DownloadStatus::Cancelled);
        let executions = self.executions.lock();
        match executions.get(&request.id()) {
            Some(handle) if handle.is_live() => {
                handle.signal.stop(reason);
                tracing::debug!(id = %request.id(), ?reason, "Stop signalled");
                true
            }
            _ => {
                tracing::debug!(id = %request.id(), ?reason, "No live execution to stop");
                false
            }
        }
    }

    /// Spawn `work` as the next execution for `id`, handing it the previous
    /// one (stopped as a cancel if still running) to await first
    fn chain<F, Fut>(&self, id: DownloadId, signal: StopSignal, work: F)
    where
        F: FnOnce(Option<JoinHandle<()>>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut executions = self.executions.lock();
        executions.retain(|other, handle| *other == id || handle.is_live());

        let previous = executions.remove(&id).map(|prev| {
            if prev.is_live() {
                tracing::debug!(id = %id, "Superseding running execution");
                prev.signal.stop(StopReason::Cancelled);
            }
            prev.task
        });

        let task = self.runtime.spawn(work(previous));
        executions.insert(id, ExecutionHandle { signal, task });
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.domain.cancel();
    }
}

/// Run hooks one event at a time, then fan the event out to subscribers
async fn run_delivery(
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    event_tx: broadcast::Sender<DownloadEvent>,
) {
    while let Some(Delivery { callbacks, event }) = rx.recv().await {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callbacks.invoke(&event)));
        if outcome.is_err() {
            tracing::warn!(id = %event.id(), "Download callback panicked");
        }
        let _ = event_tx.send(event);
    }
}
