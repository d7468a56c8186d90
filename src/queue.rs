//! Request queue - identity-indexed registry of live requests
//!
//! The queue only looks requests up; executions and their I/O belong to the
//! dispatcher. None of its operations fail: unknown ids are ignored.

use crate::dispatcher::Dispatcher;
use crate::protocol::DownloadId;
use crate::request::DownloadRequest;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DownloadRequestQueue {
    requests: Mutex<HashMap<DownloadId, Arc<DownloadRequest>>>,
    dispatcher: Arc<Dispatcher>,
}

impl DownloadRequestQueue {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            dispatcher,
        }
    }

    /// Register the request (replacing one with the same id) and start it
    pub fn enqueue(&self, request: Arc<DownloadRequest>) -> DownloadId {
        let id = request.id();
        if self.dispatcher.is_shutdown() {
            return self.dispatcher.enqueue(&request);
        }

        let replaced = self
            .requests
            .lock()
            .insert(id, Arc::clone(&request))
            .is_some();

        tracing::info!(id = %id, url = %request.url(), replaced, "Download enqueued");
        self.dispatcher.enqueue(&request)
    }

    /// Stop the request's execution. It stays registered for `resume`.
    pub fn pause(&self, id: DownloadId) {
        match self.get(id) {
            Some(request) => self.dispatcher.pause(&request),
            None => tracing::debug!(id = %id, "Pause for unknown download ignored"),
        }
    }

    /// Start a fresh execution of a registered request
    pub fn resume(&self, id: DownloadId) {
        match self.get(id) {
            Some(request) => {
                tracing::debug!(id = %id, "Resuming download");
                self.dispatcher.enqueue(&request);
            }
            None => tracing::debug!(id = %id, "Resume for unknown download ignored"),
        }
    }

    /// Stop the request's execution and forget it
    pub fn cancel(&self, id: DownloadId) {
        let removed = self.requests.lock().remove(&id);
        match removed {
            Some(request) => self.dispatcher.cancel(&request),
            None => tracing::debug!(id = %id, "Cancel for unknown download ignored"),
        }
    }

    /// Cancel every registered request carrying `tag`
    pub fn cancel_tag(&self, tag: &str) {
        let ids: Vec<DownloadId> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.tag() == Some(tag))
            .map(|r| r.id())
            .collect();

        tracing::debug!(tag, count = ids.len(), "Cancelling tagged downloads");
        for id in ids {
            self.cancel(id);
        }
    }

    /// Forget everything and tear the dispatcher down
    pub fn cancel_all(&self) {
        self.requests.lock().clear();
        self.dispatcher.cancel_all();
    }

    pub fn get(&self, id: DownloadId) -> Option<Arc<DownloadRequest>> {
        self.requests.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<DownloadId> {
        self.requests.lock().keys().copied().collect()
    }

    /// Registered requests in no particular order
    pub fn requests(&self) -> Vec<Arc<DownloadRequest>> {
        self.requests.lock().values().cloned().collect()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
