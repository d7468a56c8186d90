//! Download requests
//!
//! A [`DownloadRequest`] is the immutable description of one transfer plus
//! the runtime fields its executions update. Requests are built through
//! [`DownloadRequestBuilder`], which validates input up front.

use crate::error::{EngineError, Result, StorageErrorKind};
use crate::protocol::{AtomicStatus, DownloadEvent, DownloadId, DownloadProgress, DownloadStatus};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Suffix appended to the file name while a transfer is in flight
pub const TEMP_SUFFIX: &str = "temp";

type Hook = Box<dyn Fn() + Send + Sync>;
type ProgressHook = Box<dyn Fn(u8) + Send + Sync>;
type ErrorHook = Box<dyn Fn(String) + Send + Sync>;

/// Lifecycle hooks for one request.
///
/// Every hook is optional. Hooks run on the dispatcher's delivery loop, one
/// at a time, in the order the execution emitted them.
#[derive(Default)]
pub struct DownloadCallbacks {
    on_start: Option<Hook>,
    on_progress: Option<ProgressHook>,
    on_pause: Option<Hook>,
    on_completed: Option<Hook>,
    on_error: Option<ErrorHook>,
}

impl DownloadCallbacks {
    /// Create an empty set of hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when an execution starts
    pub fn on_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    /// Called after every written chunk with the integer percentage
    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Called when an execution stops because of `pause`, if the downloader
    /// was built with `notify_pause`. Otherwise a pause reports through
    /// `on_error("Cancelled")`.
    pub fn on_pause(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_pause = Some(Box::new(f));
        self
    }

    /// Called once the file sits at its final path
    pub fn on_completed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_completed = Some(Box::new(f));
        self
    }

    /// Called with a message when an execution fails or is cancelled
    pub fn on_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Route an event to the matching hook
    pub(crate) fn invoke(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Started { .. } => {
                if let Some(f) = &self.on_start {
                    f();
                }
            }
            DownloadEvent::Progress { percent, .. } => {
                if let Some(f) = &self.on_progress {
                    f(*percent);
                }
            }
            DownloadEvent::Paused { .. } => {
                if let Some(f) = &self.on_pause {
                    f();
                }
            }
            DownloadEvent::Completed { .. } => {
                if let Some(f) = &self.on_completed {
                    f();
                }
            }
            DownloadEvent::Failed { error, .. } => {
                if let Some(f) = &self.on_error {
                    f(error.clone());
                }
            }
        }
    }
}

impl std::fmt::Debug for DownloadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_pause", &self.on_pause.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// A single transfer: what to fetch, where to put it, and how far it got
pub struct DownloadRequest {
    id: DownloadId,
    tag: Option<String>,
    dir: PathBuf,
    file_name: String,
    read_timeout: Duration,
    connect_timeout: Duration,
    headers: Vec<(String, String)>,
    callbacks: Arc<DownloadCallbacks>,

    /// Updated when the transport reports a redirect
    url: RwLock<String>,
    status: AtomicStatus,
    total_bytes: AtomicU64,
    downloaded_bytes: AtomicU64,
}

impl DownloadRequest {
    /// Start building a request
    pub fn builder(
        url: impl Into<String>,
        dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> DownloadRequestBuilder {
        DownloadRequestBuilder::new(url, dir, file_name)
    }

    /// Attach lifecycle hooks, replacing any set before
    pub fn with_callbacks(mut self, callbacks: DownloadCallbacks) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    pub fn id(&self) -> DownloadId {
        self.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Current URL (may differ from the submitted one after a redirect)
    pub fn url(&self) -> String {
        self.url.read().clone()
    }

    pub fn status(&self) -> DownloadStatus {
        self.status.load()
    }

    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            total_bytes: self.total_bytes.load(Ordering::Acquire),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Acquire),
        }
    }

    /// Where the file lands on success
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Where bytes are written while the transfer runs
    pub fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.file_name, TEMP_SUFFIX))
    }

    /// Point-in-time view for polling UIs
    pub fn snapshot(&self) -> DownloadInfo {
        DownloadInfo {
            id: self.id,
            url: self.url(),
            tag: self.tag.clone(),
            path: self.final_path(),
            status: self.status(),
            progress: self.progress(),
        }
    }

    pub(crate) fn callbacks(&self) -> Arc<DownloadCallbacks> {
        Arc::clone(&self.callbacks)
    }

    pub(crate) fn set_status(&self, status: DownloadStatus) {
        self.status.store(status);
    }

    pub(crate) fn set_url(&self, url: &str) {
        *self.url.write() = url.to_string();
    }

    pub(crate) fn set_total_bytes(&self, total: u64) {
        self.total_bytes.store(total, Ordering::Release);
    }

    pub(crate) fn set_downloaded_bytes(&self, downloaded: u64) {
        self.downloaded_bytes.store(downloaded, Ordering::Release);
    }

    /// Add to the byte counter, returning the new value
    pub(crate) fn add_downloaded_bytes(&self, n: u64) -> u64 {
        self.downloaded_bytes.fetch_add(n, Ordering::AcqRel) + n
    }
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("id", &self.id)
            .field("url", &*self.url.read())
            .field("tag", &self.tag)
            .field("dir", &self.dir)
            .field("file_name", &self.file_name)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub id: DownloadId,
    pub url: String,
    pub tag: Option<String>,
    pub path: PathBuf,
    pub status: DownloadStatus,
    pub progress: DownloadProgress,
}

/// Builder for [`DownloadRequest`]
#[derive(Debug, Clone)]
pub struct DownloadRequestBuilder {
    url: String,
    dir: PathBuf,
    file_name: String,
    tag: Option<String>,
    read_timeout: Duration,
    connect_timeout: Duration,
    headers: Vec<(String, String)>,
}

impl DownloadRequestBuilder {
    /// Create a builder for the given transfer triple
    pub fn new(url: impl Into<String>, dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dir: dir.into(),
            file_name: file_name.into(),
            tag: None,
            read_timeout: Duration::ZERO,
            connect_timeout: Duration::ZERO,
            headers: Vec::new(),
        }
    }

    /// Group label used by `cancel_tag`
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Per-read timeout (zero disables it)
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Connect timeout (zero disables it)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add one request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several request headers
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Validate and build the request
    pub fn build(self) -> Result<DownloadRequest> {
        let parsed = Url::parse(&self.url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(EngineError::invalid_input(
                    "url",
                    format!("Unsupported scheme: {}", scheme),
                ));
            }
        }

        validate_file_name(&self.file_name)?;

        let id = DownloadId::derive(&self.url, &self.dir, &self.file_name);

        Ok(DownloadRequest {
            id,
            tag: self.tag,
            dir: self.dir,
            file_name: self.file_name,
            read_timeout: self.read_timeout,
            connect_timeout: self.connect_timeout,
            headers: self.headers,
            callbacks: Arc::new(DownloadCallbacks::default()),
            url: RwLock::new(self.url),
            status: AtomicStatus::default(),
            total_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
        })
    }
}

/// The file name must stay inside the destination directory
fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.trim().is_empty() {
        return Err(EngineError::invalid_input("file_name", "Must not be empty"));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(EngineError::storage(
            StorageErrorKind::PathTraversal,
            file_name,
            "Invalid filename: contains parent directory reference (..)",
        )),
        (Some(Component::RootDir | Component::Prefix(_)), _) => Err(EngineError::storage(
            StorageErrorKind::PathTraversal,
            file_name,
            "Invalid filename: contains absolute path",
        )),
        _ => Err(EngineError::invalid_input(
            "file_name",
            "Must be a single file name without separators",
        )),
    }
}
