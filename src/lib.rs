//! # fetchq
//!
//! A queue-based file downloader built on Tokio.
//!
//! ## Features
//!
//! - **Queue control**: pause, resume and cancel by id, cancel a whole group by tag
//! - **Safe output**: bytes land in `<file>.temp` and are renamed into place on success
//! - **Lifecycle hooks**: per-request callbacks, delivered in order from one loop
//! - **Event stream**: every hook invocation is also broadcast to subscribers
//! - **Pluggable transport**: reqwest-backed HTTP by default, bring your own otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetchq::{DownloadCallbacks, Downloader, DownloaderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = Downloader::new(DownloaderConfig::default())?;
//!
//!     let request = downloader
//!         .new_request("https://example.com/file.zip", "/tmp/downloads", "file.zip")
//!         .tag("docs")
//!         .build()?;
//!
//!     let callbacks = DownloadCallbacks::new()
//!         .on_progress(|pct| println!("{pct}%"))
//!         .on_completed(|| println!("done"))
//!         .on_error(|msg| eprintln!("failed: {msg}"));
//!
//!     let id = downloader.enqueue(request, callbacks);
//!
//!     let mut events = downloader.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if event.id() == id && event.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Modules
pub mod config;
pub mod dispatcher;
pub mod downloader;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod request;
mod task;
pub mod transport;

// Re-exports for convenience
pub use config::DownloaderConfig;
pub use dispatcher::Dispatcher;
pub use downloader::Downloader;
pub use error::{EngineError, NetworkErrorKind, Result, StorageErrorKind};
pub use protocol::{DownloadEvent, DownloadId, DownloadProgress, DownloadStatus};
pub use queue::DownloadRequestQueue;
pub use request::{DownloadCallbacks, DownloadInfo, DownloadRequest, DownloadRequestBuilder};
pub use task::{StopReason, StopSignal};
pub use transport::{BodyReader, ConnectRequest, Connection, Transport};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
