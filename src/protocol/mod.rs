//! Protocol types for fetchq
//!
//! This module contains the types that cross the engine boundary:
//! - Transfer identity and status
//! - Byte counters
//! - Events emitted by the engine
//!
//! These types are serializable so they can be forwarded over IPC or logged
//! as structured data.

mod events;
mod types;

pub use events::DownloadEvent;
pub(crate) use types::AtomicStatus;
pub use types::{DownloadId, DownloadProgress, DownloadStatus};
