//! Download events
//!
//! Events emitted by a transfer execution. Each one is handed to the
//! request's callbacks and then broadcast to subscribers.

use super::types::DownloadId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events emitted by the dispatcher's delivery loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadEvent {
    /// Execution started (`on_start`)
    Started { id: DownloadId },
    /// A chunk was written (`on_progress`)
    Progress {
        id: DownloadId,
        percent: u8,
        downloaded_bytes: u64,
        total_bytes: u64,
    },
    /// Execution stopped by `pause` with `notify_pause` on (`on_pause`)
    Paused { id: DownloadId },
    /// File renamed to its final path (`on_completed`)
    Completed { id: DownloadId, path: PathBuf },
    /// Execution failed or was cancelled (`on_error`)
    Failed { id: DownloadId, error: String },
}

impl DownloadEvent {
    /// The request this event belongs to
    pub fn id(&self) -> DownloadId {
        match self {
            Self::Started { id }
            | Self::Progress { id, .. }
            | Self::Paused { id }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. } => *id,
        }
    }

    /// Whether this event ends an execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paused { .. } | Self::Completed { .. } | Self::Failed { .. }
        )
    }
}
