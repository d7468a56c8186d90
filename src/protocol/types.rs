//! Core protocol types
//!
//! Fundamental types used throughout the protocol.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// Deterministic identifier for a transfer.
///
/// Derived from `(url, directory, file name)` so that resubmitting the same
/// logical transfer, even from a later process, maps to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(u64);

impl DownloadId {
    /// Derive the id for a transfer triple
    pub fn derive(url: &str, dir: &Path, file_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(dir.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(file_name.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(bytes))
    }

    /// Wrap a raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(format!("Invalid download id: {}", s));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| format!("Invalid download id: {}", s))
    }
}

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DownloadStatus {
    /// Never started, or the last execution had nothing to transfer
    #[default]
    Unknown = 0,
    /// An execution is connecting or streaming
    InProgress = 1,
    /// The file is at its final path
    Completed = 2,
    /// Stopped by pause, cancel or cancel-all
    Cancelled = 3,
    /// The last execution failed
    Failed = 4,
}

impl DownloadStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::InProgress,
            2 => Self::Completed,
            3 => Self::Cancelled,
            4 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Check if the status is terminal for the current execution
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::InProgress => write!(f, "in progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lock-free cell holding a [`DownloadStatus`]
#[derive(Debug, Default)]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) fn load(&self) -> DownloadStatus {
        DownloadStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: DownloadStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// Byte counters for a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Advertised length, 0 while unknown
    pub total_bytes: u64,
    /// Bytes written to the temp file so far
    pub downloaded_bytes: u64,
}

impl DownloadProgress {
    /// Integer percentage, truncating. Always 0 while the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let pct = (self.downloaded_bytes as u128 * 100) / self.total_bytes as u128;
        pct.min(100) as u8
    }
}
