//! Installation status and its lifecycle.
//!
//! ```text
//! NEW ──download──► DOWNLOAD_SUCCESS ──extract──► EXTRACT_SUCCESS
//!  │                  ▲        │                     ▲
//!  ▼                  │        ▼                     │
//! DOWNLOAD_FAILED ────┘      EXTRACT_FAILED ─────────┘
//!
//! any state except REMOVED ──remove──► REMOVED
//! ```
//!
//! Failed states are retried on the next run. Transitions go through
//! [`InstallStatus::apply`] so an illegal change is an error instead of a
//! silently corrupted registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, ManagerResult};

/// Where a package is in its install lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallStatus {
    /// Listed in the manifest, nothing attempted yet.
    New,
    /// The last download attempt failed.
    DownloadFailed,
    /// The archive is on disk.
    DownloadSuccess,
    /// The last extraction attempt failed.
    ExtractFailed,
    /// Extracted; member paths are recorded.
    ///
    /// `OK` is what older registries stored for this state.
    #[serde(alias = "OK")]
    ExtractSuccess,
    /// Files were removed; the record is about to leave the registry.
    Removed,
}

/// Something that happened to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    DownloadSucceeded,
    DownloadFailed,
    ExtractSucceeded,
    ExtractFailed,
    Removed,
}

impl StatusEvent {
    /// The status this event leads to when it is allowed.
    fn target(self) -> InstallStatus {
        match self {
            Self::DownloadSucceeded => InstallStatus::DownloadSuccess,
            Self::DownloadFailed => InstallStatus::DownloadFailed,
            Self::ExtractSucceeded => InstallStatus::ExtractSuccess,
            Self::ExtractFailed => InstallStatus::ExtractFailed,
            Self::Removed => InstallStatus::Removed,
        }
    }
}

impl InstallStatus {
    /// All states, in lifecycle order.
    pub const ALL: [InstallStatus; 6] = [
        Self::New,
        Self::DownloadFailed,
        Self::DownloadSuccess,
        Self::ExtractFailed,
        Self::ExtractSuccess,
        Self::Removed,
    ];

    /// The persisted spelling of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::DownloadSuccess => "DOWNLOAD_SUCCESS",
            Self::ExtractFailed => "EXTRACT_FAILED",
            Self::ExtractSuccess => "EXTRACT_SUCCESS",
            Self::Removed => "REMOVED",
        }
    }

    /// Whether the fetcher should (re)download this package.
    pub fn needs_download(&self) -> bool {
        matches!(self, Self::New | Self::DownloadFailed)
    }

    /// Whether the extractor should (re)extract this package.
    pub fn needs_extract(&self) -> bool {
        matches!(self, Self::DownloadSuccess | Self::ExtractFailed)
    }

    /// Whether the last attempt at this package failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::DownloadFailed | Self::ExtractFailed)
    }

    /// Validate and compute the status after `event`.
    pub fn apply(self, event: StatusEvent) -> ManagerResult<InstallStatus> {
        let allowed = match event {
            StatusEvent::DownloadSucceeded | StatusEvent::DownloadFailed => self.needs_download(),
            StatusEvent::ExtractSucceeded | StatusEvent::ExtractFailed => self.needs_extract(),
            StatusEvent::Removed => self != Self::Removed,
        };

        if allowed {
            Ok(event.target())
        } else {
            Err(ManagerError::IllegalTransition {
                from: self,
                to: event.target(),
            })
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
