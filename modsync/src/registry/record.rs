//! Per-package installation record.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::status::{InstallStatus, StatusEvent};
use crate::error::ManagerResult;

/// Installation state of a single package.
///
/// Field names on disk follow the registry file format (`url`, `file_path`,
/// `member_files`), which predates this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Current lifecycle state.
    #[serde(default = "default_status")]
    pub status: InstallStatus,

    /// Resolved download location, rewritten after a redirect.
    #[serde(rename = "url")]
    pub source_url: String,

    /// Downloaded archive. Empty until a download succeeds.
    #[serde(rename = "file_path", default)]
    pub local_path: PathBuf,

    /// Paths produced by extraction, in archive order.
    #[serde(rename = "member_files", default)]
    pub member_paths: Vec<String>,
}

fn default_status() -> InstallStatus {
    InstallStatus::New
}

impl InstallRecord {
    /// Create a record for a package that has just appeared in the manifest.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            status: InstallStatus::New,
            source_url: source_url.into(),
            local_path: PathBuf::new(),
            member_paths: Vec::new(),
        }
    }

    /// Whether a downloaded archive path has been recorded.
    pub fn has_archive(&self) -> bool {
        !self.local_path.as_os_str().is_empty()
    }

    /// Record a successful download to `path`.
    pub fn record_download_success(&mut self, path: &Path) -> ManagerResult<()> {
        self.status = self.status.apply(StatusEvent::DownloadSucceeded)?;
        self.local_path = path.to_path_buf();
        Ok(())
    }

    /// Record a failed download; everything but the status is kept.
    pub fn record_download_failure(&mut self) -> ManagerResult<()> {
        self.status = self.status.apply(StatusEvent::DownloadFailed)?;
        Ok(())
    }

    /// Record a successful extraction and the members it produced.
    pub fn record_extract_success(&mut self, members: Vec<String>) -> ManagerResult<()> {
        self.status = self.status.apply(StatusEvent::ExtractSucceeded)?;
        self.member_paths = members;
        Ok(())
    }

    /// Record a failed extraction.
    pub fn record_extract_failure(&mut self) -> ManagerResult<()> {
        self.status = self.status.apply(StatusEvent::ExtractFailed)?;
        Ok(())
    }

    /// Mark the package's files as gone.
    pub fn mark_removed(&mut self) -> ManagerResult<()> {
        self.status = self.status.apply(StatusEvent::Removed)?;
        Ok(())
    }
}
