//! Outcomes of the install phases.

use std::fmt;

use crate::registry::InstallStatus;

/// One of the sequential phases of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Remove,
    Download,
    Extract,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Remove => write!(f, "remove"),
            Phase::Download => write!(f, "download"),
            Phase::Extract => write!(f, "extract"),
        }
    }
}

/// A package a phase could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    pub name: String,
    pub error: String,
}

/// What one phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub succeeded: Vec<String>,
    pub failed: Vec<PackageFailure>,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn record_success(&mut self, name: &str) {
        self.succeeded.push(name.to_string());
    }

    pub fn record_failure(&mut self, name: &str, error: impl fmt::Display) {
        self.failed.push(PackageFailure {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    /// Packages the phase attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of a full sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub removal: PhaseReport,
    pub download: PhaseReport,
    pub extraction: PhaseReport,
    /// Final status of every package touched or tracked, sorted by name.
    /// Removed packages appear with `REMOVED`.
    pub statuses: Vec<(String, InstallStatus)>,
}

impl RunSummary {
    /// Whether any package failed in any phase.
    pub fn has_failures(&self) -> bool {
        !(self.removal.is_clean() && self.download.is_clean() && self.extraction.is_clean())
    }

    /// Names whose final status is a failure state.
    pub fn failed_packages(&self) -> impl Iterator<Item = &str> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_failure())
            .map(|(name, _)| name.as_str())
    }
}
