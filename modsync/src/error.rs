//! Error types for the package synchronizer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::InstallStatus;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur while reconciling, downloading, extracting or
/// removing packages.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The manifest listing requested packages does not exist.
    #[error("manifest file {} not found, create it with the packages you want installed", .path.display())]
    ManifestNotFound { path: PathBuf },

    /// The manifest exists but is not a JSON object of name -> URL.
    #[error("failed to parse manifest {}: {reason}", .path.display())]
    ManifestParseFailed { path: PathBuf, reason: String },

    /// The persisted registry could not be decoded.
    #[error("failed to parse registry {}: {reason}", .path.display())]
    RegistryParseFailed { path: PathBuf, reason: String },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file or directory.
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to delete a file or directory.
    #[error("failed to remove {}: {source}", .path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Failed to download a package archive.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The server redirected more than once.
    #[error("too many redirects for {url}")]
    TooManyRedirects { url: String },

    /// Chunk failures used up the retry budget of a ranged download.
    #[error("giving up on {url}: {failures} chunk failures exceeded the retry budget of {budget}")]
    RetryBudgetExhausted {
        url: String,
        failures: usize,
        budget: usize,
    },

    /// The bytes written do not match the advertised content length.
    #[error("size mismatch for {}: expected {expected} bytes, wrote {actual}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The archive signature is not one we can extract.
    #[error("unsupported archive format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Archive extraction failed.
    #[error("failed to extract {}: {reason}", .path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    /// A status change that the installation lifecycle does not allow.
    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: InstallStatus,
        to: InstallStatus,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client could not be built or a request could not be formed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
}
