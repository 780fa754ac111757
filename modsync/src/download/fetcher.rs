//! Per-package download dispatch.
//!
//! For each package that needs downloading the fetcher probes its URL
//! (following at most one redirect), picks the chunked or single-connection
//! path, and records the outcome on the package's registry record. A failure
//! only affects its own package.
//!
//! Servers that refuse HEAD are downloaded over one connection with an
//! unknown length. Google Drive share links are rewritten to their direct
//! download endpoint first.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::chunked::ChunkedFetcher;
use super::drive::direct_download_url;
use super::filename::{display_name, resolve_file_name};
use super::progress::{for_package, PackageProgressCallback, ProgressCallback};
use super::single::download_single;
use super::transport::{ProbeResponse, Transport};
use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::registry::{InstallRecord, Registry, StatusEvent};
use crate::report::{Phase, PhaseReport};

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    /// URL the bytes came from after redirect resolution.
    pub resolved_url: String,
    /// Committed archive path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// Whether the ranged path was used.
    pub chunked: bool,
}

/// Downloads package archives into the download directory.
#[derive(Debug, Clone)]
pub struct Fetcher {
    download_dir: PathBuf,
    chunk_threshold: u64,
    chunked: ChunkedFetcher,
}

impl Fetcher {
    pub fn new(download_dir: impl Into<PathBuf>, chunk_threshold: u64, chunked: ChunkedFetcher) -> Self {
        Self {
            download_dir: download_dir.into(),
            chunk_threshold,
            chunked,
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            &config.download_dir,
            config.chunk_threshold,
            ChunkedFetcher::new(
                config.chunk_size,
                config.num_connections,
                config.retry_budget_factor,
            ),
        )
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Download every package whose status calls for it, except those in
    /// `skip`.
    ///
    /// Records are updated in place; the caller persists the registry. An
    /// archive name already recorded for another package is never reused.
    pub fn fetch_pending(
        &self,
        transport: &dyn Transport,
        registry: &mut Registry,
        skip: &BTreeSet<String>,
        progress: Option<&PackageProgressCallback>,
    ) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Download);

        for name in registry.names_where(|record| record.status.needs_download()) {
            if skip.contains(&name) {
                tracing::debug!(package = %name, "pending removal, not downloading");
                continue;
            }

            let claimed: BTreeSet<PathBuf> = registry
                .iter()
                .filter(|(other, record)| *other != name && record.has_archive())
                .map(|(_, record)| record.local_path.clone())
                .collect();

            let Some(record) = registry.get_mut(&name) else {
                continue;
            };

            let callback = progress.map(|cb| for_package(cb, &name));
            match self.fetch_unclaimed(transport, &name, record, &claimed, callback.as_ref()) {
                Ok(archive) => {
                    tracing::info!(
                        package = %name,
                        path = %archive.path.display(),
                        bytes = archive.bytes,
                        chunked = archive.chunked,
                        "download complete"
                    );
                    report.record_success(&name);
                }
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "download failed");
                    report.record_failure(&name, e);
                }
            }
        }

        report
    }

    /// Download one package and record the outcome on `record`.
    ///
    /// On failure the status becomes `DOWNLOAD_FAILED` and every other field
    /// is left as it was.
    pub fn fetch(
        &self,
        transport: &dyn Transport,
        name: &str,
        record: &mut InstallRecord,
        progress: Option<&ProgressCallback>,
    ) -> ManagerResult<FetchedArchive> {
        self.fetch_unclaimed(transport, name, record, &BTreeSet::new(), progress)
    }

    /// Like [`Fetcher::fetch`], but never writes to a path in `claimed`.
    pub fn fetch_unclaimed(
        &self,
        transport: &dyn Transport,
        name: &str,
        record: &mut InstallRecord,
        claimed: &BTreeSet<PathBuf>,
        progress: Option<&ProgressCallback>,
    ) -> ManagerResult<FetchedArchive> {
        // Reject records that are not waiting for a download before touching the network
        record.status.apply(StatusEvent::DownloadSucceeded)?;

        match self.download(transport, name, &record.source_url, claimed, progress) {
            Ok(archive) => {
                record.record_download_success(&archive.path)?;
                record.source_url = archive.resolved_url.clone();
                Ok(archive)
            }
            Err(e) => {
                record.record_download_failure()?;
                Err(e)
            }
        }
    }

    fn download(
        &self,
        transport: &dyn Transport,
        name: &str,
        url: &str,
        claimed: &BTreeSet<PathBuf>,
        progress: Option<&ProgressCallback>,
    ) -> ManagerResult<FetchedArchive> {
        let drive_url = direct_download_url(url);
        if let Some(direct) = &drive_url {
            tracing::debug!(package = name, from = url, to = %direct, "using Google Drive download link");
        }
        let (resolved_url, probe) = resolve(transport, drive_url.as_deref().unwrap_or(url))?;

        if drive_url.is_some() && probe.is_html() {
            return Err(ManagerError::DownloadFailed {
                url: resolved_url,
                reason: "Google Drive returned a web page instead of the file; \
                         check that the file is shared publicly"
                    .to_string(),
            });
        }

        let file_name = resolve_file_name(probe.content_disposition.as_deref(), &resolved_url, name);
        let dest = self.unclaimed_path(name, &file_name, claimed);

        let use_chunks = match probe.content_length {
            Some(len) => probe.accept_ranges && len > self.chunk_threshold,
            None => false,
        };

        tracing::info!(
            package = name,
            file = display_name(&file_name),
            bytes = ?probe.content_length,
            chunked = use_chunks,
            "downloading"
        );

        let bytes = match probe.content_length {
            Some(len) if use_chunks => {
                self.chunked
                    .download(transport, &resolved_url, len, &dest, progress)?
            }
            expected => download_single(transport, &resolved_url, expected, &dest, progress)?,
        };

        Ok(FetchedArchive {
            resolved_url,
            path: dest,
            bytes,
            chunked: use_chunks,
        })
    }

    /// `file_name` in the download directory, prefixed with the package name
    /// when another package already owns that path.
    fn unclaimed_path(&self, package: &str, file_name: &str, claimed: &BTreeSet<PathBuf>) -> PathBuf {
        let plain = self.download_dir.join(file_name);
        if !claimed.contains(&plain) {
            return plain;
        }

        let package: String = package.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
        let mut candidate = self.download_dir.join(format!("{}_{}", package, file_name));
        let mut n = 2;
        while claimed.contains(&candidate) {
            candidate = self
                .download_dir
                .join(format!("{}_{}_{}", package, n, file_name));
            n += 1;
        }

        tracing::debug!(
            package = %package,
            taken = %plain.display(),
            using = %candidate.display(),
            "archive name already used by another package"
        );
        candidate
    }
}

/// Probe `url`, following a single redirect hop.
///
/// Returns the URL that answered and its probe. A second redirect is
/// `TooManyRedirects`. A server that refuses HEAD yields an empty `ProbeResponse`, so
/// the caller downloads over one connection without a known length. Any other
/// non-2xx answer is `DownloadFailed`.
pub fn resolve(transport: &dyn Transport, url: &str) -> ManagerResult<(String, ProbeResponse)> {
    let probe = transport.probe(url)?;

    let (resolved, probe) = match probe.location.clone() {
        Some(location) if probe.is_redirect() => {
            let next = join_location(url, &location)?;
            tracing::debug!(from = url, to = %next, "following redirect");

            let second = transport.probe(&next)?;
            if second.is_redirect() {
                return Err(ManagerError::TooManyRedirects { url: url.to_string() });
            }
            (next, second)
        }
        _ => (url.to_string(), probe),
    };

    if probe.head_unsupported() {
        tracing::debug!(url = %resolved, status = probe.status, "HEAD refused, falling back to GET");
        return Ok((
            resolved,
            ProbeResponse {
                status: probe.status,
                ..Default::default()
            },
        ));
    }

    if !probe.is_success() {
        return Err(ManagerError::DownloadFailed {
            url: resolved,
            reason: format!("HEAD request failed with status {}", probe.status),
        });
    }

    Ok((resolved, probe))
}

fn join_location(base: &str, location: &str) -> ManagerResult<String> {
    let invalid = |reason: String| ManagerError::DownloadFailed {
        url: base.to_string(),
        reason,
    };

    let base_url = reqwest::Url::parse(base).map_err(|e| invalid(format!("invalid URL: {}", e)))?;
    base_url
        .join(location)
        .map(String::from)
        .map_err(|e| invalid(format!("invalid redirect location {:?}: {}", location, e)))
}
