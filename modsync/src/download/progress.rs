//! Progress reporting for package downloads.
//!
//! Chunk workers update shared atomic counters; the chunked downloader
//! reports a snapshot after every wave. Single-connection downloads report
//! through [`ProgressWriter`] as bytes are written. Progress is informational
//! only and never affects the outcome of a download.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time view of one download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes received so far.
    pub bytes_done: u64,
    /// Expected size, when the server announced it.
    pub total_bytes: Option<u64>,
    /// Chunks stored (0 for single-connection downloads).
    pub chunks_done: usize,
    /// Chunks in the partition (0 for single-connection downloads).
    pub total_chunks: usize,
    /// Waves started so far.
    pub waves: usize,
    /// Failed chunk attempts so far.
    pub failures: usize,
}

/// Callback invoked with download progress.
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Callback invoked with the package name and its download progress.
pub type PackageProgressCallback = Arc<dyn Fn(&str, &DownloadProgress) + Send + Sync>;

/// Bind a package callback to one package.
pub fn for_package(callback: &PackageProgressCallback, package: &str) -> ProgressCallback {
    let callback = Arc::clone(callback);
    let package = package.to_string();
    Arc::new(move |progress: &DownloadProgress| callback(&package, progress))
}

/// Shared counters for a chunked download.
#[derive(Debug)]
pub struct ProgressCounters {
    bytes_done: AtomicU64,
    chunks_done: AtomicUsize,
    waves: AtomicUsize,
    failures: AtomicUsize,
    total_bytes: u64,
    total_chunks: usize,
}

impl ProgressCounters {
    /// Create counters for a download of `total_bytes` split into `total_chunks`.
    pub fn new(total_chunks: usize, total_bytes: u64) -> Self {
        Self {
            bytes_done: AtomicU64::new(0),
            chunks_done: AtomicUsize::new(0),
            waves: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            total_bytes,
            total_chunks,
        }
    }

    /// Record a stored chunk of `bytes` bytes.
    pub fn chunk_completed(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::SeqCst);
        self.chunks_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a failed chunk attempt; returns the new failure count.
    pub fn chunk_failed(&self) -> usize {
        self.failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record the start of a wave; returns its 1-based number.
    pub fn wave_started(&self) -> usize {
        self.waves.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn completed_chunks(&self) -> usize {
        self.chunks_done.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn waves(&self) -> usize {
        self.waves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> DownloadProgress {
        DownloadProgress {
            bytes_done: self.bytes_done.load(Ordering::SeqCst),
            total_bytes: Some(self.total_bytes),
            chunks_done: self.completed_chunks(),
            total_chunks: self.total_chunks,
            waves: self.waves(),
            failures: self.failures(),
        }
    }
}

/// Writer adapter that reports bytes passing through it.
pub struct ProgressWriter<'a, W: Write> {
    inner: W,
    progress: DownloadProgress,
    callback: Option<&'a ProgressCallback>,
}

impl<'a, W: Write> ProgressWriter<'a, W> {
    pub fn new(inner: W, total_bytes: Option<u64>, callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            inner,
            progress: DownloadProgress {
                total_bytes,
                ..Default::default()
            },
            callback,
        }
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.progress.bytes_done
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.progress.bytes_done += n as u64;
        if let Some(cb) = self.callback {
            cb(&self.progress);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
