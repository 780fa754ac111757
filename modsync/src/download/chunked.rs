//! Range-partitioned download over several connections.
//!
//! The file is split into fixed-size ranges. Ranges are drawn from a queue in
//! waves of at most `connections` concurrent requests; every wave is joined
//! before the next one starts. A failed range goes back on the queue and
//! counts against a retry budget shared by the whole download. Payloads are
//! reassembled strictly by chunk index and committed only when every byte is
//! accounted for.

use std::collections::VecDeque;
use std::path::Path;
use std::thread;

use super::assembly::{commit_part, discard_part, part_path, ChunkSlots};
use super::chunk::{partition, ByteRange};
use super::progress::{ProgressCallback, ProgressCounters};
use super::transport::Transport;
use crate::config::{DEFAULT_CONNECTIONS, DEFAULT_RETRY_BUDGET_FACTOR};
use crate::error::{ManagerError, ManagerResult};

/// Multi-connection downloader for servers that accept byte ranges.
#[derive(Debug, Clone)]
pub struct ChunkedFetcher {
    /// Bytes per range request.
    pub chunk_size: u64,
    /// Maximum concurrent range requests (minimum 1).
    pub connections: usize,
    /// Failed attempts allowed, as a multiple of the chunk count.
    pub retry_budget_factor: f64,
}

impl ChunkedFetcher {
    /// Create a chunked fetcher.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - Bytes per range request (minimum 1)
    /// * `connections` - Maximum concurrent requests per wave (minimum 1)
    /// * `retry_budget_factor` - Failure budget multiplier
    pub fn new(chunk_size: u64, connections: usize, retry_budget_factor: f64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            connections: connections.max(1),
            retry_budget_factor,
        }
    }

    /// Failed chunk attempts tolerated for a download of `chunks` ranges.
    pub fn retry_budget(&self, chunks: usize) -> usize {
        (chunks as f64 * self.retry_budget_factor).floor() as usize
    }

    /// Download `content_length` bytes of `url` into `dest`.
    ///
    /// Nothing is written under `dest` unless every range arrived and the
    /// reassembled size matches. Returns the number of bytes committed.
    pub fn download(
        &self,
        transport: &dyn Transport,
        url: &str,
        content_length: u64,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> ManagerResult<u64> {
        let ranges = partition(content_length, self.chunk_size);
        let total_chunks = ranges.len();
        let budget = self.retry_budget(total_chunks);

        tracing::debug!(
            url,
            bytes = content_length,
            chunks = total_chunks,
            connections = self.connections,
            budget,
            "starting chunked download"
        );

        let slots = ChunkSlots::new(total_chunks);
        let counters = ProgressCounters::new(total_chunks, content_length);
        let mut pending: VecDeque<ByteRange> = ranges.into();

        while !pending.is_empty() {
            let wave_len = self.connections.min(pending.len());
            let wave: Vec<ByteRange> = pending.drain(..wave_len).collect();
            let wave_number = counters.wave_started();

            tracing::trace!(url, wave = wave_number, chunks = wave.len(), "wave started");

            for (range, outcome) in run_wave(transport, url, &wave, &slots) {
                match outcome {
                    Ok(bytes) => counters.chunk_completed(bytes),
                    Err(e) => {
                        let failures = counters.chunk_failed();
                        tracing::debug!(
                            url,
                            chunk = range.index,
                            failures,
                            budget,
                            error = %e,
                            "chunk failed, requeueing"
                        );

                        if failures > budget {
                            tracing::warn!(url, failures, budget, "retry budget exhausted");
                            return Err(ManagerError::RetryBudgetExhausted {
                                url: url.to_string(),
                                failures,
                                budget,
                            });
                        }
                        pending.push_back(range);
                    }
                }
            }

            if let Some(cb) = progress {
                cb(&counters.snapshot());
            }
        }

        let part = part_path(dest);
        let written = match slots
            .write_in_order(&part, content_length)
            .and_then(|written| commit_part(&part, dest).map(|()| written))
        {
            Ok(written) => written,
            Err(e) => {
                discard_part(&part);
                return Err(e);
            }
        };

        tracing::debug!(
            url,
            bytes = written,
            waves = counters.waves(),
            failures = counters.failures(),
            "chunked download complete"
        );

        Ok(written)
    }
}

impl Default for ChunkedFetcher {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_CHUNK_SIZE,
            DEFAULT_CONNECTIONS,
            DEFAULT_RETRY_BUDGET_FACTOR,
        )
    }
}

/// Fetch every range of a wave concurrently and wait for all of them.
fn run_wave(
    transport: &dyn Transport,
    url: &str,
    wave: &[ByteRange],
    slots: &ChunkSlots,
) -> Vec<(ByteRange, ManagerResult<u64>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = wave
            .iter()
            .map(|&range| {
                let handle = scope.spawn(move || fetch_chunk(transport, url, &range, slots));
                (range, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(range, handle)| {
                let outcome = handle.join().unwrap_or_else(|_| {
                    Err(ManagerError::DownloadFailed {
                        url: url.to_string(),
                        reason: format!("worker for chunk {} panicked", range.index),
                    })
                });
                (range, outcome)
            })
            .collect()
    })
}

/// Fetch one range and store it in its slot. Returns the payload size.
fn fetch_chunk(
    transport: &dyn Transport,
    url: &str,
    range: &ByteRange,
    slots: &ChunkSlots,
) -> ManagerResult<u64> {
    let payload = transport.fetch_range(url, range)?;

    if payload.len() as u64 != range.len() {
        return Err(ManagerError::DownloadFailed {
            url: url.to_string(),
            reason: format!(
                "chunk {} returned {} bytes, expected {}",
                range,
                payload.len(),
                range.len()
            ),
        });
    }

    let bytes = payload.len() as u64;
    slots.fill(range.index, payload);
    Ok(bytes)
}
