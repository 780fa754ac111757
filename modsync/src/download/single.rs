//! Whole-file download over one connection.

use std::io::{BufWriter, Write};
use std::path::Path;

use super::assembly::{commit_part, create_part, discard_part, part_path};
use super::progress::{ProgressCallback, ProgressWriter};
use super::transport::Transport;
use crate::error::{ManagerError, ManagerResult};

/// Buffer size for writing downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Stream `url` into `dest` through a `.part` file.
///
/// When the server announced `expected_len` the byte count must match before
/// the part file is renamed. Returns the number of bytes committed.
pub fn download_single(
    transport: &dyn Transport,
    url: &str,
    expected_len: Option<u64>,
    dest: &Path,
    progress: Option<&ProgressCallback>,
) -> ManagerResult<u64> {
    let part = part_path(dest);

    let result = stream_to_part(transport, url, expected_len, &part, progress)
        .and_then(|written| commit_part(&part, dest).map(|()| written));

    if result.is_err() {
        discard_part(&part);
    }
    result
}

fn stream_to_part(
    transport: &dyn Transport,
    url: &str,
    expected_len: Option<u64>,
    part: &Path,
    progress: Option<&ProgressCallback>,
) -> ManagerResult<u64> {
    let file = create_part(part)?;
    let mut writer = ProgressWriter::new(
        BufWriter::with_capacity(BUFFER_SIZE, file),
        expected_len,
        progress,
    );

    let written = transport.fetch_to(url, &mut writer)?;

    writer.flush().map_err(|e| ManagerError::WriteFailed {
        path: part.to_path_buf(),
        source: e,
    })?;

    if let Some(expected) = expected_len {
        if written != expected {
            return Err(ManagerError::SizeMismatch {
                path: part.to_path_buf(),
                expected,
                actual: written,
            });
        }
    }

    tracing::debug!(url, bytes = written, "single-connection download complete");
    Ok(written)
}
