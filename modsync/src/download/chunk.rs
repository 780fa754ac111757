//! Byte-range partitioning for chunked downloads.

use std::fmt;

/// One contiguous, inclusive byte range of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Position of this range in the file; also its slot in reassembly.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self { index, start, end }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the HTTP `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}-{}]", self.index, self.start, self.end)
    }
}

/// Split `[0, content_length)` into ranges of `chunk_size` bytes.
///
/// Produces `ceil(content_length / chunk_size)` ranges; the last one ends at
/// `content_length - 1` and may be shorter. An empty file yields no ranges.
pub fn partition(content_length: u64, chunk_size: u64) -> Vec<ByteRange> {
    let chunk_size = chunk_size.max(1);
    if content_length == 0 {
        return Vec::new();
    }

    let count = content_length.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(content_length) - 1;
            ByteRange::new(i as usize, start, end)
        })
        .collect()
}
