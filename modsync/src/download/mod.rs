//! HTTP download of package archives.
//!
//! This module provides:
//! - A network seam with a blocking `reqwest` implementation (`transport`)
//! - Byte-range partitioning (`chunk`)
//! - Slot-based in-order reassembly and `.part` handling (`assembly`)
//! - The wave-scheduled multi-connection downloader (`chunked`)
//! - The single-connection downloader (`single`)
//! - File naming from `content-disposition` and URLs (`filename`)
//! - Google Drive share link rewriting (`drive`)
//! - Progress counters and callbacks (`progress`)
//! - Per-package dispatch and status recording (`fetcher`)
//!
//! # Architecture
//!
//! ```text
//! Fetcher
//!    │  Drive link rewrite, HEAD probe, one redirect hop
//!    │
//!    ├── accept-ranges && size > threshold
//!    │       └── ChunkedFetcher ── waves of Transport::fetch_range
//!    │                 └── ChunkSlots ── write in index order ── rename .part
//!    │
//!    └── otherwise, or HEAD refused
//!            └── download_single ── Transport::fetch_to ── rename .part
//! ```

mod assembly;
mod chunk;
mod chunked;
mod drive;
mod fetcher;
mod filename;
mod progress;
mod single;
mod transport;

pub use assembly::{part_path, ChunkSlots};
pub use chunk::{partition, ByteRange};
pub use chunked::ChunkedFetcher;
pub use drive::{direct_download_url, drive_file_id};
pub use fetcher::{resolve, FetchedArchive, Fetcher};
pub use filename::{display_name, parse_content_disposition_filename, resolve_file_name};
pub use progress::{
    for_package, DownloadProgress, PackageProgressCallback, ProgressCallback, ProgressCounters,
};
pub use single::download_single;
pub use transport::{HttpTransport, ProbeResponse, Transport};
