//! In-order reassembly of downloaded chunks and `.part` file handling.
//!
//! Workers finish in any order. Each payload lands in the slot of its chunk
//! index; once every slot is filled the slots are written sequentially, so
//! the file content never depends on completion order.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ManagerError, ManagerResult};

/// Buffer size for writing reassembled files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Preallocated, index-addressed storage for chunk payloads.
#[derive(Debug)]
pub struct ChunkSlots {
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

impl ChunkSlots {
    /// Create `count` empty slots.
    pub fn new(count: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; count]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Vec<u8>>>> {
        // A worker that panicked never holds the lock across a partial write
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the payload for chunk `index`.
    ///
    /// Returns `false` if the index is out of range or the slot was already
    /// filled; the first payload wins.
    pub fn fill(&self, index: usize, payload: Vec<u8>) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(index) {
            Some(slot @ None) => {
                *slot = Some(payload);
                true
            }
            _ => false,
        }
    }

    /// Number of filled slots.
    #[cfg(test)]
    pub fn filled(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Whether every slot holds a payload.
    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.lock().iter().all(Option::is_some)
    }

    /// Write every slot in index order to `part_path`.
    ///
    /// The total written must equal `expected_len`; on mismatch the part file
    /// is deleted and `SizeMismatch` returned. Returns the bytes written.
    pub fn write_in_order(self, part_path: &Path, expected_len: u64) -> ManagerResult<u64> {
        let slots = self
            .slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let written = write_slots(&slots, part_path)?;

        if written != expected_len {
            discard_part(part_path);
            return Err(ManagerError::SizeMismatch {
                path: part_path.to_path_buf(),
                expected: expected_len,
                actual: written,
            });
        }

        Ok(written)
    }
}

fn write_slots(slots: &[Option<Vec<u8>>], part_path: &Path) -> ManagerResult<u64> {
    let file = create_part(part_path)?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
    let mut written = 0u64;

    for (index, slot) in slots.iter().enumerate() {
        let Some(payload) = slot else {
            discard_part(part_path);
            return Err(ManagerError::DownloadFailed {
                url: part_path.display().to_string(),
                reason: format!("chunk {} missing at reassembly", index),
            });
        };

        writer
            .write_all(payload)
            .map_err(|e| ManagerError::WriteFailed {
                path: part_path.to_path_buf(),
                source: e,
            })?;
        written += payload.len() as u64;
    }

    writer.flush().map_err(|e| ManagerError::WriteFailed {
        path: part_path.to_path_buf(),
        source: e,
    })?;

    Ok(written)
}

/// Temporary download target for `dest`: `<dest>.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Create (or truncate) a part file, creating its directory first.
pub fn create_part(part_path: &Path) -> ManagerResult<File> {
    if let Some(parent) = part_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    File::create(part_path).map_err(|e| ManagerError::WriteFailed {
        path: part_path.to_path_buf(),
        source: e,
    })
}

/// Move a verified part file to its final name.
pub fn commit_part(part_path: &Path, dest: &Path) -> ManagerResult<()> {
    fs::rename(part_path, dest).map_err(|e| ManagerError::WriteFailed {
        path: dest.to_path_buf(),
        source: e,
    })
}

/// Best-effort removal of an abandoned part file.
pub fn discard_part(part_path: &Path) {
    if let Err(e) = fs::remove_file(part_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %part_path.display(), error = %e, "could not remove partial download");
        }
    }
}
