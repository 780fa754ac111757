//! Durable installation registry.
//!
//! The registry maps package names to [`InstallRecord`]s and is the source of
//! truth between runs. It is loaded once, mutated in memory by the sequential
//! install phases, and saved after each phase so an interrupted run resumes
//! from the last completed phase.
//!
//! On disk it is a JSON object:
//!
//! ```json
//! {
//!   "modA": {
//!     "status": "EXTRACT_SUCCESS",
//!     "file_path": "mod_packages/modA.zip",
//!     "member_files": ["modA/", "modA/plugin.dll"],
//!     "url": "http://host/modA.zip"
//!   }
//! }
//! ```

mod record;
mod status;

pub use record::InstallRecord;
pub use status::{InstallStatus, StatusEvent};

use std::collections::btree_map::{self, BTreeMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ManagerError, ManagerResult};

/// Package name -> installation record, bound to the file it persists to.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    records: BTreeMap<String, InstallRecord>,
}

impl Registry {
    /// Create an empty registry that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Load the registry from `path`, or start empty if the file is absent.
    pub fn load(path: impl Into<PathBuf>) -> ManagerResult<Self> {
        let path = path.into();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no registry yet, starting empty");
            return Ok(Self::empty(path));
        }

        let content = fs::read(&path).map_err(|e| ManagerError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;

        let records: BTreeMap<String, InstallRecord> = serde_json::from_slice(&content)
            .map_err(|e| ManagerError::RegistryParseFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(path = %path.display(), packages = records.len(), "loaded registry");

        Ok(Self { path, records })
    }

    /// Persist the registry.
    ///
    /// Writes a sibling temporary file and renames it over the target, so a
    /// crash mid-write leaves the previous registry readable.
    pub fn save(&self) -> ManagerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let content = serde_json::to_vec_pretty(&self.records).map_err(|e| {
            ManagerError::WriteFailed {
                path: self.path.clone(),
                source: e.into(),
            }
        })?;

        let tmp_path = temp_path_for(&self.path);
        fs::write(&tmp_path, content).map_err(|e| ManagerError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| ManagerError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::trace!(path = %self.path.display(), packages = self.records.len(), "saved registry");
        Ok(())
    }

    /// File this registry persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&InstallRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut InstallRecord> {
        self.records.get_mut(name)
    }

    /// Track a new package. Returns `false` and leaves the existing record
    /// untouched when the name is already tracked.
    pub fn insert_new(&mut self, name: impl Into<String>, source_url: impl Into<String>) -> bool {
        match self.records.entry(name.into()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(InstallRecord::new(source_url));
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, name: impl Into<String>, record: InstallRecord) {
        self.records.insert(name.into(), record);
    }

    /// Stop tracking a package.
    pub fn remove(&mut self, name: &str) -> Option<InstallRecord> {
        self.records.remove(name)
    }

    /// Tracked package names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Names whose records satisfy `predicate`, collected so the caller can
    /// mutate the registry while walking them.
    pub fn names_where(&self, predicate: impl Fn(&InstallRecord) -> bool) -> Vec<String> {
        self.records
            .iter()
            .filter(|(_, record)| predicate(record))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstallRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
