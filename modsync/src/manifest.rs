//! Requested-package manifest.
//!
//! A JSON object mapping package names to download URLs:
//!
//! ```json
//! { "modA": "https://host/modA.zip", "modB": "https://host/modB.7z" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ManagerError, ManagerResult};

/// The packages the user wants installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Load the manifest from disk.
    ///
    /// A missing file is fatal: without a target list there is nothing the
    /// installer can safely do.
    pub fn load(path: &Path) -> ManagerResult<Self> {
        if !path.exists() {
            return Err(ManagerError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read(path).map_err(|e| ManagerError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let entries: BTreeMap<String, String> =
            serde_json::from_slice(&content).map_err(|e| ManagerError::ManifestParseFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(path = %path.display(), packages = entries.len(), "loaded manifest");
        Ok(Self { entries })
    }

    /// Build a manifest from name/URL pairs.
    pub fn from_entries<N, U>(entries: impl IntoIterator<Item = (N, U)>) -> Self
    where
        N: Into<String>,
        U: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, url)| (name.into(), url.into()))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[cfg(test)]
    pub fn url(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, url)| (name.as_str(), url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_manifest_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mods.json");

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManagerError::ManifestNotFound { .. }));
        assert!(err.to_string().contains("mods.json"));
    }

    #[test]
    fn test_load_manifest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mods.json");
        fs::write(
            &path,
            r#"{"modA": "http://host/a.zip", "modB": "http://host/b.7z"}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.url("modA"), Some("http://host/a.zip"));
        assert!(manifest.contains("modB"));
    }

    #[test]
    fn test_manifest_with_non_string_values_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mods.json");
        fs::write(&path, r#"{"modA": 42}"#).unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManagerError::ManifestParseFailed { .. }));
    }
}
