//! Removal of packages that left the manifest.
//!
//! Member paths recorded at extraction time are deleted in reverse archive
//! order, so files go before the directories that contain them. Directories
//! are only removed once empty: another package, or the user, may own files
//! inside. A directory that still had content when first visited is retried,
//! deepest first, once every other member is gone. Paths the host application
//! owns are never touched.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::registry::{InstallRecord, Registry};
use crate::report::{Phase, PhaseReport};

/// Counts of what removing one package did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    /// Files and empty directories deleted.
    pub removed: usize,
    /// Members left alone because they are protected.
    pub protected: usize,
    /// Members that no longer existed.
    pub missing: usize,
    /// Directories left because they still hold other files.
    pub non_empty: usize,
}

/// Deletes installed packages from the installation root.
#[derive(Debug, Clone)]
pub struct Remover {
    install_dir: PathBuf,
    protected_paths: Vec<String>,
    user_content_roots: Vec<String>,
}

impl Remover {
    pub fn new<P, R>(install_dir: impl Into<PathBuf>, protected_paths: P, user_content_roots: R) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self {
            install_dir: install_dir.into(),
            protected_paths: protected_paths
                .into_iter()
                .map(|p| normalize(p.as_ref()).to_string())
                .collect(),
            user_content_roots: user_content_roots
                .into_iter()
                .map(|r| normalize(r.as_ref()).to_string())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            &config.install_dir,
            &config.protected_paths,
            &config.user_content_roots,
        )
    }

    /// Whether a member path must never be removed.
    ///
    /// A member is protected when, ignoring trailing slashes, it equals a
    /// protected path or is one of its ancestor directories.
    pub fn is_protected(&self, member: &str) -> bool {
        let member = normalize(member);
        if member.is_empty() {
            return true;
        }

        self.protected_paths.iter().any(|protected| {
            protected == member
                || protected
                    .strip_prefix(member)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// The per-package directory under a user-content root that `member`
    /// lives in, e.g. `user/mods/modA` for `user/mods/modA/package.json`.
    fn user_content_dir(&self, member: &str) -> Option<String> {
        let member = normalize(member);
        self.user_content_roots.iter().find_map(|root| {
            let rest = member.strip_prefix(root.as_str())?.strip_prefix('/')?;
            let first = rest.split('/').next().filter(|s| !s.is_empty())?;
            Some(format!("{}/{}", root, first))
        })
    }

    /// Remove every package in `names` and drop it from the registry.
    ///
    /// A package that fails stays in the registry untouched and is retried on
    /// the next run.
    pub fn remove_packages(&self, registry: &mut Registry, names: &[String]) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Remove);

        for name in names {
            let Some(record) = registry.get(name) else {
                continue;
            };

            match self.remove_package(record) {
                Ok(stats) => {
                    if let Some(record) = registry.get_mut(name) {
                        if let Err(e) = record.mark_removed() {
                            tracing::warn!(package = %name, error = %e, "removal failed");
                            report.record_failure(name, e);
                            continue;
                        }
                    }
                    registry.remove(name);
                    tracing::info!(
                        package = %name,
                        removed = stats.removed,
                        protected = stats.protected,
                        missing = stats.missing,
                        kept = stats.non_empty,
                        "removed"
                    );
                    report.record_success(name);
                }
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "removal failed");
                    report.record_failure(name, e);
                }
            }
        }

        report
    }

    /// Delete the files of one package. The record itself is not modified.
    pub fn remove_package(&self, record: &InstallRecord) -> ManagerResult<RemovalStats> {
        let mut stats = RemovalStats::default();
        let mut user_dirs = BTreeSet::new();
        let mut deferred = Vec::new();

        for member in record.member_paths.iter().rev() {
            if let Some(dir) = self.user_content_dir(member) {
                user_dirs.insert(dir);
            }

            if self.is_protected(member) {
                tracing::debug!(member = %member, "protected, not removing");
                stats.protected += 1;
                continue;
            }

            if self.remove_member(&self.install_dir.join(member), &mut stats)? {
                deferred.push(normalize(member));
            }
        }

        // Archive order may list a directory before its contents
        deferred.sort_by_key(|member| Reverse(Path::new(member).components().count()));
        for member in deferred {
            let path = self.install_dir.join(member);
            match remove_if_empty_dir(&path)? {
                DirRemoval::Removed => stats.removed += 1,
                DirRemoval::Missing => {}
                DirRemoval::NotEmpty => {
                    tracing::debug!(path = %path.display(), "directory not empty, keeping");
                    stats.non_empty += 1;
                }
            }
        }

        for dir in &user_dirs {
            if self.is_protected(dir) {
                continue;
            }
            let path = self.install_dir.join(dir);
            match remove_if_empty_dir(&path)? {
                DirRemoval::Removed => stats.removed += 1,
                DirRemoval::Missing => {}
                DirRemoval::NotEmpty => {
                    tracing::warn!(
                        path = %path.display(),
                        "leaving non-empty directory, it holds files the package did not install"
                    );
                    stats.non_empty += 1;
                }
            }
        }

        if record.has_archive() {
            match fs::remove_file(&record.local_path) {
                Ok(()) => {
                    tracing::debug!(path = %record.local_path.display(), "removed archive");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ManagerError::RemoveFailed {
                        path: record.local_path.clone(),
                        source: e,
                    })
                }
            }
        }

        Ok(stats)
    }

    /// Remove one member. Returns `true` for a directory that still had
    /// content and should be retried.
    fn remove_member(&self, path: &Path, stats: &mut RemovalStats) -> ManagerResult<bool> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                stats.missing += 1;
                return Ok(false);
            }
            Err(e) => {
                return Err(ManagerError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        if metadata.is_dir() {
            return match remove_if_empty_dir(path)? {
                DirRemoval::Removed => {
                    stats.removed += 1;
                    Ok(false)
                }
                DirRemoval::Missing => {
                    stats.missing += 1;
                    Ok(false)
                }
                DirRemoval::NotEmpty => Ok(true),
            };
        }

        fs::remove_file(path).map_err(|e| ManagerError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        stats.removed += 1;
        Ok(false)
    }
}

enum DirRemoval {
    Removed,
    Missing,
    NotEmpty,
}

fn remove_if_empty_dir(path: &Path) -> ManagerResult<DirRemoval> {
    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DirRemoval::Missing),
        Err(e) => {
            return Err(ManagerError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if entries.next().is_some() {
        return Ok(DirRemoval::NotEmpty);
    }

    fs::remove_dir(path).map_err(|e| ManagerError::RemoveFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(DirRemoval::Removed)
}

fn normalize(path: &str) -> &str {
    path.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_PROTECTED_PATHS, DEFAULT_USER_CONTENT_ROOTS};
    use crate::registry::InstallStatus;
    use tempfile::TempDir;

    fn remover(root: &Path) -> Remover {
        Remover::new(root, DEFAULT_PROTECTED_PATHS, DEFAULT_USER_CONTENT_ROOTS)
    }

    fn installed(members: &[&str]) -> InstallRecord {
        InstallRecord {
            status: InstallStatus::ExtractSuccess,
            source_url: "http://h/mod.zip".to_string(),
            local_path: PathBuf::new(),
            member_paths: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_protected_rule() {
        let temp = TempDir::new().unwrap();
        let remover = remover(temp.path());

        assert!(remover.is_protected("BepInEx/plugins/"));
        assert!(remover.is_protected("BepInEx/plugins"));
        assert!(remover.is_protected("BepInEx/"));
        assert!(remover.is_protected("user/"));
        assert!(remover.is_protected("user/mods/"));
        assert!(!remover.is_protected("BepInEx/plugins/mod.dll"));
        assert!(!remover.is_protected("user/mods/modA/"));
        assert!(!remover.is_protected("BepInExtra/"));
        assert!(!remover.is_protected("dir/file.txt"));
    }

    #[test]
    fn test_scenario_removes_file_then_dir() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dir/file.txt");

        let stats = remover(temp.path())
            .remove_package(&installed(&["dir/", "dir/file.txt"]))
            .unwrap();

        assert_eq!(stats.removed, 2);
        assert!(!temp.path().join("dir").exists());
    }

    #[test]
    fn test_dir_listed_before_its_file_is_removed() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dir/file.txt");

        let stats = remover(temp.path())
            .remove_package(&installed(&["dir/file.txt", "dir/"]))
            .unwrap();

        assert_eq!(stats.removed, 2);
        assert_eq!(stats.non_empty, 0);
        assert!(!temp.path().join("dir").exists());
    }

    #[test]
    fn test_nested_dirs_removed_deepest_first() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a/b/c/deep.txt");

        let stats = remover(temp.path())
            .remove_package(&installed(&["a/b/c/deep.txt", "a/", "a/b/c/", "a/b/"]))
            .unwrap();

        assert_eq!(stats.removed, 4);
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn test_remove_packages_leaves_no_dir_for_file_first_order() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dir/file.txt");

        let mut registry = Registry::empty(temp.path().join("progress.json"));
        registry.insert("modB", installed(&["dir/file.txt", "dir/"]));

        let report = remover(temp.path()).remove_packages(&mut registry, &["modB".to_string()]);

        assert_eq!(report.succeeded, vec!["modB".to_string()]);
        assert!(!registry.contains("modB"));
        assert!(!temp.path().join("dir/file.txt").exists());
        assert!(!temp.path().join("dir").exists());
    }

    #[test]
    fn test_protected_dirs_survive() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "BepInEx/plugins/mod.dll");
        fs::create_dir_all(temp.path().join("user/mods")).unwrap();

        let stats = remover(temp.path())
            .remove_package(&installed(&[
                "BepInEx/",
                "BepInEx/plugins/",
                "BepInEx/plugins/mod.dll",
                "user/",
                "user/mods/",
            ]))
            .unwrap();

        assert_eq!(stats.removed, 1);
        assert_eq!(stats.protected, 4);
        assert!(temp.path().join("BepInEx/plugins").is_dir());
        assert!(temp.path().join("user/mods").is_dir());
        assert!(!temp.path().join("BepInEx/plugins/mod.dll").exists());
    }

    #[test]
    fn test_non_empty_dir_is_kept() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "shared/ours.txt");
        touch(temp.path(), "shared/theirs.txt");

        let stats = remover(temp.path())
            .remove_package(&installed(&["shared/", "shared/ours.txt"]))
            .unwrap();

        assert_eq!(stats.removed, 1);
        assert_eq!(stats.non_empty, 1);
        assert!(temp.path().join("shared/theirs.txt").exists());
    }

    #[test]
    fn test_missing_members_are_skipped() {
        let temp = TempDir::new().unwrap();
        let stats = remover(temp.path())
            .remove_package(&installed(&["gone/", "gone/file.txt"]))
            .unwrap();
        assert_eq!(stats.missing, 2);
        assert_eq!(stats.removed, 0);
    }

    #[test]
    fn test_user_content_subdir_cleanup() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "user/mods/modA/package.json");

        // The archive listed only the file, not its directory
        let stats = remover(temp.path())
            .remove_package(&installed(&["user/mods/modA/package.json"]))
            .unwrap();

        assert_eq!(stats.removed, 2);
        assert!(!temp.path().join("user/mods/modA").exists());
        assert!(temp.path().join("user/mods").is_dir());
    }

    #[test]
    fn test_user_content_subdir_with_user_files_is_kept() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "user/mods/modA/package.json");
        touch(temp.path(), "user/mods/modA/config/settings.json");

        let stats = remover(temp.path())
            .remove_package(&installed(&["user/mods/modA/package.json"]))
            .unwrap();

        assert_eq!(stats.non_empty, 1);
        assert!(temp.path().join("user/mods/modA/config/settings.json").exists());
    }

    #[test]
    fn test_archive_is_removed() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkgs/mod.zip");
        touch(temp.path(), "pkgs/mod.zip");

        let mut record = installed(&[]);
        record.local_path = archive.clone();
        remover(temp.path()).remove_package(&record).unwrap();

        assert!(!archive.exists());
    }

    #[test]
    fn test_remove_packages_drops_records() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "dir/file.txt");

        let mut registry = Registry::empty(temp.path().join("progress.json"));
        registry.insert("old", installed(&["dir/", "dir/file.txt"]));
        registry.insert_new("keep", "http://h/keep.zip");

        let report = remover(temp.path()).remove_packages(&mut registry, &["old".to_string()]);

        assert_eq!(report.succeeded, vec!["old".to_string()]);
        assert!(!registry.contains("old"));
        assert!(registry.contains("keep"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_removal_keeps_record() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        touch(temp.path(), "locked/file.txt");
        let locked = temp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Root ignores directory permissions; nothing to observe then
        if fs::write(locked.join("probe"), b"").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let mut registry = Registry::empty(temp.path().join("progress.json"));
        registry.insert("old", installed(&["locked/", "locked/file.txt"]));

        let report = remover(temp.path()).remove_packages(&mut registry, &["old".to_string()]);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.failed.len(), 1);
        let record = registry.get("old").unwrap();
        assert_eq!(record.status, InstallStatus::ExtractSuccess);
        assert_eq!(record.member_paths.len(), 2);
    }
}
