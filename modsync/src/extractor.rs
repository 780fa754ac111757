//! Archive extraction into the installation root.
//!
//! The format is decided by the file signature, never by the extension:
//! download names come from servers and are often wrong. Every extracted
//! entry is recorded in archive order so the remover can later undo the
//! installation.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::registry::{InstallRecord, Registry, StatusEvent};
use crate::report::{Phase, PhaseReport};

/// ZIP local file header, empty archive and spanned archive signatures.
const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// 7z signature.
const SEVEN_Z_SIGNATURE: &[u8; 6] = b"7z\xBC\xAF\x27\x1C";

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZ,
}

/// Identify an archive by its leading bytes.
pub fn sniff_format(path: &Path) -> ManagerResult<ArchiveFormat> {
    let mut file = File::open(path).map_err(|e| ManagerError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut header = [0u8; 6];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ManagerError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    format_from_header(&header[..filled]).ok_or_else(|| ManagerError::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

fn format_from_header(header: &[u8]) -> Option<ArchiveFormat> {
    if header.starts_with(SEVEN_Z_SIGNATURE) {
        Some(ArchiveFormat::SevenZ)
    } else if ZIP_SIGNATURES.iter().any(|sig| header.starts_with(*sig)) {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Extract `archive` into `dest`, returning entry names in archive order.
pub fn extract_archive(archive: &Path, dest: &Path) -> ManagerResult<Vec<String>> {
    let format = sniff_format(archive)?;

    fs::create_dir_all(dest).map_err(|e| ManagerError::CreateDirFailed {
        path: dest.to_path_buf(),
        source: e,
    })?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::SevenZ => extract_7z(archive, dest),
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> ManagerResult<Vec<String>> {
    let failed = |reason: String| ManagerError::ExtractionFailed {
        path: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path).map_err(|e| ManagerError::ReadFailed {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| failed(format!("failed to read ZIP archive: {}", e)))?;

    let mut members = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| failed(format!("failed to read ZIP entry {}: {}", index, e)))?;

        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(archive = %archive_path.display(), entry = %name, "skipping entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ManagerError::CreateDirFailed {
                path: target.clone(),
                source: e,
            })?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ManagerError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            let mut out = File::create(&target).map_err(|e| ManagerError::WriteFailed {
                path: target.clone(),
                source: e,
            })?;
            io::copy(&mut entry, &mut out)
                .map_err(|e| failed(format!("failed to extract {}: {}", name, e)))?;
        }

        members.push(name);
    }

    Ok(members)
}

fn extract_7z(archive_path: &Path, dest: &Path) -> ManagerResult<Vec<String>> {
    let mut members = Vec::new();

    sevenz_rust::decompress_file_with_extract_fn(archive_path, dest, |entry, reader, target| {
        let name = entry.name().to_string();
        if !is_safe_member(&name) {
            tracing::warn!(archive = %archive_path.display(), entry = %name, "skipping entry with unsafe path");
            // Drain so the solid stream stays aligned for the next entry
            io::copy(reader, &mut io::sink())?;
            return Ok(true);
        }
        members.push(name);
        sevenz_rust::default_entry_extract_fn(entry, reader, target)
    })
    .map_err(|e| ManagerError::ExtractionFailed {
        path: archive_path.to_path_buf(),
        reason: format!("failed to extract 7z archive: {}", e),
    })?;

    Ok(members)
}

/// Relative, without `..`, root or drive components.
fn is_safe_member(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extracts downloaded archives and records what they produced.
#[derive(Debug, Clone)]
pub struct Extractor {
    install_dir: PathBuf,
}

impl Extractor {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(&config.install_dir)
    }

    /// Extract every downloaded or previously failed package not in `skip`.
    ///
    /// Records are updated in place; the caller persists the registry.
    pub fn extract_pending(&self, registry: &mut Registry, skip: &BTreeSet<String>) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Extract);

        for name in registry.names_where(|record| record.status.needs_extract()) {
            if skip.contains(&name) {
                tracing::debug!(package = %name, "pending removal, not extracting");
                continue;
            }
            let Some(record) = registry.get_mut(&name) else {
                continue;
            };

            match self.extract(record) {
                Ok(count) => {
                    tracing::info!(package = %name, members = count, "extracted");
                    report.record_success(&name);
                }
                Err(e) => {
                    tracing::warn!(package = %name, error = %e, "extraction failed");
                    report.record_failure(&name, e);
                }
            }
        }

        report
    }

    /// Extract one package's archive and record its members.
    ///
    /// Returns the number of recorded members.
    pub fn extract(&self, record: &mut InstallRecord) -> ManagerResult<usize> {
        record.status.apply(StatusEvent::ExtractSucceeded)?;

        let result = if record.has_archive() {
            extract_archive(&record.local_path, &self.install_dir)
        } else {
            Err(ManagerError::ExtractionFailed {
                path: record.local_path.clone(),
                reason: "no downloaded archive recorded".to_string(),
            })
        };

        match result {
            Ok(members) => {
                let count = members.len();
                record.record_extract_success(members)?;
                Ok(count)
            }
            Err(e) => {
                record.record_extract_failure()?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstallStatus;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            match content {
                Some(bytes) => {
                    zip.start_file(*name, FileOptions::default()).unwrap();
                    zip.write_all(bytes).unwrap();
                }
                None => zip.add_directory(*name, FileOptions::default()).unwrap(),
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(format_from_header(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(format_from_header(b"PK\x05\x06"), Some(ArchiveFormat::Zip));
        assert_eq!(format_from_header(b"PK\x07\x08"), Some(ArchiveFormat::Zip));
        assert_eq!(
            format_from_header(b"7z\xBC\xAF\x27\x1C"),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(format_from_header(b"Rar!\x1A\x07"), None);
        assert_eq!(format_from_header(b"PK"), None);
        assert_eq!(format_from_header(b""), None);
    }

    #[test]
    fn test_sniff_ignores_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.7z");
        write_zip(&path, &[("a.txt", Some(b"a"))]);
        assert_eq!(sniff_format(&path).unwrap(), ArchiveFormat::Zip);
    }

    #[test]
    fn test_unsupported_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page.zip");
        fs::write(&path, b"<html>not found</html>").unwrap();

        let err = extract_archive(&path, temp.path()).unwrap_err();
        assert!(matches!(err, ManagerError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_zip_members_in_archive_order() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mod.zip");
        let install = temp.path().join("game");
        write_zip(
            &archive,
            &[
                ("dir/", None),
                ("dir/file.txt", Some(b"hello")),
                ("BepInEx/plugins/mod.dll", Some(b"dll")),
            ],
        );

        let members = extract_archive(&archive, &install).unwrap();

        assert_eq!(members, vec!["dir/", "dir/file.txt", "BepInEx/plugins/mod.dll"]);
        assert_eq!(fs::read(install.join("dir/file.txt")).unwrap(), b"hello");
        assert!(install.join("BepInEx/plugins/mod.dll").is_file());
    }

    #[test]
    fn test_unsafe_zip_entries_are_skipped() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        let install = temp.path().join("game");
        write_zip(
            &archive,
            &[("../escape.txt", Some(b"x")), ("ok.txt", Some(b"y"))],
        );

        let members = extract_archive(&archive, &install).unwrap();

        assert_eq!(members, vec!["ok.txt"]);
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_7z_members_recorded() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("dir")).unwrap();
        fs::write(src.join("dir").join("file.txt"), b"seven").unwrap();
        let archive = temp.path().join("mod.bin");
        sevenz_rust::compress_to_path(&src, &archive).unwrap();

        let install = temp.path().join("game");
        let members = extract_archive(&archive, &install).unwrap();

        assert!(members.iter().any(|m| m == "dir/file.txt"));
        assert_eq!(fs::read(install.join("dir").join("file.txt")).unwrap(), b"seven");
    }

    #[test]
    fn test_safe_member_names() {
        assert!(is_safe_member("dir/file.txt"));
        assert!(is_safe_member("./a"));
        assert!(!is_safe_member("../a"));
        assert!(!is_safe_member("/etc/passwd"));
        assert!(!is_safe_member(""));
    }

    #[test]
    fn test_extract_records_success() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mod.zip");
        write_zip(&archive, &[("a.txt", Some(b"a"))]);

        let mut record = InstallRecord::new("http://h/mod.zip");
        record.record_download_success(&archive).unwrap();

        let extractor = Extractor::new(temp.path().join("game"));
        assert_eq!(extractor.extract(&mut record).unwrap(), 1);
        assert_eq!(record.status, InstallStatus::ExtractSuccess);
        assert_eq!(record.member_paths, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_extract_failure_is_recorded_and_retried() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("mod.zip");
        fs::write(&archive, b"garbage").unwrap();

        let mut registry = Registry::empty(temp.path().join("progress.json"));
        let mut record = InstallRecord::new("http://h/mod.zip");
        record.record_download_success(&archive).unwrap();
        registry.insert("mod", record);

        let extractor = Extractor::new(temp.path().join("game"));
        let report = extractor.extract_pending(&mut registry, &BTreeSet::new());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(registry.get("mod").unwrap().status, InstallStatus::ExtractFailed);

        // Fix the archive; the next pass picks the failed record up again
        write_zip(&archive, &[("a.txt", Some(b"a"))]);
        let report = extractor.extract_pending(&mut registry, &BTreeSet::new());
        assert_eq!(report.succeeded, vec!["mod".to_string()]);
        assert_eq!(registry.get("mod").unwrap().status, InstallStatus::ExtractSuccess);
    }

    #[test]
    fn test_extract_pending_skips_other_states() {
        let temp = TempDir::new().unwrap();
        let mut registry = Registry::empty(temp.path().join("progress.json"));
        registry.insert_new("new", "http://h/new.zip");

        let report = Extractor::new(temp.path()).extract_pending(&mut registry, &BTreeSet::new());
        assert_eq!(report.attempted(), 0);
        assert_eq!(registry.get("new").unwrap().status, InstallStatus::New);
    }
}
