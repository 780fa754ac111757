//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod range_server;

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use modsync::ManagerConfig;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Build a ZIP archive in memory. `None` content makes a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        match content {
            Some(bytes) => {
                zip.start_file(*name, options).unwrap();
                zip.write_all(bytes).unwrap();
            }
            None => zip.add_directory(*name, options).unwrap(),
        }
    }
    zip.finish().unwrap().into_inner()
}

/// Config rooted in `root` with a short timeout.
pub fn test_config(root: &Path) -> ManagerConfig {
    ManagerConfig::new(root).with_timeout(Duration::from_secs(10))
}

/// Write `entries` as the manifest `config` points at.
pub fn write_manifest(config: &ManagerConfig, entries: &[(&str, String)]) {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(name, url)| (name.to_string(), serde_json::Value::String(url.clone())))
        .collect();
    fs::write(
        &config.manifest_path,
        serde_json::to_vec_pretty(&serde_json::Value::Object(map)).unwrap(),
    )
    .unwrap();
}

/// Files directly inside `dir`, sorted; empty when `dir` is absent.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
