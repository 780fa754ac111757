//! Configuration for the package synchronizer.
//!
//! Settings come from built-in defaults, optionally overlaid by an INI file:
//!
//! ```ini
//! [paths]
//! install_dir = .
//! download_dir = ./mod_packages
//! manifest = mods.json
//! registry = modding_progress.json
//! log_dir = ./logs
//!
//! [download]
//! chunk_size = 50000000
//! chunk_threshold = 50000000
//! connections = 4
//! retry_budget_factor = 1.5
//! timeout_secs = 300
//!
//! [remove]
//! protected_paths = BepInEx/plugins/, user/mods/
//! user_content_roots = user/mods/
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use crate::error::{ManagerError, ManagerResult};

/// Default size of one ranged request (50 MB).
pub const DEFAULT_CHUNK_SIZE: u64 = 50_000_000;

/// Default number of simultaneous range requests per download.
pub const DEFAULT_CONNECTIONS: usize = 4;

/// Default multiplier turning the chunk count into a failure budget.
pub const DEFAULT_RETRY_BUDGET_FACTOR: f64 = 1.5;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Paths the host application owns; never removed even when an archive
/// listed them.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &["BepInEx/plugins/", "user/mods/"];

/// Directories whose immediate children each belong to one package.
pub const DEFAULT_USER_CONTENT_ROOTS: &[&str] = &["user/mods/"];

/// Name of the config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "modsync.ini";

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Root that archives are extracted into and member paths are relative to.
    pub install_dir: PathBuf,

    /// Directory holding downloaded archives. Created if absent.
    pub download_dir: PathBuf,

    /// Manifest of requested packages.
    pub manifest_path: PathBuf,

    /// Persisted installation registry.
    pub registry_path: PathBuf,

    /// Directory for log files written by the CLI.
    pub log_dir: PathBuf,

    /// Size of one ranged request in bytes.
    pub chunk_size: u64,

    /// Files larger than this use the chunked downloader when the server
    /// accepts byte ranges.
    pub chunk_threshold: u64,

    /// Maximum concurrent range requests for one download.
    pub num_connections: usize,

    /// Chunk failures allowed per download, as a multiple of its chunk count.
    pub retry_budget_factor: f64,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Member paths that removal must never touch.
    pub protected_paths: Vec<String>,

    /// Roots whose per-package subdirectory is cleaned up after removal.
    pub user_content_roots: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from("."),
            download_dir: PathBuf::from("./mod_packages"),
            manifest_path: PathBuf::from("mods.json"),
            registry_path: PathBuf::from("modding_progress.json"),
            log_dir: PathBuf::from("./logs"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_threshold: DEFAULT_CHUNK_SIZE,
            num_connections: DEFAULT_CONNECTIONS,
            retry_budget_factor: DEFAULT_RETRY_BUDGET_FACTOR,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            protected_paths: DEFAULT_PROTECTED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            user_content_roots: DEFAULT_USER_CONTENT_ROOTS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ManagerConfig {
    /// Create a configuration rooted at `install_dir`.
    ///
    /// Download directory, manifest and registry default to locations inside
    /// the install root.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            download_dir: install_dir.join("mod_packages"),
            manifest_path: install_dir.join("mods.json"),
            registry_path: install_dir.join("modding_progress.json"),
            log_dir: install_dir.join("logs"),
            install_dir,
            ..Default::default()
        }
    }

    /// Load settings from an INI file on top of the defaults.
    pub fn from_ini_file(path: &Path) -> ManagerResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            ManagerError::InvalidConfig(format!("cannot load {}: {}", path.display(), e))
        })?;
        Self::default().apply_ini(&ini)
    }

    /// Load settings from INI text on top of the defaults.
    pub fn from_ini_str(content: &str) -> ManagerResult<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| ManagerError::InvalidConfig(format!("cannot parse config: {}", e)))?;
        Self::default().apply_ini(&ini)
    }

    /// Load the first config file found, or defaults when there is none.
    ///
    /// Looks for `modsync.ini` in the working directory, then
    /// `<config dir>/modsync/config.ini`.
    pub fn discover() -> ManagerResult<Self> {
        match default_config_path() {
            Some(path) => Self::from_ini_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn apply_ini(mut self, ini: &Ini) -> ManagerResult<Self> {
        if let Some(paths) = ini.section(Some("paths")) {
            if let Some(v) = paths.get("install_dir") {
                self.install_dir = PathBuf::from(v);
            }
            if let Some(v) = paths.get("download_dir") {
                self.download_dir = PathBuf::from(v);
            }
            if let Some(v) = paths.get("manifest") {
                self.manifest_path = PathBuf::from(v);
            }
            if let Some(v) = paths.get("registry") {
                self.registry_path = PathBuf::from(v);
            }
            if let Some(v) = paths.get("log_dir") {
                self.log_dir = PathBuf::from(v);
            }
        }

        if let Some(download) = ini.section(Some("download")) {
            if let Some(v) = parse_key::<u64>(download, "download", "chunk_size")? {
                self.chunk_size = v;
                // The threshold follows the chunk size unless set explicitly
                self.chunk_threshold = v;
            }
            if let Some(v) = parse_key::<u64>(download, "download", "chunk_threshold")? {
                self.chunk_threshold = v;
            }
            if let Some(v) = parse_key::<usize>(download, "download", "connections")? {
                self.num_connections = v;
            }
            if let Some(v) = parse_key::<f64>(download, "download", "retry_budget_factor")? {
                self.retry_budget_factor = v;
            }
            if let Some(v) = parse_key::<u64>(download, "download", "timeout_secs")? {
                self.timeout = Duration::from_secs(v);
            }
        }

        if let Some(remove) = ini.section(Some("remove")) {
            if let Some(v) = remove.get("protected_paths") {
                self.protected_paths = split_list(v);
            }
            if let Some(v) = remove.get("user_content_roots") {
                self.user_content_roots = split_list(v);
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Check values that would make a run meaningless.
    pub fn validate(&self) -> ManagerResult<()> {
        if self.chunk_size == 0 {
            return Err(ManagerError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.num_connections == 0 {
            return Err(ManagerError::InvalidConfig(
                "connections must be at least 1".to_string(),
            ));
        }
        if !self.retry_budget_factor.is_finite() || self.retry_budget_factor < 0.0 {
            return Err(ManagerError::InvalidConfig(format!(
                "retry_budget_factor must be a non-negative number, got {}",
                self.retry_budget_factor
            )));
        }
        Ok(())
    }

    /// Prefix the manifest, registry and download directory with `profile_`.
    ///
    /// Lets several independent package sets share one install root.
    pub fn with_profile(mut self, profile: &str) -> Self {
        self.manifest_path = prefixed(&self.manifest_path, profile);
        self.registry_path = prefixed(&self.registry_path, profile);
        self.download_dir = prefixed(&self.download_dir, profile);
        self
    }

    /// Set the installation root.
    pub fn with_install_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_dir = path.into();
        self
    }

    /// Set the download directory.
    pub fn with_download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_dir = path.into();
        self
    }

    /// Set the manifest path.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    /// Set the registry path.
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    /// Set the chunk size and make it the chunking threshold as well.
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self.chunk_threshold = bytes;
        self
    }

    /// Set the size above which ranged downloads are used.
    pub fn with_chunk_threshold(mut self, bytes: u64) -> Self {
        self.chunk_threshold = bytes;
        self
    }

    /// Set the number of concurrent range requests (minimum 1).
    pub fn with_connections(mut self, connections: usize) -> Self {
        self.num_connections = connections.max(1);
        self
    }

    /// Set the retry budget multiplier.
    pub fn with_retry_budget_factor(mut self, factor: f64) -> Self {
        self.retry_budget_factor = factor;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the protected path list.
    pub fn with_protected_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the user-content roots.
    pub fn with_user_content_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_content_roots = roots.into_iter().map(Into::into).collect();
        self
    }
}

/// Location of the config file to use, if any exists.
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("modsync").join("config.ini"))
        .filter(|path| path.exists())
}

fn parse_key<T: FromStr>(props: &Properties, section: &str, key: &str) -> ManagerResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match props.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ManagerError::InvalidConfig(format!("[{}] {} = {:?}: {}", section, key, raw, e))
        }),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn prefixed(path: &Path, profile: &str) -> PathBuf {
    match path.file_name() {
        Some(name) => {
            let mut prefixed = std::ffi::OsString::from(format!("{}_", profile));
            prefixed.push(name);
            path.with_file_name(prefixed)
        }
        None => path.to_path_buf(),
    }
}
