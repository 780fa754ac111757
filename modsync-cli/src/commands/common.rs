//! Settings shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::Args;
use modsync::logging::{init_logging, init_logging_stderr, WorkerGuard};
use modsync::ManagerConfig;

use crate::error::CliError;

/// Path options accepted by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct PathArgs {
    /// Profile name; prefixes the manifest, registry and download directory
    #[arg(long)]
    pub profile: Option<String>,

    /// Registry file
    #[arg(long, value_name = "FILE")]
    pub registry: Option<PathBuf>,
}

/// Download and install options for `sync`.
#[derive(Debug, Clone, Default, Args)]
pub struct SyncOptions {
    /// Manifest file
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Directory for downloaded archives
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Directory archives are extracted into
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Concurrent range requests per download
    #[arg(long, value_name = "N")]
    pub connections: Option<usize>,

    /// Bytes per range request; larger ranged files are downloaded in chunks
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,
}

/// Load the config file, then apply command-line overrides.
///
/// CLI flags take precedence over the file. The profile prefix applies to
/// paths from the file or defaults, not to paths given explicitly.
pub fn resolve_config(
    config_file: Option<&Path>,
    paths: &PathArgs,
    options: &SyncOptions,
) -> Result<ManagerConfig, CliError> {
    let mut config = match config_file {
        Some(path) if !path.exists() => return Err(CliError::ConfigNotFound(path.to_path_buf())),
        Some(path) => ManagerConfig::from_ini_file(path)?,
        None => ManagerConfig::discover()?,
    };

    if let Some(dir) = &options.install_dir {
        config = config.with_install_dir(dir);
    }
    if let Some(profile) = &paths.profile {
        if profile.is_empty() || profile.contains(['/', '\\']) {
            return Err(CliError::Config(format!("invalid profile name {:?}", profile)));
        }
        config = config.with_profile(profile);
    }
    if let Some(path) = &options.manifest {
        config = config.with_manifest_path(path);
    }
    if let Some(path) = &paths.registry {
        config = config.with_registry_path(path);
    }
    if let Some(dir) = &options.download_dir {
        config = config.with_download_dir(dir);
    }
    if let Some(connections) = options.connections {
        config = config.with_connections(connections);
    }
    if let Some(bytes) = options.chunk_size {
        config = config.with_chunk_size(bytes);
    }

    config.validate()?;
    Ok(config)
}

/// Start logging to the configured log directory, or stderr only when the
/// directory cannot be used. Keep the guard alive until exit.
pub fn start_logging(config: &ManagerConfig, verbose: bool) -> Option<WorkerGuard> {
    match init_logging(&config.log_dir, verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            init_logging_stderr(verbose);
            tracing::warn!(error = %e, "file logging unavailable, logging to stderr only");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_ini(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("modsync.ini");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_flags_override_file() {
        let temp = TempDir::new().unwrap();
        let ini = write_ini(
            temp.path(),
            "[paths]\nmanifest = from_file.json\n[download]\nconnections = 2\n",
        );

        let options = SyncOptions {
            manifest: Some(PathBuf::from("flag.json")),
            connections: Some(8),
            ..Default::default()
        };
        let config = resolve_config(Some(&ini), &PathArgs::default(), &options).unwrap();

        assert_eq!(config.manifest_path, PathBuf::from("flag.json"));
        assert_eq!(config.num_connections, 8);
    }

    #[test]
    fn test_profile_prefixes_file_paths_only() {
        let temp = TempDir::new().unwrap();
        let ini = write_ini(
            temp.path(),
            "[paths]\nmanifest = mods.json\nregistry = progress.json\ndownload_dir = packages\n",
        );

        let paths = PathArgs {
            profile: Some("ras".to_string()),
            registry: Some(PathBuf::from("explicit.json")),
        };
        let config = resolve_config(Some(&ini), &paths, &SyncOptions::default()).unwrap();

        assert_eq!(config.manifest_path, PathBuf::from("ras_mods.json"));
        assert_eq!(config.download_dir, PathBuf::from("ras_packages"));
        assert_eq!(config.registry_path, PathBuf::from("explicit.json"));
    }

    #[test]
    fn test_chunk_size_flag_sets_threshold() {
        let temp = TempDir::new().unwrap();
        let ini = write_ini(temp.path(), "");

        let options = SyncOptions {
            chunk_size: Some(1024),
            ..Default::default()
        };
        let config = resolve_config(Some(&ini), &PathArgs::default(), &options).unwrap();

        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.chunk_threshold, 1024);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let temp = TempDir::new().unwrap();
        let ini = write_ini(temp.path(), "");

        let options = SyncOptions {
            chunk_size: Some(0),
            ..Default::default()
        };
        let result = resolve_config(Some(&ini), &PathArgs::default(), &options);
        assert!(matches!(result, Err(CliError::Manager(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let result = resolve_config(
            Some(Path::new("/nonexistent/modsync.ini")),
            &PathArgs::default(),
            &SyncOptions::default(),
        );
        assert!(matches!(result, Err(CliError::ConfigNotFound(_))));
    }

    #[test]
    fn test_bad_profile_rejected() {
        let temp = TempDir::new().unwrap();
        let ini = write_ini(temp.path(), "");
        let paths = PathArgs {
            profile: Some("a/b".to_string()),
            registry: None,
        };
        let result = resolve_config(Some(&ini), &paths, &SyncOptions::default());
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
