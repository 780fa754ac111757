//! Status command - show what the registry records for each package.

use std::path::PathBuf;

use modsync::Registry;

use super::common::{resolve_config, PathArgs, SyncOptions};
use super::sync::styled_status;
use crate::error::CliError;

/// Arguments for the status command.
pub struct StatusArgs {
    pub config_file: Option<PathBuf>,
    pub paths: PathArgs,
}

/// Run the status command.
pub fn run(args: StatusArgs) -> Result<(), CliError> {
    let config = resolve_config(
        args.config_file.as_deref(),
        &args.paths,
        &SyncOptions::default(),
    )?;
    let registry = Registry::load(&config.registry_path)?;

    println!("Registry: {}", config.registry_path.display());
    if registry.is_empty() {
        println!("No packages recorded.");
        return Ok(());
    }

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for (name, record) in registry.iter() {
        print!("  {:<width$}  {}", name, styled_status(record.status), width = width);
        if record.has_archive() {
            print!("  {}", record.local_path.display());
        }
        println!();
    }
    Ok(())
}
