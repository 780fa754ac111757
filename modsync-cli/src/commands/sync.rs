//! Sync command - reconcile, remove, download and extract.

use std::path::PathBuf;

use console::style;
use modsync::{InstallStatus, ModInstaller, RunSummary};

use super::common::{resolve_config, start_logging, PathArgs, SyncOptions};
use crate::error::CliError;
use crate::progress::DownloadBars;

/// Arguments for the sync command.
pub struct SyncArgs {
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
    pub paths: PathArgs,
    pub options: SyncOptions,
}

/// Run the sync command.
///
/// Package failures are printed but do not fail the command; only errors
/// that stop the whole run do.
pub fn run(args: SyncArgs) -> Result<(), CliError> {
    let config = resolve_config(args.config_file.as_deref(), &args.paths, &args.options)?;
    let _log_guard = start_logging(&config, args.verbose);

    tracing::info!(
        manifest = %config.manifest_path.display(),
        registry = %config.registry_path.display(),
        install_dir = %config.install_dir.display(),
        "starting sync"
    );

    let bars = DownloadBars::new(args.verbose);
    let mut installer = ModInstaller::open(config)?.with_progress(bars.callback());
    let result = installer.sync();
    bars.finish();

    let summary = result?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.statuses.is_empty() {
        println!("No packages in manifest or registry.");
        return;
    }

    let width = summary
        .statuses
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);

    for (name, status) in &summary.statuses {
        println!("  {:<width$}  {}", name, styled_status(*status), width = width);
    }

    let failures: Vec<_> = [&summary.removal, &summary.download, &summary.extraction]
        .into_iter()
        .flat_map(|report| report.failed.iter().map(move |f| (report.phase, f)))
        .collect();

    println!();
    println!(
        "Removed {}, downloaded {}, extracted {}, failed {}",
        summary.removal.succeeded.len(),
        summary.download.succeeded.len(),
        summary.extraction.succeeded.len(),
        failures.len()
    );

    if !failures.is_empty() {
        println!();
        println!("{}", style("Failures (retried on the next run):").yellow());
        for (phase, failure) in failures {
            println!("  {} [{}]: {}", failure.name, phase, failure.error);
        }
    }
}

/// Status label colored by outcome.
pub fn styled_status(status: InstallStatus) -> console::StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        InstallStatus::ExtractSuccess => label.green(),
        InstallStatus::DownloadFailed | InstallStatus::ExtractFailed => label.red(),
        InstallStatus::Removed => label.dim(),
        InstallStatus::New | InstallStatus::DownloadSuccess => label.yellow(),
    }
}
