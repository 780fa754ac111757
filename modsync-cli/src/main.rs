//! modsync CLI - keep add-on packages in sync with a manifest.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::common::{PathArgs, SyncOptions};
use commands::status::StatusArgs;
use commands::sync::SyncArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "modsync", version, about = "Keep add-on packages in sync with a manifest")]
struct Cli {
    /// Config file (default: ./modsync.ini, then the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show debug output on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Remove, download and extract packages to match the manifest
    Sync {
        #[command(flatten)]
        paths: PathArgs,

        #[command(flatten)]
        options: SyncOptions,
    },

    /// Show the recorded status of every package
    Status {
        #[command(flatten)]
        paths: PathArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("hint:").cyan(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Sync { paths, options } => commands::sync::run(SyncArgs {
            config_file: cli.config,
            verbose: cli.verbose,
            paths,
            options,
        }),
        Commands::Status { paths } => commands::status::run(StatusArgs {
            config_file: cli.config,
            paths,
        }),
    }
}
