//! CLI error type.

use std::path::PathBuf;

use modsync::ManagerError;
use thiserror::Error;

/// Errors that end a CLI invocation with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// A library operation failed in a way that aborts the run.
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// The requested config file does not exist.
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid combination of command-line values.
    #[error("{0}")]
    Config(String),
}

impl CliError {
    /// Hint printed after the error, if there is a likely fix.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Manager(ManagerError::ManifestNotFound { .. }) => {
                Some("create the manifest or point to it with --manifest")
            }
            CliError::Manager(ManagerError::RegistryParseFailed { .. }) => {
                Some("fix or delete the registry file; deleting it reinstalls every package")
            }
            CliError::ConfigNotFound(_) => Some("omit --config to use the default locations"),
            _ => None,
        }
    }
}
