//! modsync - keep a host application's add-on packages in sync with a manifest.
//!
//! Given a manifest of package names and download URLs, this library
//! downloads each package (over several ranged connections when the server
//! allows it), extracts ZIP and 7z archives into the installation root,
//! tracks every package's state in a durable registry, and removes packages
//! whose manifest entry disappeared.
//!
//! # Example
//!
//! ```no_run
//! use modsync::{ManagerConfig, ModInstaller};
//!
//! let config = ManagerConfig::new("/games/host");
//! let mut installer = ModInstaller::open(config)?;
//! let summary = installer.sync()?;
//! for (name, status) in &summary.statuses {
//!     println!("{}: {}", name, status);
//! }
//! # Ok::<(), modsync::ManagerError>(())
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod reconcile;
pub mod registry;
pub mod remover;
pub mod report;

pub use config::ManagerConfig;
pub use error::{ManagerError, ManagerResult};
pub use installer::ModInstaller;
pub use manifest::Manifest;
pub use registry::{InstallRecord, InstallStatus, Registry};
pub use report::{Phase, PhaseReport, RunSummary};
