//! Sync orchestration.
//!
//! A run goes through these steps, saving the registry after each phase so an
//! interrupted run resumes from the last completed one:
//! 1. Load the manifest and reconcile it with the registry
//! 2. Remove packages that left the manifest
//! 3. Download packages that are new or failed to download
//! 4. Extract packages that are downloaded or failed to extract
//!
//! A package whose removal failed is left alone by steps 3 and 4.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::ManagerConfig;
use crate::download::{Fetcher, HttpTransport, PackageProgressCallback, Transport};
use crate::error::ManagerResult;
use crate::extractor::Extractor;
use crate::manifest::Manifest;
use crate::reconcile::reconcile;
use crate::registry::{InstallStatus, Registry};
use crate::remover::Remover;
use crate::report::{PhaseReport, RunSummary};

/// Owns the registry and drives the install phases over a transport.
pub struct ModInstaller<T: Transport> {
    config: ManagerConfig,
    transport: T,
    registry: Registry,
    fetcher: Fetcher,
    extractor: Extractor,
    remover: Remover,
    progress: Option<PackageProgressCallback>,
}

impl ModInstaller<HttpTransport> {
    /// Create an installer that downloads over HTTP.
    pub fn open(config: ManagerConfig) -> ManagerResult<Self> {
        let transport = HttpTransport::new(config.timeout)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> ModInstaller<T> {
    /// Create an installer over a custom transport.
    ///
    /// Loads the registry; a registry that exists but cannot be parsed is an
    /// error.
    pub fn with_transport(config: ManagerConfig, transport: T) -> ManagerResult<Self> {
        config.validate()?;
        let registry = Registry::load(&config.registry_path)?;

        Ok(Self {
            fetcher: Fetcher::from_config(&config),
            extractor: Extractor::from_config(&config),
            remover: Remover::from_config(&config),
            config,
            transport,
            registry,
            progress: None,
        })
    }

    /// Report download progress through `callback`.
    pub fn with_progress(mut self, callback: PackageProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run every phase against the manifest on disk.
    ///
    /// Per-package failures are recorded in the summary and the registry;
    /// only a missing or unreadable manifest and registry I/O errors abort
    /// the run.
    pub fn sync(&mut self) -> ManagerResult<RunSummary> {
        let manifest = Manifest::load(&self.config.manifest_path)?;
        self.sync_with(&manifest)
    }

    /// Run every phase against an already loaded manifest.
    pub fn sync_with(&mut self, manifest: &Manifest) -> ManagerResult<RunSummary> {
        let plan = reconcile(manifest, &mut self.registry);
        self.registry.save()?;

        let removal = self.remove(&plan.to_remove)?;
        let leaving: BTreeSet<String> = plan.to_remove.iter().cloned().collect();
        let download = self.download(&leaving)?;
        let extraction = self.extract(&leaving)?;

        let mut statuses: BTreeMap<String, InstallStatus> = self
            .registry
            .iter()
            .map(|(name, record)| (name.to_string(), record.status))
            .collect();
        for name in &removal.succeeded {
            statuses.insert(name.clone(), InstallStatus::Removed);
        }

        let summary = RunSummary {
            removal,
            download,
            extraction,
            statuses: statuses.into_iter().collect(),
        };

        tracing::info!(
            packages = self.registry.len(),
            removed = summary.removal.succeeded.len(),
            downloaded = summary.download.succeeded.len(),
            extracted = summary.extraction.succeeded.len(),
            failures = summary.failed_packages().count(),
            "sync complete"
        );

        Ok(summary)
    }

    /// Remove the named packages and save.
    pub fn remove(&mut self, names: &[String]) -> ManagerResult<PhaseReport> {
        tracing::info!(packages = names.len(), "removal phase");
        let report = self.remover.remove_packages(&mut self.registry, names);
        self.registry.save()?;
        Ok(report)
    }

    /// Download pending packages, except those in `skip`, and save.
    pub fn download(&mut self, skip: &BTreeSet<String>) -> ManagerResult<PhaseReport> {
        tracing::info!("download phase");
        let report = self.fetcher.fetch_pending(
            &self.transport,
            &mut self.registry,
            skip,
            self.progress.as_ref(),
        );
        self.registry.save()?;
        Ok(report)
    }

    /// Extract downloaded packages, except those in `skip`, and save.
    pub fn extract(&mut self, skip: &BTreeSet<String>) -> ManagerResult<PhaseReport> {
        tracing::info!("extraction phase");
        let report = self.extractor.extract_pending(&mut self.registry, skip);
        self.registry.save()?;
        Ok(report)
    }
}
