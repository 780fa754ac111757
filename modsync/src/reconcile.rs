//! Merge the manifest into the registry and work out what to remove.

use crate::manifest::Manifest;
use crate::registry::Registry;

/// Outcome of reconciling a manifest against the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Packages that were new to the registry and now have a NEW record.
    pub added: Vec<String>,
    /// Tracked packages the manifest no longer lists, sorted by name.
    pub to_remove: Vec<String>,
}

/// Bring `registry` in line with `manifest`.
///
/// Every manifest name ends up with exactly one record. Records that already
/// exist are left alone, including their URL: once a package is tracked its
/// resolved location belongs to the registry. Names only the registry knows
/// about are returned for removal but stay tracked until the remover has
/// physically deleted their files.
pub fn reconcile(manifest: &Manifest, registry: &mut Registry) -> Reconciliation {
    let mut added = Vec::new();

    for (name, url) in manifest.iter() {
        if registry.insert_new(name, url) {
            added.push(name.to_string());
        }
    }

    let to_remove: Vec<String> = registry
        .names()
        .filter(|name| !manifest.contains(name))
        .map(str::to_string)
        .collect();

    tracing::info!(
        requested = manifest.len(),
        new = added.len(),
        to_remove = to_remove.len(),
        "reconciled manifest with registry"
    );

    Reconciliation { added, to_remove }
}
