//! Per-package mutual exclusion.
//!
//! All mutating operations for one package (reserve, release, adjust, join,
//! leave, offer transitions) are serialized by the package's mutex;
//! operations on distinct packages proceed concurrently. The aggregate
//! streams additionally carry optimistic concurrency as defense in depth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wayfare_inventory::PackageId;

/// Registry of per-package mutexes, keyed by package id.
///
/// Locks are created on first use and never removed; the registry grows with
/// the catalog, which is small.
#[derive(Debug, Default)]
pub struct PackageLocks {
    inner: Mutex<HashMap<PackageId, Arc<Mutex<()>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the mutex guarding a package's mutations.
    ///
    /// Callers hold the returned lock across their load-decide-append
    /// sequence and drop it before dispatching notifications.
    pub fn for_package(&self, package_id: PackageId) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(package_id).or_default().clone()
    }
}
