//! Per-license mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// One async lock per license identifier.
///
/// Status refreshes and protocol interactions hold the lock of their license
/// so they never interleave. Different licenses never share a lock.
///
/// Entries nobody holds or waits for are pruned on the next acquisition, so
/// the map stays as large as the number of licenses in use.
#[derive(Debug, Default)]
pub struct LicenseLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LicenseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, license_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        // The map is only touched by short insertions, so a poisoned map is
        // still consistent.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|id, lock| id == license_id || Arc::strong_count(lock) > 1);
        locks
            .entry(license_id.to_string())
            .or_default()
            .clone()
    }

    /// Wait for the lock of `license_id`.
    pub async fn acquire(&self, license_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(license_id).lock_owned().await
    }

    /// Number of licenses with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
