//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lcp_core::{LicenseDocument, Right, Status};
use lcp_crypto::PassphraseHash;

use crate::error::{Result, StoreError};
use crate::record::{CredentialEntry, LicenseRecord};
use crate::traits::{CredentialStore, InsertResult, LicenseRepository};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// License records indexed by license ID.
    licenses: HashMap<String, LicenseRecord>,

    /// Credentials in insertion order.
    credentials: Vec<CredentialEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn update<F>(&self, license_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut LicenseRecord),
    {
        let mut inner = self.write()?;
        let record = inner
            .licenses
            .get_mut(license_id)
            .ok_or_else(|| StoreError::NotFound(license_id.to_string()))?;
        f(record);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LicenseRepository for MemoryStore {
    async fn insert_new(&self, record: &LicenseRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.licenses.contains_key(&record.license_id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner
            .licenses
            .insert(record.license_id.clone(), record.clone());
        Ok(InsertResult::Inserted)
    }

    async fn upsert(&self, record: &LicenseRecord) -> Result<()> {
        self.write()?
            .licenses
            .insert(record.license_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, license_id: &str) -> Result<Option<LicenseRecord>> {
        Ok(self.read()?.licenses.get(license_id).cloned())
    }

    async fn forget(&self, license_id: &str) -> Result<bool> {
        Ok(self.write()?.licenses.remove(license_id).is_some())
    }

    async fn update_rights(
        &self,
        license_id: &str,
        copies_left: Option<u32>,
        prints_left: Option<u32>,
    ) -> Result<()> {
        self.update(license_id, |record| {
            record.copies_left = copies_left;
            record.prints_left = prints_left;
        })
    }

    async fn consume_right(&self, license_id: &str, right: Right, amount: u32) -> Result<bool> {
        let mut inner = self.write()?;
        let record = inner
            .licenses
            .get_mut(license_id)
            .ok_or_else(|| StoreError::NotFound(license_id.to_string()))?;

        let mut counters = record.counters();
        if counters.consume(right, amount).is_err() {
            return Ok(false);
        }
        record.copies_left = counters.copies_left;
        record.prints_left = counters.prints_left;
        Ok(true)
    }

    async fn record_status(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
    ) -> Result<()> {
        self.update(license_id, |record| {
            record.status = Some(status);
            record.status_updated = Some(status_updated);
        })
    }

    async fn record_license_update(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
        license: &LicenseDocument,
    ) -> Result<()> {
        self.update(license_id, |record| {
            *record = record.clone().with_license(license);
            record.status = Some(status);
            record.status_updated = Some(status_updated);
        })
    }

    async fn mark_registered(&self, license_id: &str) -> Result<()> {
        self.update(license_id, |record| record.registered = true)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn possible_passphrases(
        &self,
        license_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<PassphraseHash>> {
        let inner = self.read()?;
        let user_id = user_id.filter(|id| !id.is_empty());

        let for_user = inner
            .credentials
            .iter()
            .filter(|entry| user_id.is_some() && entry.user_id.as_deref() == user_id);
        let for_license = inner
            .credentials
            .iter()
            .filter(|entry| entry.license_id == license_id);

        let mut hashes: Vec<PassphraseHash> = Vec::new();
        for entry in for_user.chain(for_license) {
            if !hashes.contains(&entry.hash) {
                hashes.push(entry.hash.clone());
            }
        }
        Ok(hashes)
    }

    async fn store(
        &self,
        license_id: &str,
        user_id: Option<&str>,
        hash: &PassphraseHash,
    ) -> Result<()> {
        let entry = CredentialEntry {
            license_id: license_id.to_string(),
            user_id: user_id.filter(|id| !id.is_empty()).map(str::to_string),
            hash: hash.clone(),
        };

        let mut inner = self.write()?;
        if !inner.credentials.contains(&entry) {
            inner.credentials.push(entry);
        }
        Ok(())
    }
}
