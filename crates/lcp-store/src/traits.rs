//! Store traits: the abstract interfaces for license persistence.
//!
//! These traits keep the service storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use lcp_core::{LicenseDocument, Right, Status};
use lcp_crypto::PassphraseHash;

use crate::error::Result;
use crate::record::LicenseRecord;

/// Result of inserting a license record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted.
    Inserted,
    /// A record already exists (idempotent - not an error).
    AlreadyExists,
}

/// Persistent per-license state.
///
/// All methods are async. For SQLite, `spawn_blocking` is used internally to
/// avoid blocking the runtime.
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a record unless one already exists.
    ///
    /// An existing record is left untouched, so opening a license again
    /// never resets consumed rights.
    async fn insert_new(&self, record: &LicenseRecord) -> Result<InsertResult>;

    /// Insert or replace a record. Last write wins.
    async fn upsert(&self, record: &LicenseRecord) -> Result<()>;

    /// Get the record of a license.
    async fn get(&self, license_id: &str) -> Result<Option<LicenseRecord>>;

    /// Remove a record. Returns whether one existed.
    async fn forget(&self, license_id: &str) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Rights
    // ─────────────────────────────────────────────────────────────────────────

    /// Overwrite the remaining copy and print allowances.
    async fn update_rights(
        &self,
        license_id: &str,
        copies_left: Option<u32>,
        prints_left: Option<u32>,
    ) -> Result<()>;

    /// Atomically consume `amount` of `right`.
    ///
    /// Returns `false`, leaving the counter unchanged, when fewer than
    /// `amount` remain. Unlimited rights always succeed.
    async fn consume_right(&self, license_id: &str, right: Right, amount: u32) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    /// Cache the last fetched status.
    async fn record_status(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
    ) -> Result<()>;

    /// Cache a fetched status together with the newer license it announced,
    /// in a single write. Consumed rights and registration are kept.
    async fn record_license_update(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
        license: &LicenseDocument,
    ) -> Result<()>;

    /// Remember that this device registered the license.
    async fn mark_registered(&self, license_id: &str) -> Result<()>;
}

/// Passphrase hashes known to unlock licenses.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Candidate hashes for a license.
    ///
    /// Hashes stored for `user_id` come first, in insertion order, followed
    /// by hashes stored for `license_id` that are not already listed.
    async fn possible_passphrases(
        &self,
        license_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<PassphraseHash>>;

    /// Store a hash that unlocked a license. Storing it again is a no-op.
    async fn store(
        &self,
        license_id: &str,
        user_id: Option<&str>,
        hash: &PassphraseHash,
    ) -> Result<()>;
}
