//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use lcp_core::{LicenseDocument, Right, Status};
use lcp_crypto::PassphraseHash;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::record::LicenseRecord;
use crate::traits::{CredentialStore, InsertResult, LicenseRepository};

const RECORD_COLUMNS: &str = "license_id, provider, issued, updated, copies_left, prints_left,
     rights_end, status, status_updated, registered";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    ///
    /// Once started, the operation runs to completion even if the calling
    /// future is dropped.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn to_millis(date: DateTime<Utc>) -> i64 {
    date.timestamp_millis()
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

// Helper to convert a row to LicenseRecord
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LicenseRecord> {
    let status = row
        .get::<_, Option<String>>("status")?
        .map(|s| s.parse::<Status>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(LicenseRecord {
        license_id: row.get("license_id")?,
        provider: row.get("provider")?,
        issued: from_millis(row.get("issued")?)?,
        updated: from_millis(row.get("updated")?)?,
        copies_left: row.get("copies_left")?,
        prints_left: row.get("prints_left")?,
        rights_end: row
            .get::<_, Option<i64>>("rights_end")?
            .map(from_millis)
            .transpose()?,
        status,
        status_updated: row
            .get::<_, Option<i64>>("status_updated")?
            .map(from_millis)
            .transpose()?,
        registered: row.get("registered")?,
    })
}

fn exists(conn: &Connection, license_id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM licenses WHERE license_id = ?1",
            params![license_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn require_changed(changed: usize, license_id: &str) -> Result<()> {
    if changed == 0 {
        Err(StoreError::NotFound(license_id.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl LicenseRepository for SqliteStore {
    async fn insert_new(&self, record: &LicenseRecord) -> Result<InsertResult> {
        let record = record.clone();
        self.run(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO licenses ({RECORD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    record.license_id,
                    record.provider,
                    to_millis(record.issued),
                    to_millis(record.updated),
                    record.copies_left,
                    record.prints_left,
                    record.rights_end.map(to_millis),
                    record.status.map(Status::as_str),
                    record.status_updated.map(to_millis),
                    record.registered,
                ],
            )?;

            if inserted == 0 {
                Ok(InsertResult::AlreadyExists)
            } else {
                tracing::debug!(license_id = %record.license_id, "license record created");
                Ok(InsertResult::Inserted)
            }
        })
        .await
    }

    async fn upsert(&self, record: &LicenseRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO licenses ({RECORD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(license_id) DO UPDATE SET
                        provider = excluded.provider,
                        issued = excluded.issued,
                        updated = excluded.updated,
                        copies_left = excluded.copies_left,
                        prints_left = excluded.prints_left,
                        rights_end = excluded.rights_end,
                        status = excluded.status,
                        status_updated = excluded.status_updated,
                        registered = excluded.registered"
                ),
                params![
                    record.license_id,
                    record.provider,
                    to_millis(record.issued),
                    to_millis(record.updated),
                    record.copies_left,
                    record.prints_left,
                    record.rights_end.map(to_millis),
                    record.status.map(Status::as_str),
                    record.status_updated.map(to_millis),
                    record.registered,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, license_id: &str) -> Result<Option<LicenseRecord>> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM licenses WHERE license_id = ?1"),
                params![license_id],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn forget(&self, license_id: &str) -> Result<bool> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM licenses WHERE license_id = ?1",
                params![license_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn update_rights(
        &self,
        license_id: &str,
        copies_left: Option<u32>,
        prints_left: Option<u32>,
    ) -> Result<()> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE licenses SET copies_left = ?2, prints_left = ?3 WHERE license_id = ?1",
                params![license_id, copies_left, prints_left],
            )?;
            require_changed(changed, &license_id)
        })
        .await
    }

    async fn consume_right(&self, license_id: &str, right: Right, amount: u32) -> Result<bool> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            // A NULL counter is unlimited and stays NULL.
            let sql = match right {
                Right::Copy => {
                    "UPDATE licenses SET copies_left = copies_left - ?2
                     WHERE license_id = ?1 AND (copies_left IS NULL OR copies_left >= ?2)"
                }
                Right::Print => {
                    "UPDATE licenses SET prints_left = prints_left - ?2
                     WHERE license_id = ?1 AND (prints_left IS NULL OR prints_left >= ?2)"
                }
            };

            if conn.execute(sql, params![license_id, amount])? > 0 {
                return Ok(true);
            }
            if !exists(conn, &license_id)? {
                return Err(StoreError::NotFound(license_id));
            }
            tracing::debug!(license_id = %license_id, ?right, amount, "right exhausted");
            Ok(false)
        })
        .await
    }

    async fn record_status(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
    ) -> Result<()> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE licenses SET status = ?2, status_updated = ?3 WHERE license_id = ?1",
                params![license_id, status.as_str(), to_millis(status_updated)],
            )?;
            require_changed(changed, &license_id)
        })
        .await
    }

    async fn record_license_update(
        &self,
        license_id: &str,
        status: Status,
        status_updated: DateTime<Utc>,
        license: &LicenseDocument,
    ) -> Result<()> {
        let license_id = license_id.to_string();
        let provider = license.provider().to_string();
        let issued = to_millis(license.issued());
        let updated = to_millis(license.updated());
        let rights_end = license.rights().end.map(to_millis);
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE licenses SET
                    provider = ?2, issued = ?3, updated = ?4, rights_end = ?5,
                    status = ?6, status_updated = ?7
                 WHERE license_id = ?1",
                params![
                    license_id,
                    provider,
                    issued,
                    updated,
                    rights_end,
                    status.as_str(),
                    to_millis(status_updated)
                ],
            )?;
            require_changed(changed, &license_id)
        })
        .await
    }

    async fn mark_registered(&self, license_id: &str) -> Result<()> {
        let license_id = license_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE licenses SET registered = 1 WHERE license_id = ?1",
                params![license_id],
            )?;
            require_changed(changed, &license_id)
        })
        .await
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn possible_passphrases(
        &self,
        license_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<PassphraseHash>> {
        let license_id = license_id.to_string();
        let user_id = user_id.filter(|id| !id.is_empty()).map(str::to_string);
        self.run(move |conn| {
            let mut hashes: Vec<String> = Vec::new();

            if let Some(user_id) = user_id {
                let mut stmt = conn.prepare(
                    "SELECT passphrase_hash FROM credentials WHERE user_id = ?1 ORDER BY rowid",
                )?;
                for hash in stmt.query_map(params![user_id], |row| row.get::<_, String>(0))? {
                    let hash = hash?;
                    if !hashes.contains(&hash) {
                        hashes.push(hash);
                    }
                }
            }

            let mut stmt = conn.prepare(
                "SELECT passphrase_hash FROM credentials WHERE license_id = ?1 ORDER BY rowid",
            )?;
            for hash in stmt.query_map(params![license_id], |row| row.get::<_, String>(0))? {
                let hash = hash?;
                if !hashes.contains(&hash) {
                    hashes.push(hash);
                }
            }

            hashes
                .iter()
                .map(|hash| {
                    PassphraseHash::from_hex(hash)
                        .map_err(|e| StoreError::InvalidData(e.to_string()))
                })
                .collect()
        })
        .await
    }

    async fn store(
        &self,
        license_id: &str,
        user_id: Option<&str>,
        hash: &PassphraseHash,
    ) -> Result<()> {
        let license_id = license_id.to_string();
        let user_id = user_id.unwrap_or_default().to_string();
        let hash = hash.to_hex();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO credentials (license_id, user_id, passphrase_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![license_id, user_id, hash, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
