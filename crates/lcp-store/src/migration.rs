//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated license store");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Local state of each license
        CREATE TABLE licenses (
            license_id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            issued INTEGER NOT NULL,          -- Unix ms
            updated INTEGER NOT NULL,         -- Unix ms
            copies_left INTEGER,              -- NULL = unlimited
            prints_left INTEGER,              -- NULL = unlimited
            rights_end INTEGER,               -- Unix ms, nullable
            status TEXT,                      -- last fetched status, nullable
            status_updated INTEGER,           -- Unix ms, nullable
            registered INTEGER NOT NULL DEFAULT 0
        );

        -- Passphrase hashes that unlocked a license
        CREATE TABLE credentials (
            license_id TEXT NOT NULL,
            user_id TEXT NOT NULL DEFAULT '', -- '' = unknown user
            passphrase_hash TEXT NOT NULL,    -- lowercase hex SHA-256
            created_at INTEGER NOT NULL,

            UNIQUE(license_id, user_id, passphrase_hash)
        );

        CREATE INDEX idx_credentials_license ON credentials(license_id);
        CREATE INDEX idx_credentials_user ON credentials(user_id);
        "#,
    )?;

    Ok(())
}
