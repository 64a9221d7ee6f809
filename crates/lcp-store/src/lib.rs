//! # LCP Store
//!
//! Persistence for the LCP license core. Provides trait-based interfaces
//! for license state and passphrase hashes, with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The store abstracts persistence behind two traits, allowing the service
//! to be storage-agnostic. The primary implementation is [`SqliteStore`],
//! with [`MemoryStore`] for testing. Both implement both traits.
//!
//! ## Key Types
//!
//! - [`LicenseRepository`] - Per-license state: rights, status, registration
//! - [`CredentialStore`] - Passphrase hashes known to unlock licenses
//! - [`LicenseRecord`] - The persisted state of one license
//! - [`InsertResult`] - Result of inserting a record
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lcp_store::{LicenseRepository, SqliteStore};
//!
//! async fn example() -> lcp_store::Result<()> {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("licenses.db")?;
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory()?;
//!
//!     if let Some(record) = store.get("license-id").await? {
//!         println!("{} copies left", record.copies_left.unwrap_or(u32::MAX));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting a known license returns `AlreadyExists`
//!   and never resets consumed rights
//! - **Atomic consumption**: `consume_right` checks and decrements in one step
//! - **Hashes only**: Clear passphrases are never stored

pub mod error;
pub mod memory;
pub mod migration;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use record::{CredentialEntry, LicenseRecord};
pub use sqlite::SqliteStore;
pub use traits::{CredentialStore, InsertResult, LicenseRepository};
