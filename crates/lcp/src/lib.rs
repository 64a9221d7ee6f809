//! # LCP
//!
//! The unified API of the LCP license core: open a license, unlock its
//! content key, drive the status protocol and decrypt publication
//! resources.
//!
//! ## Overview
//!
//! - **Opening**: [`LcpService::open_license`] parses the license, records
//!   it, refreshes its status (falling back to the cached state offline),
//!   resolves the passphrase and registers the device
//! - **Using**: a [`License`] reports its [`EffectiveState`], consumes copy
//!   and print rights and hands out a [`PublicationDecryptor`]
//! - **Lending**: [`License::renew`] and [`License::return_publication`]
//!   talk to the status server under a per-license lock
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lcp::store::SqliteStore;
//! use lcp::{LcpConfig, LcpService};
//!
//! async fn example(license_bytes: Vec<u8>) -> lcp::Result<()> {
//!     let config = LcpConfig::from_env();
//!     let client = Arc::new(config.http_client().map_err(lcp::protocol::ProtocolError::from)?);
//!     let store = Arc::new(SqliteStore::open("licenses.db")?);
//!
//!     let service = LcpService::new(store.clone(), store, client, config);
//!     let license = service.open_license(license_bytes, None).await?;
//!     println!("{}", license.effective_state());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `lcp::core` - Documents, links and the license state machine
//! - `lcp::crypto` - Key derivation and resource decryption
//! - `lcp::store` - License repository and credential store
//! - `lcp::protocol` - Status protocol client

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod license;
pub mod locks;
pub mod passphrase;
pub mod resource;
pub mod service;

// Re-export component crates
pub use lcp_core as core;
pub use lcp_crypto as crypto;
pub use lcp_protocol as protocol;
pub use lcp_store as store;

// Re-export main types for convenience
pub use auth::{AuthenticationReason, Authenticating};
pub use clock::{Clock, SystemClock};
pub use config::LcpConfig;
pub use error::{LcpError, Result};
pub use license::License;
pub use locks::LicenseLocks;
pub use passphrase::resolve_content_key;
pub use resource::{PublicationDecryptor, ResourceContainer};
pub use service::LcpService;

// Re-export commonly used core types
pub use lcp_core::{
    Action, EffectiveState, LicenseDocument, Right, Status, StatusDocument,
};
pub use lcp_crypto::{Compression, ResourceEncryption};
