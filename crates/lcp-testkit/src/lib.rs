//! # LCP Testkit
//!
//! Testing utilities for the LCP license core.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Real, encrypted License Documents and Status Documents
//! - **Fakes**: An in-process status server, a memory publication, a scripted
//!   passphrase prompt and a manual clock
//! - **Generators**: Proptest strategies for property-based testing
//!
//! The integration tests of the workspace live in this crate's `tests/`.
//!
//! ## Test Fixtures
//!
//! ```rust
//! use lcp_testkit::fixtures::LicenseFixture;
//! use lcp_crypto::Compression;
//!
//! let fixture = LicenseFixture::new("license-1", "secret").with_copies(10);
//! let license = fixture.document();
//! let chapter = fixture.encrypt_resource(b"<html/>", Compression::None);
//! assert_eq!(license.id(), "license-1");
//! assert_eq!(chapter.len(), 32);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use lcp_testkit::generators::license_missing_field;
//!
//! proptest! {
//!     #[test]
//!     fn incomplete_licenses_are_rejected((field, json) in license_missing_field()) {
//!         let bytes = serde_json::to_vec(&json).unwrap();
//!         prop_assert!(lcp_core::LicenseDocument::parse(bytes).is_err());
//!     }
//! }
//! ```

pub mod fakes;
pub mod fixtures;
pub mod generators;

pub use fakes::{FakeProtocol, ManualClock, MemoryContainer, Operation, StaticAuthenticator};
pub use fixtures::{date, LicenseFixture, StatusFixture};
