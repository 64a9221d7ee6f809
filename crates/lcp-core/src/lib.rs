//! # LCP Core
//!
//! Pure primitives for the LCP license core: the License and Status
//! documents, their typed links, and the license state machine.
//!
//! This crate contains no I/O, no storage, no networking. Documents are
//! built from bytes and never mutated afterwards.
//!
//! ## Key Types
//!
//! - [`LicenseDocument`] - A validated License Document
//! - [`StatusDocument`] - A validated Status Document
//! - [`Links`] - Ordered, typed link collection with first-match lookups
//! - [`EffectiveState`] - Usability of a license at a given instant
//! - [`RightsCounters`] - Remaining copy and print allowances
//!
//! ## Parsing
//!
//! ```rust,no_run
//! use lcp_core::{LicenseDocument, LicenseRel};
//!
//! # fn example(bytes: Vec<u8>) -> Result<(), lcp_core::ParseError> {
//! let license = LicenseDocument::parse(bytes)?;
//! let status_url = license.url(
//!     LicenseRel::Status,
//!     Some(lcp_core::media::LCP_STATUS_DOCUMENT),
//!     &[],
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod license;
pub mod link;
pub mod media;
pub mod rights;
pub mod state;
pub mod status;

pub use error::{ParseError, Result, RightsError, StateError};
pub use license::{ContentKeyInfo, Encryption, LicenseDocument, Rights, Signature, User, UserKeyInfo};
pub use link::{expand_template, LicenseRel, Link, Links, Relation, StatusRel};
pub use rights::{Right, RightsCounters};
pub use state::{check_action, evaluate, Action, EffectiveState, StateInput};
pub use status::{Event, EventKind, PotentialRights, Status, StatusDocument};
