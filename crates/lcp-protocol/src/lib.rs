//! # LCP Protocol
//!
//! Client for the License Status Document protocol.
//!
//! ## Overview
//!
//! A license points to a status server through its `status` link. The
//! server answers with a Status Document that carries the authoritative
//! license status and links for the interactions it currently allows:
//! registering a device, renewing the loan and returning the publication.
//!
//! ## Key Types
//!
//! - [`ProtocolClient`] - The protocol operations
//! - [`LsdClient`] - Implementation over any [`HttpTransport`], with retries
//! - [`ReqwestTransport`] - reqwest-backed transport (feature `http`)
//! - [`memory::ScriptedTransport`] - Scripted transport for tests
//! - [`RetryPolicy`] - Exponential backoff with full jitter
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lcp_protocol::{DeviceInfo, LsdClient, ProtocolClient, TransportConfig};
//!
//! # async fn example(license: &lcp_core::LicenseDocument) -> Result<(), Box<dyn std::error::Error>> {
//! let client = LsdClient::with_reqwest(&TransportConfig::default())?;
//! let status = client.fetch_status(license).await?;
//! let status = client.register(&status, &DeviceInfo::generate("My Reader")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Connection failures and 5xx responses are retried. Every other failure is
//! mapped to a [`ProtocolError`] variant and returned at once.

pub mod client;
pub mod device;
pub mod error;
pub mod retry;
pub mod transport;

pub use client::{LsdClient, ProtocolClient, STATUS_TIMEOUT};
pub use device::DeviceInfo;
pub use error::{ProtocolError, Result, TransportError};
pub use retry::RetryPolicy;
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{memory, HttpRequest, HttpResponse, HttpTransport, Method, TransportConfig};
