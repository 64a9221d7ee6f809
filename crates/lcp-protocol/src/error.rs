//! Error types for the protocol module.

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use lcp_core::ParseError;

/// Errors raised by an [`HttpTransport`](crate::HttpTransport) before any
/// HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS failure or reset.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    /// The request could not be built or sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors that can occur while talking to a License Status Server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The server could not be reached.
    #[error("status server unreachable: {0}")]
    Unreachable(#[from] TransportError),

    /// The server answered with a 5xx status.
    #[error("status server error: HTTP {status}")]
    Server { status: u16 },

    /// The server refused access to the resource.
    #[error("access forbidden by the status server")]
    Forbidden,

    #[error("the license was already returned")]
    AlreadyReturned,

    /// The requested end date is past what the provider allows.
    #[error("invalid renewal period (latest allowed end: {max_end:?})")]
    InvalidRenewalPeriod { max_end: Option<DateTime<Utc>> },

    /// The server refused the request with a 4xx status.
    #[error("request rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The server answered with a document that does not parse.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] ParseError),

    /// The interaction must be completed by the user in a browser.
    #[error("interaction required at {url}")]
    InteractionRequired { url: Url },

    /// The document offers no link for this interaction.
    #[error("no `{0}` link available")]
    LinkNotAvailable(&'static str),
}

impl ProtocolError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Server { .. })
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
