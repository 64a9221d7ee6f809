//! Error types for the LCP service.

use lcp_core::{EffectiveState, ParseError, RightsError, StateError};
use lcp_crypto::CryptoError;
use lcp_protocol::ProtocolError;
use lcp_store::StoreError;
use thiserror::Error;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum LcpError {
    /// A license or status document failed to parse.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Key resolution or decryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Status server error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The action is not allowed in the current license state.
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("rights error: {0}")]
    Rights(#[from] RightsError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The license cannot be used to read the publication.
    #[error("license is not usable: {0}")]
    NotUsable(EffectiveState),

    /// The status document could not be fetched, so the interaction is not
    /// possible.
    #[error("status server unavailable: this action requires a connection")]
    Offline,

    /// The publication container failed to provide a resource.
    #[error("resource error: {0}")]
    Resource(String),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, LcpError>;
