//! Error types for key resolution and decryption.

use thiserror::Error;

/// Errors that can occur while resolving keys or decrypting resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// No known or supplied passphrase unlocks the license.
    #[error("no passphrase found for the license")]
    PassphraseNotFound,

    /// The passphrase failed the license key check.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// Corrupt ciphertext, bad padding or a failed inflate.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// The license profile has no user-key transform available here.
    #[error("unsupported license profile: {0}")]
    UnsupportedProfile(String),

    /// A stored key or hash could not be decoded.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
