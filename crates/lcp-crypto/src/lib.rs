//! # LCP Crypto
//!
//! Key resolution and resource decryption.
//!
//! ## Overview
//!
//! A license is unlocked in three steps:
//!
//! 1. A user passphrase is hashed into a [`PassphraseHash`]
//! 2. The hash is turned into a [`UserKey`], which must decrypt the license
//!    key check to the license identifier
//! 3. The user key unwraps the license [`ContentKey`]
//!
//! The content key then drives a [`ResourceDecryptor`], which decrypts
//! publication resources in full or by byte range.
//!
//! Key material is zeroed on drop and never printed by `Debug`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lcp_crypto::{unlock, PassphraseHash, ResourceDecryptor, ResourceEncryption};
//!
//! # fn example(license: &lcp_core::LicenseDocument, data: &[u8]) -> lcp_crypto::Result<()> {
//! let key = unlock(license, &PassphraseHash::from_passphrase("passphrase"))?;
//! let decryptor = ResourceDecryptor::new(Arc::new(key));
//! let plaintext = decryptor.decrypt_full(&ResourceEncryption::aes256_cbc(), data)?;
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod decryptor;
pub mod error;
pub mod key;

pub use decryptor::{CbcWindow, Compression, ResourceDecryptor, ResourceEncryption};
pub use error::{CryptoError, Result};
pub use key::{unlock, ContentKey, PassphraseHash, UserKey};
