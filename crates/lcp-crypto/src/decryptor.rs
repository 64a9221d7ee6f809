//! Resource decryption.
//!
//! Resources are `IV || AES-256-CBC(plaintext)` with PKCS#7 padding, and may
//! have been deflated before encryption. Deflated resources must be
//! decrypted in full. Other resources can be read by range: plaintext block
//! `k` only depends on ciphertext blocks `k` and `k - 1`, so a range is
//! served by decrypting the blocks that cover it plus the block before.

use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use lcp_core::media::{AES256_CBC, LCP_SCHEME};

use crate::cipher::{self, BLOCK_SIZE};
use crate::error::{CryptoError, Result};
use crate::key::ContentKey;

/// Compression applied to a resource before encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Raw DEFLATE, without zlib header.
    Deflate,
}

impl Compression {
    /// Parse a compression method as declared in encryption metadata, either
    /// by name or by ZIP method number.
    pub fn parse(method: Option<&str>) -> Result<Self> {
        match method.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("none") | Some("0") => Ok(Self::None),
            Some("deflate") | Some("8") => Ok(Self::Deflate),
            Some(other) => Err(CryptoError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// Encryption metadata of one resource of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEncryption {
    /// Encryption scheme URI. Absent means LCP.
    pub scheme: Option<String>,
    /// Encryption algorithm URI.
    pub algorithm: String,
    pub compression: Compression,
    /// Plaintext length before compression and encryption, when declared.
    pub original_length: Option<u64>,
}

impl ResourceEncryption {
    /// LCP AES-256-CBC encryption with no compression.
    pub fn aes256_cbc() -> Self {
        Self {
            scheme: Some(LCP_SCHEME.to_string()),
            algorithm: AES256_CBC.to_string(),
            compression: Compression::None,
            original_length: None,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_original_length(mut self, length: u64) -> Self {
        self.original_length = Some(length);
        self
    }

    pub fn is_deflated(&self) -> bool {
        self.compression == Compression::Deflate
    }

    /// Whether byte ranges can be decrypted without the whole resource.
    pub fn supports_ranges(&self) -> bool {
        !self.is_deflated()
    }

    /// Reject schemes and algorithms this engine cannot decrypt.
    pub fn validate(&self) -> Result<()> {
        if let Some(scheme) = &self.scheme {
            if scheme != LCP_SCHEME {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "encryption scheme {scheme}"
                )));
            }
        }
        if self.algorithm != AES256_CBC {
            return Err(CryptoError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        Ok(())
    }
}

/// The ciphertext bytes needed to serve a plaintext range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbcWindow {
    /// Requested plaintext range.
    pub plaintext: Range<u64>,
    /// Ciphertext range to read, starting with the block used as IV.
    pub encrypted: Range<u64>,
}

impl CbcWindow {
    /// Compute the window for `plaintext` in a resource of `encrypted_len`
    /// bytes (IV included).
    pub fn for_range(plaintext: Range<u64>, encrypted_len: u64) -> Self {
        let block = BLOCK_SIZE as u64;
        // Open-ended ranges (`n..u64::MAX`) are clamped before alignment.
        let start = floor_multiple(plaintext.start.min(encrypted_len), block);
        let end = ceil_multiple(plaintext.end.min(encrypted_len), block).saturating_add(block);
        Self {
            encrypted: start.min(encrypted_len)..end.min(encrypted_len),
            plaintext,
        }
    }

    /// Plaintext offset of the first decrypted byte.
    fn first_plaintext_offset(&self) -> u64 {
        self.encrypted.start
    }
}

fn floor_multiple(value: u64, divisor: u64) -> u64 {
    value / divisor * divisor
}

fn ceil_multiple(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor).saturating_mul(divisor)
}

/// Decrypts resources with a license content key.
#[derive(Debug, Clone)]
pub struct ResourceDecryptor {
    key: Arc<ContentKey>,
}

impl ResourceDecryptor {
    pub fn new(key: Arc<ContentKey>) -> Self {
        Self { key }
    }

    /// Decrypt a whole resource, then inflate it when it was deflated.
    pub fn decrypt_full(&self, encryption: &ResourceEncryption, data: &[u8]) -> Result<Vec<u8>> {
        encryption.validate()?;
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let plaintext = cipher::decrypt_padded(self.key.as_bytes(), data)?;
        match encryption.compression {
            Compression::None => Ok(plaintext),
            Compression::Deflate => inflate(&plaintext),
        }
    }

    /// Plaintext length of a non-deflated resource.
    ///
    /// Uses the declared original length when present; otherwise `tail` must
    /// hold the last two blocks of the resource, and the length is read from
    /// the padding byte.
    pub fn plaintext_length(
        &self,
        encryption: &ResourceEncryption,
        encrypted_len: u64,
        tail: Option<&[u8]>,
    ) -> Result<u64> {
        if let Some(length) = encryption.original_length {
            return Ok(length);
        }

        let block = BLOCK_SIZE as u64;
        if encrypted_len < 2 * block || encrypted_len % block != 0 {
            return Err(CryptoError::DecryptionFailed(format!(
                "invalid CBC resource length: {encrypted_len}"
            )));
        }
        let tail = tail.ok_or_else(|| {
            CryptoError::DecryptionFailed("missing trailing blocks to read padding".into())
        })?;
        if tail.len() != 2 * BLOCK_SIZE {
            return Err(CryptoError::DecryptionFailed(format!(
                "expected {} trailing bytes, got {}",
                2 * BLOCK_SIZE,
                tail.len()
            )));
        }

        let last = cipher::decrypt_unpadded(self.key.as_bytes(), tail)?;
        let padding = last.last().copied().unwrap_or_default() as u64;
        if padding == 0 || padding > block {
            return Err(CryptoError::DecryptionFailed(format!(
                "invalid padding length: {padding}"
            )));
        }
        Ok(encrypted_len - block - padding)
    }

    /// Decrypt the bytes of `window` and slice out the requested range.
    ///
    /// `encrypted` must be the resource bytes at `window.encrypted`, and
    /// `plaintext_len` the value returned by [`Self::plaintext_length`].
    pub fn decrypt_window(
        &self,
        encryption: &ResourceEncryption,
        window: &CbcWindow,
        encrypted: &[u8],
        plaintext_len: u64,
    ) -> Result<Vec<u8>> {
        encryption.validate()?;
        if !encryption.supports_ranges() {
            return Err(CryptoError::UnsupportedCompression(
                "deflated resources cannot be read by range".into(),
            ));
        }

        let end = window.plaintext.end.min(plaintext_len);
        if window.plaintext.start >= end {
            return Ok(Vec::new());
        }

        let expected = (window.encrypted.end - window.encrypted.start) as usize;
        if encrypted.len() != expected {
            return Err(CryptoError::DecryptionFailed(format!(
                "short read: expected {expected} encrypted bytes, got {}",
                encrypted.len()
            )));
        }

        let plaintext = cipher::decrypt_unpadded(self.key.as_bytes(), encrypted)?;
        let offset = window.first_plaintext_offset();
        let from = (window.plaintext.start - offset) as usize;
        let to = ((end - offset) as usize).min(plaintext.len());
        if from > to {
            return Err(CryptoError::DecryptionFailed(
                "window does not cover the requested range".into(),
            ));
        }
        Ok(plaintext[from..to].to_vec())
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::DecryptionFailed(format!("inflate: {e}")))?;
    Ok(out)
}
