//! Passphrase hashes, user keys and content keys.
//!
//! The chain is: passphrase → SHA-256 → [`PassphraseHash`] → (profile
//! transform) → [`UserKey`] → decrypts the license's content key →
//! [`ContentKey`]. A user key is only accepted once it decrypts the license
//! key check to the license identifier.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use lcp_core::media::{AES256_CBC, BASIC_PROFILE, SHA256};
use lcp_core::LicenseDocument;

use crate::cipher::{self, KEY_SIZE};
use crate::error::{CryptoError, Result};

/// SHA-256 of a user passphrase. The clear passphrase is never kept.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PassphraseHash([u8; 32]);

impl PassphraseHash {
    /// Hash a clear passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(Sha256::digest(passphrase.as_bytes()).into())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding, the form kept in the credential store.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex-encoded hash, in either case.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CryptoError::InvalidEncoding(format!("passphrase hash: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PassphraseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassphraseHash({}..)", &self.to_hex()[..8])
    }
}

/// Key that decrypts the content key of a license.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct UserKey([u8; KEY_SIZE]);

impl UserKey {
    /// Derive the user key of `license` from a passphrase hash.
    ///
    /// Only the basic profile is supported; its transform is the identity.
    pub fn derive(license: &LicenseDocument, hash: &PassphraseHash) -> Result<Self> {
        let encryption = license.encryption();
        if encryption.user_key.algorithm != SHA256 {
            return Err(CryptoError::UnsupportedAlgorithm(
                encryption.user_key.algorithm.clone(),
            ));
        }
        if encryption.profile != BASIC_PROFILE {
            return Err(CryptoError::UnsupportedProfile(encryption.profile.clone()));
        }
        Ok(Self(*hash.as_bytes()))
    }

    /// Check that this key decrypts the license key check to the license id.
    pub fn verify(&self, license: &LicenseDocument) -> Result<()> {
        let key_check = &license.encryption().user_key.key_check;
        match cipher::decrypt_padded(&self.0, key_check) {
            Ok(plaintext) if plaintext == license.id().as_bytes() => Ok(()),
            _ => Err(CryptoError::InvalidPassphrase),
        }
    }

    /// Decrypt the content key of `license`.
    ///
    /// Call [`UserKey::verify`] first: a wrong key may still produce a
    /// well-padded 32-byte value.
    pub fn decrypt_content_key(&self, license: &LicenseDocument) -> Result<ContentKey> {
        let content_key = &license.encryption().content_key;
        if content_key.algorithm != AES256_CBC {
            return Err(CryptoError::UnsupportedAlgorithm(
                content_key.algorithm.clone(),
            ));
        }

        let mut plaintext = cipher::decrypt_padded(&self.0, &content_key.encrypted_value)?;
        let result = <[u8; KEY_SIZE]>::try_from(plaintext.as_slice())
            .map(ContentKey)
            .map_err(|_| {
                CryptoError::DecryptionFailed(format!(
                    "content key has {} bytes, expected {KEY_SIZE}",
                    plaintext.len()
                ))
            });
        plaintext.zeroize();
        result
    }
}

/// The content-encryption key of a license. Zeroed when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(..)")
    }
}

/// Derive, verify and unwrap the content key of `license` from `hash`.
pub fn unlock(license: &LicenseDocument, hash: &PassphraseHash) -> Result<ContentKey> {
    let user_key = UserKey::derive(license, hash)?;
    user_key.verify(license)?;
    let key = user_key.decrypt_content_key(license)?;
    tracing::debug!(license_id = %license.id(), "content key unlocked");
    Ok(key)
}
