//! AES-256-CBC with a 16-byte IV prefix.
//!
//! Every LCP ciphertext (key check, content key, resources) is laid out as
//! `IV || blocks`, where the IV is the first 16 bytes.

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{CryptoError, Result};

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

fn split_iv(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < 2 * BLOCK_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext too short: {} bytes",
            data.len()
        )));
    }
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext is not block aligned: {} bytes",
            data.len()
        )));
    }
    Ok(data.split_at(BLOCK_SIZE))
}

fn decryptor(key: &[u8; KEY_SIZE], iv: &[u8]) -> Result<Aes256CbcDec> {
    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Decrypt `IV || ciphertext` and strip PKCS#7 padding.
pub fn decrypt_padded(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    let (iv, ciphertext) = split_iv(data)?;
    decryptor(key, iv)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("invalid padding".into()))
}

/// Decrypt `IV || ciphertext` and keep the padding bytes.
///
/// Used for windows in the middle of a resource, where the last block is
/// not the padded one.
pub fn decrypt_unpadded(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    let (iv, ciphertext) = split_iv(data)?;
    decryptor(key, iv)?
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("ciphertext is not block aligned".into()))
}

/// Encrypt `plaintext` with PKCS#7 padding and return `IV || ciphertext`.
pub fn encrypt(key: &[u8; KEY_SIZE], iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK_SIZE + plaintext.len() + BLOCK_SIZE);
    out.extend_from_slice(iv);
    out.extend(
        Aes256CbcEnc::new(&(*key).into(), &(*iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = random_key();
        let iv = [7u8; BLOCK_SIZE];
        let plaintext = b"The quick brown fox jumps over the lazy dog";

        let encrypted = encrypt(&key, &iv, plaintext);
        assert_eq!(&encrypted[..BLOCK_SIZE], &iv);
        assert_eq!(encrypted.len() % BLOCK_SIZE, 0);

        let decrypted = decrypt_padded(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_block_aligned_plaintext_gets_full_padding_block() {
        let key = random_key();
        let encrypted = encrypt(&key, &[0u8; BLOCK_SIZE], &[1u8; 32]);
        assert_eq!(encrypted.len(), BLOCK_SIZE + 48);

        let raw = decrypt_unpadded(&key, &encrypted).unwrap();
        assert_eq!(raw.len(), 48);
        assert_eq!(&raw[32..], &[16u8; 16]);
    }

    #[test]
    fn test_wrong_key_does_not_yield_plaintext() {
        let key = random_key();
        let other = random_key();
        let encrypted = encrypt(&key, &[3u8; BLOCK_SIZE], b"license-id");

        match decrypt_padded(&other, &encrypted) {
            Err(CryptoError::DecryptionFailed(_)) => {}
            Ok(garbage) => assert_ne!(garbage, b"license-id"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_rejects_short_and_unaligned_input() {
        let key = random_key();
        assert!(matches!(
            decrypt_padded(&key, &[0u8; 16]),
            Err(CryptoError::DecryptionFailed(_))
        ));
        assert!(matches!(
            decrypt_unpadded(&key, &[0u8; 40]),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }
}
