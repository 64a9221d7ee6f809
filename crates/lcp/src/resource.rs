//! Decryption of publication resources.

use std::collections::HashMap;
use std::io;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use lcp_crypto::{CbcWindow, ContentKey, CryptoError, ResourceDecryptor, ResourceEncryption};

use crate::error::{LcpError, Result};

/// Gives access to the stored bytes of a publication's resources.
#[async_trait]
pub trait ResourceContainer: Send + Sync {
    /// Stored length of the resource at `path`.
    async fn length(&self, path: &str) -> io::Result<u64>;

    /// Stored bytes of the resource at `path`, restricted to `range` when
    /// given. A range past the end is truncated.
    async fn read(&self, path: &str, range: Option<Range<u64>>) -> io::Result<Bytes>;
}

fn resource_error(path: &str, error: io::Error) -> LcpError {
    LcpError::Resource(format!("{path}: {error}"))
}

/// Serves the plaintext of publication resources.
///
/// Resources without registered encryption metadata are served as stored.
pub struct PublicationDecryptor<C> {
    container: C,
    decryptor: ResourceDecryptor,
    resources: HashMap<String, ResourceEncryption>,
}

impl<C: ResourceContainer> PublicationDecryptor<C> {
    pub fn new(container: C, key: Arc<ContentKey>) -> Self {
        Self {
            container,
            decryptor: ResourceDecryptor::new(key),
            resources: HashMap::new(),
        }
    }

    /// Declare how the resource at `path` is encrypted.
    pub fn with_resource(mut self, path: impl Into<String>, encryption: ResourceEncryption) -> Self {
        self.resources.insert(path.into(), encryption);
        self
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn encryption(&self, path: &str) -> Option<&ResourceEncryption> {
        self.resources.get(path)
    }

    /// Plaintext bytes of the resource at `path`, restricted to `range`
    /// (end exclusive) when given.
    pub async fn decrypt(&self, path: &str, range: Option<Range<u64>>) -> Result<Bytes> {
        let Some(encryption) = self.resources.get(path) else {
            return self
                .container
                .read(path, range)
                .await
                .map_err(|e| resource_error(path, e));
        };
        encryption.validate()?;

        match range {
            Some(range) if encryption.supports_ranges() => {
                self.decrypt_range(path, encryption, range).await
            }
            range => {
                let plaintext = self.decrypt_full(path, encryption).await?;
                Ok(match range {
                    Some(range) => slice(&plaintext, range),
                    None => plaintext,
                })
            }
        }
    }

    /// Plaintext length of the resource at `path`.
    pub async fn length(&self, path: &str) -> Result<u64> {
        let stored = self
            .container
            .length(path)
            .await
            .map_err(|e| resource_error(path, e))?;
        let Some(encryption) = self.resources.get(path) else {
            return Ok(stored);
        };
        encryption.validate()?;

        if let Some(length) = encryption.original_length {
            return Ok(length);
        }
        if encryption.is_deflated() {
            return Ok(self.decrypt_full(path, encryption).await?.len() as u64);
        }
        self.plaintext_length(path, encryption, stored).await
    }

    async fn decrypt_full(&self, path: &str, encryption: &ResourceEncryption) -> Result<Bytes> {
        let data = self
            .container
            .read(path, None)
            .await
            .map_err(|e| resource_error(path, e))?;

        // Inflating may take a while; keep it off the async workers.
        let decryptor = self.decryptor.clone();
        let encryption = encryption.clone();
        let plaintext = tokio::task::spawn_blocking(move || decryptor.decrypt_full(&encryption, &data))
            .await
            .map_err(|e| CryptoError::DecryptionFailed(format!("decryption task failed: {e}")))??;
        Ok(Bytes::from(plaintext))
    }

    async fn plaintext_length(
        &self,
        path: &str,
        encryption: &ResourceEncryption,
        stored: u64,
    ) -> Result<u64> {
        if stored == 0 {
            return Ok(0);
        }
        let tail = match stored.checked_sub(32) {
            Some(start) if encryption.original_length.is_none() => Some(
                self.container
                    .read(path, Some(start..stored))
                    .await
                    .map_err(|e| resource_error(path, e))?,
            ),
            _ => None,
        };
        Ok(self
            .decryptor
            .plaintext_length(encryption, stored, tail.as_deref())?)
    }

    async fn decrypt_range(
        &self,
        path: &str,
        encryption: &ResourceEncryption,
        range: Range<u64>,
    ) -> Result<Bytes> {
        if range.start >= range.end {
            return Ok(Bytes::new());
        }
        let stored = self
            .container
            .length(path)
            .await
            .map_err(|e| resource_error(path, e))?;
        let plaintext_len = self.plaintext_length(path, encryption, stored).await?;
        if range.start >= plaintext_len {
            return Ok(Bytes::new());
        }

        let window = CbcWindow::for_range(range, stored);
        let encrypted = self
            .container
            .read(path, Some(window.encrypted.clone()))
            .await
            .map_err(|e| resource_error(path, e))?;
        let plaintext = self
            .decryptor
            .decrypt_window(encryption, &window, &encrypted, plaintext_len)?;
        Ok(Bytes::from(plaintext))
    }
}

fn slice(data: &Bytes, range: Range<u64>) -> Bytes {
    let len = data.len() as u64;
    let end = range.end.min(len);
    let start = range.start.min(end);
    data.slice(start as usize..end as usize)
}
