//! The LCP service.

use std::sync::Arc;

use lcp_core::{LicenseDocument, StatusDocument, StatusRel};
use lcp_protocol::ProtocolClient;
use lcp_store::{CredentialStore, InsertResult, LicenseRecord, LicenseRepository, StoreError};

use crate::auth::Authenticating;
use crate::clock::{Clock, SystemClock};
use crate::config::LcpConfig;
use crate::error::Result;
use crate::license::{apply_status, effective_state, License};
use crate::locks::LicenseLocks;
use crate::passphrase::resolve_content_key;

/// Opens licenses against a repository, a credential store and a status
/// server.
///
/// Cheap to share: all collaborators are behind `Arc`, and the per-license
/// locks are shared by every [`License`] the service opens.
pub struct LcpService<R: ?Sized, C: ?Sized, P: ?Sized> {
    repository: Arc<R>,
    credentials: Arc<C>,
    client: Arc<P>,
    config: LcpConfig,
    locks: Arc<LicenseLocks>,
    clock: Arc<dyn Clock>,
}

impl<R, C, P> LcpService<R, C, P>
where
    R: LicenseRepository + ?Sized,
    C: CredentialStore + ?Sized,
    P: ProtocolClient + ?Sized,
{
    pub fn new(repository: Arc<R>, credentials: Arc<C>, client: Arc<P>, config: LcpConfig) -> Self {
        Self {
            repository,
            credentials,
            client,
            config,
            locks: Arc::new(LicenseLocks::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LcpConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Open the license in `bytes`.
    ///
    /// The license is recorded on first open. Its status is then refreshed
    /// from the status server; when the server cannot be reached within
    /// [`LcpConfig::status_timeout`] the cached status is used instead. A
    /// usable license is unlocked, asking `authentication` for the
    /// passphrase when no stored one fits, and the device is registered
    /// when the server offers it.
    ///
    /// A license that is not usable still opens, without a content key.
    pub async fn open_license(
        &self,
        bytes: impl Into<bytes::Bytes>,
        authentication: Option<&dyn Authenticating>,
    ) -> Result<License<R, P>> {
        let license = LicenseDocument::parse(bytes)?;
        let license_id = license.id().to_string();

        let (license, status, state) = {
            let _guard = self.locks.acquire(&license_id).await;
            let inserted = self
                .repository
                .insert_new(&LicenseRecord::from_license(&license))
                .await?;
            tracing::debug!(license_id = %license_id, first_open = inserted == InsertResult::Inserted, "opening license");

            let (license, status) = match self.fetch_status(&license).await {
                Some(status) => {
                    let license = apply_status(
                        self.repository.as_ref(),
                        self.client.as_ref(),
                        license,
                        &status,
                    )
                    .await?;
                    (license, Some(status))
                }
                None => (license, None),
            };

            let record = self.current_record(&license_id).await?;
            let state = effective_state(&license, &record, status.as_ref(), self.clock.now());
            (license, status, state)
        };
        tracing::info!(license_id = %license_id, %state, offline = status.is_none(), "license state");

        // Not under the lock: prompting waits on the user.
        let key = if state.is_usable() {
            Some(
                resolve_content_key(
                    &license,
                    self.credentials.as_ref(),
                    authentication,
                    self.config.max_passphrase_prompts,
                )
                .await?,
            )
        } else {
            None
        };

        // Another session may have registered while we were unlocking.
        let _guard = self.locks.acquire(&license_id).await;
        let mut record = self.current_record(&license_id).await?;
        let status = match status {
            Some(status) if state.is_usable() && !record.registered => {
                let status = self.register(&license_id, status).await?;
                record = self.current_record(&license_id).await?;
                Some(status)
            }
            status => status,
        };

        Ok(License::new(
            license,
            status,
            record,
            key,
            self.config.device.clone(),
            self.repository.clone(),
            self.client.clone(),
            self.locks.clone(),
            self.clock.clone(),
        ))
    }

    /// Drop the local record of a license. Stored passphrases are kept.
    pub async fn forget(&self, license_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(license_id).await;
        let forgotten = self.repository.forget(license_id).await?;
        if forgotten {
            tracing::info!(license_id, "license forgotten");
        }
        Ok(forgotten)
    }

    /// The status document, or `None` when the server is unreachable.
    async fn fetch_status(&self, license: &LicenseDocument) -> Option<StatusDocument> {
        let fetch = self.client.fetch_status(license);
        match tokio::time::timeout(self.config.status_timeout, fetch).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::warn!(license_id = %license.id(), error = %e, "status fetch failed, using cached state");
                None
            }
            Err(_) => {
                tracing::warn!(
                    license_id = %license.id(),
                    timeout = ?self.config.status_timeout,
                    "status fetch timed out, using cached state"
                );
                None
            }
        }
    }

    /// Register this device if the server offers it.
    ///
    /// Registration failures never prevent opening the license; the status
    /// document fetched before is kept.
    async fn register(&self, license_id: &str, status: StatusDocument) -> Result<StatusDocument> {
        if !status.has_link(StatusRel::Register) || !status.status().is_open() {
            return Ok(status);
        }

        match self.client.register(&status, &self.config.device).await {
            Ok(registered) => {
                self.repository.mark_registered(license_id).await?;
                self.repository
                    .record_status(license_id, registered.status(), registered.status_updated())
                    .await?;
                tracing::info!(license_id, device = %self.config.device.id, "device registered");
                Ok(registered)
            }
            Err(e) => {
                tracing::warn!(license_id, error = %e, "device registration failed");
                Ok(status)
            }
        }
    }

    async fn current_record(&self, license_id: &str) -> Result<LicenseRecord> {
        self.repository
            .get(license_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(license_id.to_string()).into())
    }
}

impl<R: ?Sized, C: ?Sized, P: ?Sized> Clone for LcpService<R, C, P> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            credentials: self.credentials.clone(),
            client: self.client.clone(),
            config: self.config.clone(),
            locks: self.locks.clone(),
            clock: self.clock.clone(),
        }
    }
}
