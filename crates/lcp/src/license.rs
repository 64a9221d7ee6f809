//! An opened license.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use lcp_core::{
    check_action, evaluate, Action, EffectiveState, LicenseDocument, Right, RightsError,
    StateInput, StatusDocument,
};
use lcp_crypto::ContentKey;
use lcp_protocol::{DeviceInfo, ProtocolClient};
use lcp_store::{LicenseRecord, LicenseRepository, StoreError};

use crate::clock::Clock;
use crate::error::{LcpError, Result};
use crate::locks::LicenseLocks;
use crate::resource::{PublicationDecryptor, ResourceContainer};

/// Persist a freshly received status document, and pick up the newer
/// license it announces.
///
/// Returns the license to use from now on. Failing to fetch the newer
/// license is logged and the current one is kept. The newer license is
/// fetched before anything is written, and the repository sees a single
/// write, so dropping this future leaves the record as it was.
pub(crate) async fn apply_status<R, P>(
    repository: &R,
    client: &P,
    license: LicenseDocument,
    status: &StatusDocument,
) -> Result<LicenseDocument>
where
    R: LicenseRepository + ?Sized,
    P: ProtocolClient + ?Sized,
{
    let license_id = license.id().to_string();
    let Some(updated) = newer_license(client, &license, status).await else {
        repository
            .record_status(&license_id, status.status(), status.status_updated())
            .await?;
        return Ok(license);
    };

    repository
        .record_license_update(&license_id, status.status(), status.status_updated(), &updated)
        .await?;
    tracing::info!(
        license_id = %license_id,
        updated = %updated.updated(),
        "license document updated"
    );
    Ok(updated)
}

async fn newer_license<P>(
    client: &P,
    license: &LicenseDocument,
    status: &StatusDocument,
) -> Option<LicenseDocument>
where
    P: ProtocolClient + ?Sized,
{
    if status.license_updated() <= license.updated() {
        return None;
    }
    match client.fetch_license(status).await {
        Ok(updated) if updated.id() == license.id() => Some(updated),
        Ok(updated) => {
            tracing::warn!(
                license_id = %license.id(),
                received = %updated.id(),
                "ignoring updated license with a different identifier"
            );
            None
        }
        Err(e) => {
            tracing::warn!(license_id = %license.id(), error = %e, "could not fetch updated license");
            None
        }
    }
}

/// Compute the state of a license from its persisted record.
pub(crate) fn effective_state(
    license: &LicenseDocument,
    record: &LicenseRecord,
    status: Option<&StatusDocument>,
    now: DateTime<Utc>,
) -> EffectiveState {
    let mut input = StateInput::new()
        .with_rights(license.rights())
        .with_end(record.rights_end.or(license.rights().end))
        .with_cached_status(record.status, record.status_updated);
    if let Some(status) = status {
        input = input.with_status_document(status);
    }
    evaluate(&input, now)
}

/// A license opened by [`LcpService`](crate::LcpService).
///
/// Holds the content key while the license is usable. Every interaction
/// with the status server takes the license lock and writes the repository
/// before returning; dropping the future of an interaction before the
/// server answered leaves the repository untouched.
pub struct License<R: ?Sized, P: ?Sized> {
    document: LicenseDocument,
    status: Option<StatusDocument>,
    record: LicenseRecord,
    key: Option<Arc<ContentKey>>,
    device: DeviceInfo,
    repository: Arc<R>,
    client: Arc<P>,
    locks: Arc<LicenseLocks>,
    clock: Arc<dyn Clock>,
}

impl<R, P> License<R, P>
where
    R: LicenseRepository + ?Sized,
    P: ProtocolClient + ?Sized,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        document: LicenseDocument,
        status: Option<StatusDocument>,
        record: LicenseRecord,
        key: Option<ContentKey>,
        device: DeviceInfo,
        repository: Arc<R>,
        client: Arc<P>,
        locks: Arc<LicenseLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            document,
            status,
            record,
            key: key.map(Arc::new),
            device,
            repository,
            client,
            locks,
            clock,
        }
    }

    pub fn id(&self) -> &str {
        self.document.id()
    }

    pub fn document(&self) -> &LicenseDocument {
        &self.document
    }

    /// The status document, when the status server was reachable.
    pub fn status_document(&self) -> Option<&StatusDocument> {
        self.status.as_ref()
    }

    /// Whether the session runs on cached state.
    pub fn is_offline(&self) -> bool {
        self.status.is_none()
    }

    /// Last known persisted state.
    pub fn record(&self) -> &LicenseRecord {
        &self.record
    }

    /// The state of the license now.
    pub fn effective_state(&self) -> EffectiveState {
        effective_state(
            &self.document,
            &self.record,
            self.status.as_ref(),
            self.clock.now(),
        )
    }

    /// End of the rights, renewals included.
    pub fn rights_end(&self) -> Option<DateTime<Utc>> {
        self.record.rights_end
    }

    /// Check that `action` is allowed now.
    pub fn check(&self, action: Action) -> Result<()> {
        Ok(check_action(
            action,
            &self.effective_state(),
            self.status.as_ref(),
        )?)
    }

    /// A decryptor for the publication's resources.
    pub fn decryptor<C: ResourceContainer>(&self, container: C) -> Result<PublicationDecryptor<C>> {
        let state = self.effective_state();
        let key = match &self.key {
            Some(key) if state.is_usable() => key.clone(),
            _ => return Err(LcpError::NotUsable(state)),
        };
        Ok(PublicationDecryptor::new(container, key))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rights
    // ─────────────────────────────────────────────────────────────────────────

    /// Remaining allowance of `right`. `None` means unlimited.
    pub async fn rights_left(&self, right: Right) -> Result<Option<u32>> {
        Ok(self.current_record().await?.counters().left(right))
    }

    pub async fn can_copy(&self, characters: u32) -> Result<bool> {
        self.can_consume(Action::Copy, Right::Copy, characters).await
    }

    /// Consume `characters` of the copy right.
    pub async fn copy(&mut self, characters: u32) -> Result<()> {
        self.consume(Action::Copy, Right::Copy, characters).await
    }

    pub async fn can_print(&self, pages: u32) -> Result<bool> {
        self.can_consume(Action::Print, Right::Print, pages).await
    }

    /// Consume `pages` of the print right.
    pub async fn print(&mut self, pages: u32) -> Result<()> {
        self.consume(Action::Print, Right::Print, pages).await
    }

    async fn can_consume(&self, action: Action, right: Right, amount: u32) -> Result<bool> {
        if self.check(action).is_err() {
            return Ok(false);
        }
        Ok(self
            .current_record()
            .await?
            .counters()
            .can_consume(right, amount))
    }

    async fn consume(&mut self, action: Action, right: Right, amount: u32) -> Result<()> {
        self.check(action)?;
        let consumed = self
            .repository
            .consume_right(self.id(), right, amount)
            .await?;
        self.record = self.current_record().await?;

        if !consumed {
            return Err(RightsError::Exhausted {
                right,
                left: self.record.counters().left(right).unwrap_or_default(),
                requested: amount,
            }
            .into());
        }
        tracing::debug!(license_id = %self.id(), ?right, amount, "right consumed");
        Ok(())
    }

    async fn current_record(&self) -> Result<LicenseRecord> {
        self.repository
            .get(self.id())
            .await?
            .ok_or_else(|| StoreError::NotFound(self.id().to_string()).into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status protocol
    // ─────────────────────────────────────────────────────────────────────────

    /// Extend the loan, to `end` when given.
    pub async fn renew(&mut self, end: Option<DateTime<Utc>>) -> Result<()> {
        let _guard = self.locks.acquire(self.document.id()).await;
        let status = self.require_status()?;
        self.check(Action::Renew)?;

        let updated = self.client.renew(status, &self.device, end).await?;
        self.accept_status(updated).await?;
        tracing::info!(license_id = %self.id(), end = ?self.record.rights_end, "license renewed");
        Ok(())
    }

    /// Return the publication. The license is no longer usable afterwards.
    pub async fn return_publication(&mut self) -> Result<()> {
        let _guard = self.locks.acquire(self.document.id()).await;
        let status = self.require_status()?;
        self.check(Action::Return)?;

        let updated = self.client.return_license(status, &self.device).await?;
        self.accept_status(updated).await?;
        self.drop_key_if_unusable();
        tracing::info!(license_id = %self.id(), "publication returned");
        Ok(())
    }

    /// Fetch the status document again.
    ///
    /// On failure the session keeps its previous state and the error is
    /// returned.
    pub async fn refresh(&mut self) -> Result<EffectiveState> {
        let _guard = self.locks.acquire(self.document.id()).await;
        let status = self.client.fetch_status(&self.document).await?;
        self.accept_status(status).await?;
        self.drop_key_if_unusable();
        Ok(self.effective_state())
    }

    fn require_status(&self) -> Result<&StatusDocument> {
        self.status.as_ref().ok_or(LcpError::Offline)
    }

    async fn accept_status(&mut self, status: StatusDocument) -> Result<()> {
        self.document = apply_status(
            self.repository.as_ref(),
            self.client.as_ref(),
            self.document.clone(),
            &status,
        )
        .await?;
        self.status = Some(status);
        self.record = self.current_record().await?;
        Ok(())
    }

    fn drop_key_if_unusable(&mut self) {
        let state = self.effective_state();
        if !state.is_usable() && self.key.take().is_some() {
            tracing::debug!(license_id = %self.id(), %state, "content key released");
        }
    }
}

impl<R: ?Sized, P: ?Sized> std::fmt::Debug for License<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("License")
            .field("id", &self.document.id())
            .field("status", &self.record.status)
            .field("offline", &self.status.is_none())
            .field("unlocked", &self.key.is_some())
            .finish()
    }
}
