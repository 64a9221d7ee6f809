//! Passphrase resolution.
//!
//! Stored hashes are tried first, in the order the credential store returns
//! them. Only when none of them unlocks the license is the user asked.

use lcp_core::LicenseDocument;
use lcp_crypto::{unlock, ContentKey, CryptoError, PassphraseHash};
use lcp_store::CredentialStore;

use crate::auth::{AuthenticationReason, Authenticating};
use crate::error::Result;

/// Find a passphrase unlocking `license` and return its content key.
///
/// A hash that unlocks the license is stored, so the next resolution
/// succeeds without prompting. Without `authentication`, or when the user
/// cancels, this fails with [`CryptoError::PassphraseNotFound`]. After
/// `max_prompts` wrong answers it fails with
/// [`CryptoError::InvalidPassphrase`].
pub async fn resolve_content_key<C>(
    license: &LicenseDocument,
    credentials: &C,
    authentication: Option<&dyn Authenticating>,
    max_prompts: u32,
) -> Result<ContentKey>
where
    C: CredentialStore + ?Sized,
{
    let license_id = license.id();
    let user_id = license.user().id.as_deref();

    let candidates = credentials.possible_passphrases(license_id, user_id).await?;
    tracing::debug!(license_id, candidates = candidates.len(), "trying stored passphrases");
    for hash in candidates {
        match unlock(license, &hash) {
            Ok(key) => {
                credentials.store(license_id, user_id, &hash).await?;
                return Ok(key);
            }
            Err(CryptoError::InvalidPassphrase) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let Some(authentication) = authentication else {
        return Err(CryptoError::PassphraseNotFound.into());
    };

    let mut reason = AuthenticationReason::PassphraseNotFound;
    for attempt in 1..=max_prompts {
        let Some(passphrase) = authentication.retrieve_passphrase(license, reason).await else {
            tracing::debug!(license_id, "passphrase prompt cancelled");
            return Err(CryptoError::PassphraseNotFound.into());
        };

        let hash = PassphraseHash::from_passphrase(&passphrase);
        match unlock(license, &hash) {
            Ok(key) => {
                credentials.store(license_id, user_id, &hash).await?;
                return Ok(key);
            }
            Err(CryptoError::InvalidPassphrase) => {
                tracing::info!(license_id, attempt, max_prompts, "invalid passphrase entered");
                reason = AuthenticationReason::InvalidPassphrase;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let error = match reason {
        AuthenticationReason::PassphraseNotFound => CryptoError::PassphraseNotFound,
        AuthenticationReason::InvalidPassphrase => CryptoError::InvalidPassphrase,
    };
    Err(error.into())
}
