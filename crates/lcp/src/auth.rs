//! Passphrase prompts.

use async_trait::async_trait;

use lcp_core::LicenseDocument;

/// Why the passphrase is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationReason {
    /// No stored passphrase unlocks the license.
    PassphraseNotFound,
    /// The previously entered passphrase was wrong.
    InvalidPassphrase,
}

/// Asks the user for a license passphrase.
///
/// Implementations typically show [`LicenseDocument::text_hint`] and the
/// provider's `hint` link. Returning `None` cancels the request.
#[async_trait]
pub trait Authenticating: Send + Sync {
    async fn retrieve_passphrase(
        &self,
        license: &LicenseDocument,
        reason: AuthenticationReason,
    ) -> Option<String>;
}
