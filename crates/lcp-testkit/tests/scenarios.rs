//! End-to-end license scenarios against in-memory collaborators.

mod common;

use chrono::Duration;

use common::{init_tracing, Harness};
use lcp::core::{RightsError, StateError};
use lcp::crypto::{CryptoError, PassphraseHash};
use lcp::store::CredentialStore;
use lcp::{
    resolve_content_key, Action, AuthenticationReason, EffectiveState, LcpError, Right, Status,
};
use lcp_testkit::{date, LicenseFixture, MemoryContainer, Operation, StaticAuthenticator, StatusFixture};

// ─────────────────────────────────────────────────────────────────────────────
// Rights
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_exhausted_copy_right_is_a_rights_error() {
    init_tracing();
    let h = Harness::new();
    let fixture = LicenseFixture::new("scenario-a", "secret").with_copies(0);
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert_eq!(license.effective_state(), EffectiveState::Usable(Status::Active));
    assert!(license.check(Action::Copy).is_ok());

    assert!(!license.can_copy(1).await.unwrap());
    let err = license.copy(1).await.unwrap_err();
    assert!(
        matches!(
            err,
            LcpError::Rights(RightsError::Exhausted {
                right: Right::Copy,
                left: 0,
                requested: 1
            })
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_rights_are_consumed_and_kept_across_opens() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("rights", "secret")
        .with_copies(10)
        .with_prints(2);
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    license.copy(7).await.unwrap();
    license.print(2).await.unwrap();
    assert_eq!(license.record().copies_left, Some(3));
    assert!(license.print(1).await.is_err());

    let license = h.service.open_license(fixture.to_bytes(), None).await.unwrap();
    assert_eq!(license.rights_left(Right::Copy).await.unwrap(), Some(3));
    assert_eq!(license.rights_left(Right::Print).await.unwrap(), Some(0));
    assert!(license.can_copy(3).await.unwrap());
    assert!(!license.can_copy(4).await.unwrap());
}

#[tokio::test]
async fn test_unlimited_rights() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("unlimited", "secret");
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    license.copy(u32::MAX).await.unwrap();
    assert_eq!(license.rights_left(Right::Copy).await.unwrap(), None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote status
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_revocation_overrides_cached_active_status() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("scenario-b", "secret");
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert!(license.effective_state().is_usable());
    assert!(license.decryptor(MemoryContainer::new()).is_ok());

    h.server.set_status(
        StatusFixture::for_license(&fixture, Status::Revoked)
            .with_status_updated(date(2024, 5, 1))
            .with_event("register", "device-1")
            .with_event("register", "device-2")
            .document(),
    );
    let state = license.refresh().await.unwrap();
    assert_eq!(
        state,
        EffectiveState::Revoked {
            date: Some(date(2024, 5, 1)),
            devices: 2
        }
    );
    assert!(matches!(
        license.decryptor(MemoryContainer::new()),
        Err(LcpError::NotUsable(EffectiveState::Revoked { .. }))
    ));
    assert!(matches!(
        license.copy(1).await,
        Err(LcpError::State(StateError::ActionNotAllowedInCurrentStatus { .. }))
    ));
}

#[tokio::test]
async fn test_revoked_license_opens_without_prompting() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("revoked", "secret");
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());
    let auth = StaticAuthenticator::answering("secret");
    h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();

    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Revoked).document());
    let auth = StaticAuthenticator::cancelling();
    let license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();

    assert!(matches!(license.effective_state(), EffectiveState::Revoked { .. }));
    assert!(auth.reasons().is_empty());
    assert_eq!(h.server.calls(Operation::Register), 1);

    // The revocation is remembered offline.
    h.server.set_offline(true);
    let license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert!(license.is_offline());
    assert!(matches!(license.effective_state(), EffectiveState::Revoked { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_past_end_is_expired_regardless_of_active_status() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("expired", "secret").with_end(date(2024, 3, 1));

    for status in [Status::Ready, Status::Active] {
        h.server
            .set_status(StatusFixture::for_license(&fixture, status).document());
        let license = h.service.open_license(fixture.to_bytes(), None).await.unwrap();
        assert_eq!(
            license.effective_state(),
            EffectiveState::Expired {
                end: Some(date(2024, 3, 1))
            }
        );
    }

    h.server.set_offline(true);
    let license = h.service.open_license(fixture.to_bytes(), None).await.unwrap();
    assert_eq!(license.record().status, Some(Status::Active));
    assert!(matches!(license.effective_state(), EffectiveState::Expired { .. }));
}

#[tokio::test]
async fn test_license_expires_while_open() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("loan", "secret").with_end(date(2024, 7, 1));
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let mut license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert!(license.decryptor(MemoryContainer::new()).is_ok());

    h.clock.advance(Duration::days(45));
    assert!(matches!(license.effective_state(), EffectiveState::Expired { .. }));
    assert!(license.decryptor(MemoryContainer::new()).is_err());
    assert!(matches!(license.copy(1).await, Err(LcpError::State(_))));
}

#[tokio::test]
async fn test_license_not_started_yet() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("future", "secret").with_start(date(2024, 9, 1));
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Ready).document());

    let auth = StaticAuthenticator::cancelling();
    let license = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert_eq!(
        license.effective_state(),
        EffectiveState::NotStarted {
            start: date(2024, 9, 1)
        }
    );
    assert!(auth.reasons().is_empty());

    h.clock.set(date(2024, 9, 2));
    assert!(license.effective_state().is_usable());
}

// ─────────────────────────────────────────────────────────────────────────────
// Passphrases
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stored_candidates_are_tried_in_order() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("scenario-c", "right").with_user("user-1");
    let wrong = PassphraseHash::from_passphrase("wrong");
    let right = PassphraseHash::from_passphrase("right");
    h.store.store("other-license", Some("user-1"), &wrong).await.unwrap();
    h.store.store("other-license", Some("user-1"), &right).await.unwrap();

    let auth = StaticAuthenticator::cancelling();
    let key = resolve_content_key(&fixture.document(), h.store.as_ref(), Some(&auth), 3)
        .await
        .unwrap();
    assert_eq!(key.as_bytes(), &fixture.content_key);
    assert!(auth.reasons().is_empty());

    let candidates = h
        .store
        .possible_passphrases("scenario-c", Some("user-1"))
        .await
        .unwrap();
    assert_eq!(candidates, vec![wrong, right]);
}

#[tokio::test]
async fn test_entered_passphrase_is_remembered() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("prompted", "right");
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::new([Some("wrong"), Some("right")]);
    h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert_eq!(
        auth.reasons(),
        vec![
            AuthenticationReason::PassphraseNotFound,
            AuthenticationReason::InvalidPassphrase
        ]
    );
    assert_eq!(
        h.store.possible_passphrases("prompted", None).await.unwrap(),
        vec![fixture.passphrase_hash()]
    );

    // No prompt the second time.
    let auth = StaticAuthenticator::cancelling();
    h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap();
    assert!(auth.reasons().is_empty());
}

#[tokio::test]
async fn test_passphrase_failures() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("locked", "right");
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let err = h.service.open_license(fixture.to_bytes(), None).await.unwrap_err();
    assert!(matches!(err, LcpError::Crypto(CryptoError::PassphraseNotFound)));

    let auth = StaticAuthenticator::cancelling();
    let err = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap_err();
    assert!(matches!(err, LcpError::Crypto(CryptoError::PassphraseNotFound)));

    let auth = StaticAuthenticator::new([Some("a"), Some("b"), Some("c"), Some("right")]);
    let err = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap_err();
    assert!(matches!(err, LcpError::Crypto(CryptoError::InvalidPassphrase)));
    assert_eq!(auth.reasons().len(), 3);
}

#[tokio::test]
async fn test_unsupported_profile_is_reported() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("production", "secret")
        .with_profile(lcp::core::media::PROFILE_1_0);
    h.server
        .set_status(StatusFixture::for_license(&fixture, Status::Active).document());

    let auth = StaticAuthenticator::answering("secret");
    let err = h.service.open_license(fixture.to_bytes(), Some(&auth)).await.unwrap_err();
    assert!(matches!(err, LcpError::Crypto(CryptoError::UnsupportedProfile(_))));
}
