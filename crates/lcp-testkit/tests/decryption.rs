//! Publication decryption through an opened license.

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use common::Harness;
use lcp::crypto::{Compression, CryptoError, ResourceEncryption};
use lcp::{LcpError, PublicationDecryptor, Status};
use lcp_testkit::generators::{compression, plaintext_and_range};
use lcp_testkit::{LicenseFixture, MemoryContainer, StaticAuthenticator, StatusFixture};

const CHAPTER: &str = "OEBPS/chapter1.xhtml";
const STYLES: &str = "OEBPS/styles.css";
const COVER: &str = "OEBPS/cover.jpg";

fn chapter_text() -> Vec<u8> {
    b"<p>It was a bright cold day in April, and the clocks were striking thirteen.</p>\n"
        .repeat(64)
}

async fn opened(h: &Harness, fixture: &LicenseFixture) -> common::Session {
    h.server
        .set_status(StatusFixture::for_license(fixture, Status::Active).document());
    let auth = StaticAuthenticator::answering(&fixture.passphrase);
    h.service
        .open_license(fixture.to_bytes(), Some(&auth))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_decrypt_whole_resources() {
    let h = Harness::new();
    let fixture = LicenseFixture::new("book", "secret");
    let license = opened(&h, &fixture).await;

    let text = chapter_text();
    let styles = b"body { margin: 0 }".to_vec();
    let container = MemoryContainer::new()
        .with(CHAPTER, fixture.encrypt_resource(&text, Compression::Deflate))
        .with(STYLES, fixture.encrypt_resource(&styles, Compression::None))
        .with(COVER, b"\xff\xd8\xff\xe0 plain jpeg".to_vec());

    let decryptor = license
        .decryptor(container)
        .unwrap()
        .with_resource(CHAPTER, fixture.resource_encryption(&text, Compression::Deflate))
        .with_resource(STYLES, fixture.resource_encryption(&styles, Compression::None));

    assert_eq!(decryptor.decrypt(CHAPTER, None).await.unwrap(), text);
    assert_eq!(decryptor.decrypt(STYLES, None).await.unwrap(), styles);
    assert_eq!(decryptor.length(CHAPTER).await.unwrap(), text.len() as u64);
    assert_eq!(decryptor.length(STYLES).await.unwrap(), styles.len() as u64);

    // Not encrypted, served as stored.
    assert_eq!(
        decryptor.decrypt(COVER, None).await.unwrap(),
        b"\xff\xd8\xff\xe0 plain jpeg".to_vec()
    );
}

#[tokio::test]
async fn test_ranged_read_only_fetches_covering_blocks() {
    let fixture = LicenseFixture::new("ranged", "secret");
    let text = chapter_text();
    let container = MemoryContainer::new().with(CHAPTER, fixture.encrypt_resource(&text, Compression::None));
    let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
        .with_resource(CHAPTER, ResourceEncryption::aes256_cbc());

    let part = decryptor.decrypt(CHAPTER, Some(1000..1100)).await.unwrap();
    assert_eq!(part, text[1000..1100].to_vec());

    let reads = decryptor.container().reads();
    assert!(reads.iter().all(|(_, range)| range.is_some()));
    let largest = reads
        .iter()
        .filter_map(|(_, range)| range.as_ref())
        .map(|range| range.end - range.start)
        .max()
        .unwrap();
    assert!(largest <= 144, "read {largest} bytes for a 100-byte range");
}

#[tokio::test]
async fn test_range_past_end_is_truncated() {
    let fixture = LicenseFixture::new("truncated", "secret");
    let text = b"short resource".to_vec();
    let container = MemoryContainer::new().with(CHAPTER, fixture.encrypt_resource(&text, Compression::None));
    let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
        .with_resource(CHAPTER, ResourceEncryption::aes256_cbc());

    assert_eq!(decryptor.decrypt(CHAPTER, Some(6..500)).await.unwrap(), b"resource".to_vec());
    assert!(decryptor.decrypt(CHAPTER, Some(500..600)).await.unwrap().is_empty());
    assert!(decryptor.decrypt(CHAPTER, Some(4..4)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_ended_range_reads_to_the_end() {
    let fixture = LicenseFixture::new("open-ended", "secret");
    let text = chapter_text();
    let container = MemoryContainer::new().with(CHAPTER, fixture.encrypt_resource(&text, Compression::None));
    let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
        .with_resource(CHAPTER, ResourceEncryption::aes256_cbc());

    let tail = decryptor.decrypt(CHAPTER, Some(1000..u64::MAX)).await.unwrap();
    assert_eq!(tail, text[1000..].to_vec());
    let whole = decryptor.decrypt(CHAPTER, Some(0..u64::MAX)).await.unwrap();
    assert_eq!(whole, text);
}

#[tokio::test]
async fn test_wrong_key_fails_to_decrypt() {
    let fixture = LicenseFixture::new("wrong-key", "secret");
    let other = LicenseFixture::new("other", "secret");
    let container = MemoryContainer::new().with(CHAPTER, other.encrypt_resource(&chapter_text(), Compression::Deflate));
    let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
        .with_resource(CHAPTER, ResourceEncryption::aes256_cbc().with_compression(Compression::Deflate));

    // A wrong key almost always breaks the padding; it never yields the text.
    match decryptor.decrypt(CHAPTER, None).await {
        Err(err) => assert!(matches!(err, LcpError::Crypto(CryptoError::DecryptionFailed(_)))),
        Ok(garbage) => assert_ne!(garbage, chapter_text()),
    }
}

#[tokio::test]
async fn test_unknown_scheme_is_rejected() {
    let fixture = LicenseFixture::new("scheme", "secret");
    let container = MemoryContainer::new().with(CHAPTER, fixture.encrypt_resource(b"data", Compression::None));
    let encryption = ResourceEncryption {
        scheme: Some("http://example.com/drm".into()),
        ..ResourceEncryption::aes256_cbc()
    };
    let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
        .with_resource(CHAPTER, encryption);

    assert!(matches!(
        decryptor.decrypt(CHAPTER, None).await,
        Err(LcpError::Crypto(CryptoError::UnsupportedAlgorithm(_)))
    ));
}

#[tokio::test]
async fn test_missing_resource() {
    let fixture = LicenseFixture::new("missing", "secret");
    let decryptor = PublicationDecryptor::new(MemoryContainer::new(), Arc::new(fixture.key()));
    assert!(matches!(
        decryptor.decrypt(CHAPTER, None).await,
        Err(LcpError::Resource(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ranged_reads_match_full_decryption(
        (text, range) in plaintext_and_range(600),
        compression in compression(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let fixture = LicenseFixture::new("property", "secret");
        let container = MemoryContainer::new().with(CHAPTER, fixture.encrypt_resource(&text, compression));
        let decryptor = PublicationDecryptor::new(container, Arc::new(fixture.key()))
            .with_resource(CHAPTER, fixture.resource_encryption(&text, compression));

        let (full, part) = runtime.block_on(async {
            (
                decryptor.decrypt(CHAPTER, None).await.unwrap(),
                decryptor.decrypt(CHAPTER, Some(range.clone())).await.unwrap(),
            )
        });

        prop_assert_eq!(full.to_vec(), text.clone());
        let end = (range.end as usize).min(text.len());
        let start = (range.start as usize).min(end);
        prop_assert_eq!(part.to_vec(), text[start..end].to_vec());
    }
}
