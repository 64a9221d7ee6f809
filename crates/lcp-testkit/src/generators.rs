//! Proptest generators for property-based testing.

use std::ops::Range;

use proptest::prelude::*;
use serde_json::Value;

use lcp_core::Status;
use lcp_crypto::Compression;

use crate::fixtures::LicenseFixture;

/// Generate a remote license status.
pub fn status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Ready),
        Just(Status::Active),
        Just(Status::Revoked),
        Just(Status::Returned),
        Just(Status::Cancelled),
        Just(Status::Expired),
    ]
}

/// Generate a resource compression method.
pub fn compression() -> impl Strategy<Value = Compression> {
    prop_oneof![Just(Compression::None), Just(Compression::Deflate)]
}

/// Generate resource plaintext of at most `max_len` bytes.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate plaintext together with a byte range that may run past its end.
pub fn plaintext_and_range(max_len: usize) -> impl Strategy<Value = (Vec<u8>, Range<u64>)> {
    plaintext(max_len).prop_flat_map(|data| {
        let len = data.len() as u64;
        (0..=len + 20, 0..=len + 40).prop_map(move |(start, span)| {
            (data.clone(), start..start + span)
        })
    })
}

/// Generate a printable passphrase.
pub fn passphrase() -> impl Strategy<Value = String> {
    "[ -~]{0,32}"
}

/// Top-level fields a License Document cannot do without.
pub const REQUIRED_LICENSE_FIELDS: &[&str] =
    &["id", "issued", "provider", "encryption", "links", "signature"];

/// Generate a license JSON with one required field removed, paired with
/// the name of that field.
pub fn license_missing_field() -> impl Strategy<Value = (&'static str, Value)> {
    prop::sample::select(REQUIRED_LICENSE_FIELDS).prop_map(|field| {
        let mut json = LicenseFixture::new("generated", "secret").to_json();
        if let Some(object) = json.as_object_mut() {
            object.remove(field);
        }
        (field, json)
    })
}

/// Link relations a License Document cannot do without.
pub const REQUIRED_LICENSE_LINKS: &[&str] = &["hint", "publication"];

/// Generate a license JSON without one of the required links.
pub fn license_missing_link() -> impl Strategy<Value = (&'static str, Value)> {
    prop::sample::select(REQUIRED_LICENSE_LINKS).prop_map(|rel| {
        let mut json = LicenseFixture::new("generated", "secret").to_json();
        if let Some(links) = json.get_mut("links").and_then(Value::as_array_mut) {
            links.retain(|link| link.get("rel").and_then(Value::as_str) != Some(rel));
        }
        (rel, json)
    })
}
