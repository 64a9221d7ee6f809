//! Test fixtures and helpers.
//!
//! Builders for real License and Status documents: a [`LicenseFixture`]
//! encrypts a random content key under a passphrase, so the documents it
//! produces unlock and decrypt exactly like provider-issued ones.

use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rand::RngCore;
use serde_json::{json, Value};

use lcp_core::media::{
    AES256_CBC, BASIC_PROFILE, HTML, LCP_LICENSE_DOCUMENT, LCP_STATUS_DOCUMENT, SHA256,
};
use lcp_core::{LicenseDocument, Status, StatusDocument};
use lcp_crypto::cipher::{self, BLOCK_SIZE, KEY_SIZE};
use lcp_crypto::{Compression, ContentKey, PassphraseHash, ResourceEncryption};

/// Provider of every fixture license.
pub const PROVIDER: &str = "https://provider.example.com";

/// Default status server of fixture documents.
pub const LSD_BASE: &str = "https://lsd.example.com";

/// Midnight UTC on the given day.
pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Builds an encrypted License Document.
#[derive(Debug, Clone)]
pub struct LicenseFixture {
    pub id: String,
    pub passphrase: String,
    pub content_key: [u8; KEY_SIZE],
    pub profile: String,
    pub user_id: Option<String>,
    pub issued: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub copy: Option<u32>,
    pub print: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Status server base URL. `None` leaves out the `status` link.
    pub lsd_base: Option<String>,
}

impl LicenseFixture {
    /// A license protected by `passphrase`, with a random content key.
    pub fn new(id: &str, passphrase: &str) -> Self {
        Self {
            id: id.to_string(),
            passphrase: passphrase.to_string(),
            content_key: random_bytes(),
            profile: BASIC_PROFILE.to_string(),
            user_id: None,
            issued: date(2024, 1, 1),
            updated: None,
            copy: None,
            print: None,
            start: None,
            end: None,
            lsd_base: Some(LSD_BASE.to_string()),
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Self {
        self.profile = profile.to_string();
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated);
        self
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copy = Some(copies);
        self
    }

    pub fn with_prints(mut self, prints: u32) -> Self {
        self.print = Some(prints);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Point the `status` link at `base`.
    pub fn with_lsd(mut self, base: &str) -> Self {
        self.lsd_base = Some(base.trim_end_matches('/').to_string());
        self
    }

    pub fn without_lsd(mut self) -> Self {
        self.lsd_base = None;
        self
    }

    pub fn passphrase_hash(&self) -> PassphraseHash {
        PassphraseHash::from_passphrase(&self.passphrase)
    }

    pub fn key(&self) -> ContentKey {
        ContentKey::from_bytes(self.content_key)
    }

    /// The License Document as JSON.
    pub fn to_json(&self) -> Value {
        let user_key = self.passphrase_hash();
        let key_check = cipher::encrypt(user_key.as_bytes(), &random_bytes(), self.id.as_bytes());
        let encrypted_key = cipher::encrypt(user_key.as_bytes(), &random_bytes(), &self.content_key);

        let mut links = vec![
            json!({"rel": "hint", "href": format!("{PROVIDER}/hint"), "type": HTML}),
            json!({
                "rel": "publication",
                "href": format!("{PROVIDER}/publications/{}.epub", self.id),
                "type": "application/epub+zip"
            }),
        ];
        if let Some(base) = &self.lsd_base {
            links.push(json!({
                "rel": "status",
                "href": format!("{base}/licenses/{}/status", self.id),
                "type": LCP_STATUS_DOCUMENT
            }));
        }

        let mut rights = serde_json::Map::new();
        if let Some(copy) = self.copy {
            rights.insert("copy".into(), copy.into());
        }
        if let Some(print) = self.print {
            rights.insert("print".into(), print.into());
        }
        if let Some(start) = self.start {
            rights.insert("start".into(), format_date(start).into());
        }
        if let Some(end) = self.end {
            rights.insert("end".into(), format_date(end).into());
        }

        let mut doc = json!({
            "id": self.id,
            "issued": format_date(self.issued),
            "provider": PROVIDER,
            "encryption": {
                "profile": self.profile,
                "content_key": {
                    "algorithm": AES256_CBC,
                    "encrypted_value": BASE64.encode(encrypted_key)
                },
                "user_key": {
                    "algorithm": SHA256,
                    "text_hint": "The title of your favourite book",
                    "key_check": BASE64.encode(key_check)
                }
            },
            "links": links,
            "rights": rights,
            "signature": {
                "algorithm": "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
                "certificate": "MIIB",
                "value": "c2lnbmF0dXJl"
            }
        });
        if let Some(updated) = self.updated {
            doc["updated"] = format_date(updated).into();
        }
        if let Some(user_id) = &self.user_id {
            doc["user"] = json!({"id": user_id});
        }
        doc
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).unwrap_or_default()
    }

    /// The parsed License Document.
    ///
    /// # Panics
    ///
    /// If the fixture does not produce a valid license.
    pub fn document(&self) -> LicenseDocument {
        match LicenseDocument::parse(self.to_bytes()) {
            Ok(license) => license,
            Err(e) => panic!("fixture license does not parse: {e}"),
        }
    }

    /// Encrypt a resource with this license's content key.
    pub fn encrypt_resource(&self, plaintext: &[u8], compression: Compression) -> Vec<u8> {
        let data = match compression {
            Compression::None => plaintext.to_vec(),
            Compression::Deflate => deflate(plaintext),
        };
        let iv: [u8; BLOCK_SIZE] = random_bytes();
        cipher::encrypt(&self.content_key, &iv, &data)
    }

    /// Encryption metadata matching [`LicenseFixture::encrypt_resource`].
    pub fn resource_encryption(&self, plaintext: &[u8], compression: Compression) -> ResourceEncryption {
        let encryption = ResourceEncryption::aes256_cbc().with_compression(compression);
        match compression {
            Compression::None => encryption,
            Compression::Deflate => encryption.with_original_length(plaintext.len() as u64),
        }
    }
}

/// Raw DEFLATE, as stored in EPUB containers.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Builds a Status Document.
#[derive(Debug, Clone)]
pub struct StatusFixture {
    pub license_id: String,
    pub status: Status,
    pub base: String,
    pub license_updated: DateTime<Utc>,
    pub status_updated: DateTime<Utc>,
    pub register: bool,
    pub renew: bool,
    /// Offer renewal only through an HTML page.
    pub renew_html: bool,
    pub return_link: bool,
    pub potential_end: Option<DateTime<Utc>>,
    /// `(type, device id)` pairs.
    pub events: Vec<(String, String)>,
}

impl StatusFixture {
    /// A status for `license_id` offering every interaction.
    pub fn new(license_id: &str, status: Status) -> Self {
        Self {
            license_id: license_id.to_string(),
            status,
            base: LSD_BASE.to_string(),
            license_updated: date(2024, 1, 1),
            status_updated: date(2024, 2, 1),
            register: true,
            renew: true,
            renew_html: false,
            return_link: true,
            potential_end: Some(date(2025, 1, 1)),
            events: Vec::new(),
        }
    }

    /// The status of `license`, with matching license update date.
    pub fn for_license(license: &LicenseFixture, status: Status) -> Self {
        let mut fixture = Self::new(&license.id, status);
        fixture.license_updated = license.updated.unwrap_or(license.issued);
        if let Some(base) = &license.lsd_base {
            fixture.base = base.clone();
        }
        fixture
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_license_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.license_updated = updated;
        self
    }

    pub fn with_status_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.status_updated = updated;
        self
    }

    pub fn without_register(mut self) -> Self {
        self.register = false;
        self
    }

    pub fn without_renew(mut self) -> Self {
        self.renew = false;
        self
    }

    pub fn without_return(mut self) -> Self {
        self.return_link = false;
        self
    }

    pub fn with_html_renew(mut self) -> Self {
        self.renew_html = true;
        self
    }

    pub fn with_potential_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.potential_end = end;
        self
    }

    pub fn with_event(mut self, kind: &str, device_id: &str) -> Self {
        self.events.push((kind.to_string(), device_id.to_string()));
        self
    }

    /// Path of the license on the status server.
    pub fn path(&self, suffix: &str) -> String {
        format!("/licenses/{}{suffix}", self.license_id)
    }

    pub fn to_json(&self) -> Value {
        let url = |suffix: &str| format!("{}{}", self.base, self.path(suffix));

        let mut links = vec![json!({
            "rel": "license",
            "href": url(""),
            "type": LCP_LICENSE_DOCUMENT
        })];
        if self.register {
            links.push(json!({
                "rel": "register",
                "href": url("/register{?id,name}"),
                "type": LCP_STATUS_DOCUMENT,
                "templated": true
            }));
        }
        if self.renew_html {
            links.push(json!({"rel": "renew", "href": url("/renew.html"), "type": HTML}));
        } else if self.renew {
            links.push(json!({
                "rel": "renew",
                "href": url("/renew{?end,id,name}"),
                "type": LCP_STATUS_DOCUMENT,
                "templated": true
            }));
        }
        if self.return_link {
            links.push(json!({
                "rel": "return",
                "href": url("/return{?id,name}"),
                "type": LCP_STATUS_DOCUMENT,
                "templated": true
            }));
        }

        let events: Vec<Value> = self
            .events
            .iter()
            .map(|(kind, device)| {
                json!({
                    "type": kind,
                    "name": format!("Reader {device}"),
                    "id": device,
                    "timestamp": format_date(self.status_updated)
                })
            })
            .collect();

        let mut doc = json!({
            "id": self.license_id,
            "status": self.status.as_str(),
            "message": format!("The license is {}", self.status.as_str()),
            "updated": {
                "license": format_date(self.license_updated),
                "status": format_date(self.status_updated)
            },
            "links": links,
            "events": events
        });
        if let Some(end) = self.potential_end {
            doc["potential_rights"] = json!({"end": format_date(end)});
        }
        doc
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).unwrap_or_default()
    }

    /// The parsed Status Document.
    ///
    /// # Panics
    ///
    /// If the fixture does not produce a valid status document.
    pub fn document(&self) -> StatusDocument {
        match StatusDocument::parse(self.to_bytes()) {
            Ok(status) => status,
            Err(e) => panic!("fixture status does not parse: {e}"),
        }
    }
}
