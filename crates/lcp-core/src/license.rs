//! The License Document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::error::{ParseError, Result};
use crate::link::{LicenseRel, Link, Links, RawLink, Relation};
use crate::media;

/// Encryption descriptor of a license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encryption {
    /// Encryption profile URI.
    pub profile: String,
    pub content_key: ContentKeyInfo,
    pub user_key: UserKeyInfo,
}

/// The content key, encrypted with the user key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKeyInfo {
    /// Algorithm URI used to encrypt the content key.
    pub algorithm: String,
    /// IV followed by the AES-CBC ciphertext of the content key.
    pub encrypted_value: Vec<u8>,
}

/// How the user key is derived and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKeyInfo {
    /// Hash algorithm URI applied to the passphrase.
    pub algorithm: String,
    /// Hint shown to the user when asking for the passphrase.
    pub text_hint: String,
    /// IV followed by the AES-CBC ciphertext of the license id.
    pub key_check: Vec<u8>,
}

/// Rights granted by the license. Absent counters mean unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rights {
    pub print: Option<u32>,
    pub copy: Option<u32>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Names of the user fields encrypted with the content key.
    pub encrypted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: String,
    pub certificate: String,
    pub value: String,
}

/// A validated License Document.
///
/// The only way to obtain one is [`LicenseDocument::parse`], which checks
/// every structural requirement. Once built, the document is immutable.
#[derive(Debug, Clone)]
pub struct LicenseDocument {
    id: String,
    issued: DateTime<Utc>,
    updated: Option<DateTime<Utc>>,
    provider: String,
    encryption: Encryption,
    links: Links<LicenseRel>,
    publication: Link<LicenseRel>,
    rights: Rights,
    user: User,
    signature: Signature,
    raw: Bytes,
}

impl LicenseDocument {
    /// Parse and validate a License Document.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let raw: Bytes = data.into();
        let doc: RawLicense =
            serde_json::from_slice(&raw).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

        let id = doc.id.ok_or(ParseError::MissingField("id"))?;
        let issued = parse_date("issued", doc.issued.ok_or(ParseError::MissingField("issued"))?)?;
        let updated = doc.updated.map(|d| parse_date("updated", d)).transpose()?;
        let provider = doc.provider.ok_or(ParseError::MissingField("provider"))?;

        let encryption = doc
            .encryption
            .ok_or(ParseError::MissingField("encryption"))?
            .validate()?;

        let links = Links::from_raw(doc.links.ok_or(ParseError::MissingField("links"))?)?;
        links.require(LicenseRel::Hint)?;
        let publication = links.require(LicenseRel::Publication)?.clone();
        publication.url(&[])?;

        let rights = match doc.rights {
            Some(r) => Rights {
                print: r.print,
                copy: r.copy,
                start: r.start.map(|d| parse_date("rights.start", d)).transpose()?,
                end: r.end.map(|d| parse_date("rights.end", d)).transpose()?,
            },
            None => Rights::default(),
        };

        let user = doc
            .user
            .map(|u| User {
                id: u.id,
                email: u.email,
                name: u.name,
                encrypted: u.encrypted.unwrap_or_default(),
            })
            .unwrap_or_default();

        let signature = doc
            .signature
            .ok_or(ParseError::MissingField("signature"))?;
        let signature = Signature {
            algorithm: signature
                .algorithm
                .ok_or(ParseError::MissingField("signature.algorithm"))?,
            certificate: signature
                .certificate
                .ok_or(ParseError::MissingField("signature.certificate"))?,
            value: signature
                .value
                .ok_or(ParseError::MissingField("signature.value"))?,
        };

        Ok(Self {
            id,
            issued,
            updated,
            provider,
            encryption,
            links,
            publication,
            rights,
            user,
            signature,
            raw,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn issued(&self) -> DateTime<Utc> {
        self.issued
    }

    /// Last update of the license, or its issue date when it was never
    /// updated.
    pub fn updated(&self) -> DateTime<Utc> {
        self.updated.unwrap_or(self.issued)
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    pub fn links(&self) -> &Links<LicenseRel> {
        &self.links
    }

    pub fn rights(&self) -> &Rights {
        &self.rights
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The bytes this document was parsed from.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Hint to display when asking the user for the passphrase.
    pub fn text_hint(&self) -> &str {
        &self.encryption.user_key.text_hint
    }

    /// Whether the profile has a user-key transform this crate can apply.
    pub fn is_supported_profile(&self) -> bool {
        self.encryption.profile == media::BASIC_PROFILE
    }

    /// The publication link. Parsing rejects licenses without one.
    pub fn publication_link(&self) -> &Link<LicenseRel> {
        &self.publication
    }

    /// Resolve the URL of the link with `rel`, preferring links declaring
    /// `preferred_type` and falling back to untyped ones.
    pub fn url(
        &self,
        rel: LicenseRel,
        preferred_type: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<Url> {
        self.links
            .preferred(rel, preferred_type)
            .ok_or(ParseError::MissingLink(rel.as_str()))?
            .url(params)
    }
}

pub(crate) fn parse_date(field: &'static str, value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ParseError::InvalidField {
            field,
            reason: format!("`{value}` is not an RFC 3339 date: {e}"),
        })
}

fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>> {
    BASE64.decode(value).map_err(|e| ParseError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawLicense {
    id: Option<String>,
    issued: Option<String>,
    updated: Option<String>,
    provider: Option<String>,
    encryption: Option<RawEncryption>,
    links: Option<Vec<RawLink>>,
    rights: Option<RawRights>,
    user: Option<RawUser>,
    signature: Option<RawSignature>,
}

#[derive(Deserialize)]
struct RawEncryption {
    profile: Option<String>,
    content_key: Option<RawContentKey>,
    user_key: Option<RawUserKey>,
}

impl RawEncryption {
    fn validate(self) -> Result<Encryption> {
        let profile = self
            .profile
            .ok_or(ParseError::MissingField("encryption.profile"))?;

        let content_key = self
            .content_key
            .ok_or(ParseError::MissingField("encryption.content_key"))?;
        let content_key = ContentKeyInfo {
            algorithm: content_key
                .algorithm
                .ok_or(ParseError::MissingField("encryption.content_key.algorithm"))?,
            encrypted_value: decode_base64(
                "encryption.content_key.encrypted_value",
                &content_key
                    .encrypted_value
                    .ok_or(ParseError::MissingField("encryption.content_key.encrypted_value"))?,
            )?,
        };

        let user_key = self
            .user_key
            .ok_or(ParseError::MissingField("encryption.user_key"))?;
        let user_key = UserKeyInfo {
            algorithm: user_key
                .algorithm
                .ok_or(ParseError::MissingField("encryption.user_key.algorithm"))?,
            text_hint: user_key
                .text_hint
                .ok_or(ParseError::MissingField("encryption.user_key.text_hint"))?,
            key_check: decode_base64(
                "encryption.user_key.key_check",
                &user_key
                    .key_check
                    .ok_or(ParseError::MissingField("encryption.user_key.key_check"))?,
            )?,
        };

        Ok(Encryption {
            profile,
            content_key,
            user_key,
        })
    }
}

#[derive(Deserialize)]
struct RawContentKey {
    algorithm: Option<String>,
    encrypted_value: Option<String>,
}

#[derive(Deserialize)]
struct RawUserKey {
    algorithm: Option<String>,
    text_hint: Option<String>,
    key_check: Option<String>,
}

#[derive(Deserialize)]
struct RawRights {
    print: Option<u32>,
    copy: Option<u32>,
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    encrypted: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawSignature {
    algorithm: Option<String>,
    certificate: Option<String>,
    value: Option<String>,
}
