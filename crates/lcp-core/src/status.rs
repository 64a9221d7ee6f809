//! The Status Document.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ParseError, Result};
use crate::license::parse_date;
use crate::link::{Links, RawLink, Relation, StatusRel};

/// License status as reported by the License Status Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ready,
    Active,
    Revoked,
    Returned,
    Cancelled,
    Expired,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Revoked, returned and cancelled licenses never become usable again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revoked | Self::Returned | Self::Cancelled)
    }

    /// Ready and active licenses may be read, renewed and returned.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Ready | Self::Active)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ready" => Ok(Self::Ready),
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "returned" => Ok(Self::Returned),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(ParseError::InvalidField {
                field: "status",
                reason: format!("unknown status `{other}`"),
            }),
        }
    }
}

/// Kind of a status-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Register,
    Renew,
    Return,
    Revoke,
    Cancel,
}

impl EventKind {
    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "register" => Some(Self::Register),
            "renew" => Some(Self::Renew),
            "return" => Some(Self::Return),
            "revoke" => Some(Self::Revoke),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// A status-change event recorded by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Name of the device that triggered the event.
    pub name: Option<String>,
    /// Identifier of the device that triggered the event.
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Rights the license could be extended to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PotentialRights {
    pub end: Option<DateTime<Utc>>,
}

/// A validated Status Document.
#[derive(Debug, Clone)]
pub struct StatusDocument {
    id: String,
    status: Status,
    message: String,
    license_updated: DateTime<Utc>,
    status_updated: DateTime<Utc>,
    links: Links<StatusRel>,
    events: Vec<Event>,
    potential_rights: Option<PotentialRights>,
    raw: Bytes,
}

impl StatusDocument {
    /// Parse and validate a Status Document.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let raw: Bytes = data.into();
        let doc: RawStatus =
            serde_json::from_slice(&raw).map_err(|e| ParseError::MalformedJson(e.to_string()))?;

        let id = doc.id.ok_or(ParseError::MissingField("id"))?;
        let status: Status = doc.status.ok_or(ParseError::MissingField("status"))?.parse()?;
        let message = doc.message.ok_or(ParseError::MissingField("message"))?;

        let updated = doc.updated.ok_or(ParseError::MissingField("updated"))?;
        let license_updated = parse_date(
            "updated.license",
            updated
                .license
                .ok_or(ParseError::MissingField("updated.license"))?,
        )?;
        let status_updated = parse_date(
            "updated.status",
            updated
                .status
                .ok_or(ParseError::MissingField("updated.status"))?,
        )?;

        let links = Links::from_raw(doc.links.ok_or(ParseError::MissingField("links"))?)?;

        let mut events = Vec::new();
        for event in doc.events.unwrap_or_default() {
            let kind_str = event.kind.ok_or(ParseError::MissingField("events.type"))?;
            let Some(kind) = EventKind::from_type(&kind_str) else {
                tracing::debug!(kind = %kind_str, "skipping status event of unknown type");
                continue;
            };
            events.push(Event {
                kind,
                name: event.name,
                device_id: event.id,
                timestamp: event
                    .timestamp
                    .map(|t| parse_date("events.timestamp", t))
                    .transpose()?,
            });
        }

        let potential_rights = doc
            .potential_rights
            .map(|p| -> Result<PotentialRights> {
                Ok(PotentialRights {
                    end: p.end.map(|e| parse_date("potential_rights.end", e)).transpose()?,
                })
            })
            .transpose()?;

        Ok(Self {
            id,
            status,
            message,
            license_updated,
            status_updated,
            links,
            events,
            potential_rights,
            raw,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// When the license document was last updated on the server.
    pub fn license_updated(&self) -> DateTime<Utc> {
        self.license_updated
    }

    /// When the status last changed.
    pub fn status_updated(&self) -> DateTime<Utc> {
        self.status_updated
    }

    pub fn links(&self) -> &Links<StatusRel> {
        &self.links
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of `kind`, in server order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn potential_rights(&self) -> Option<&PotentialRights> {
        self.potential_rights.as_ref()
    }

    /// Latest end date the license may be renewed to.
    pub fn max_renew_date(&self) -> Option<DateTime<Utc>> {
        self.potential_rights.as_ref().and_then(|p| p.end)
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Whether a link with `rel` is offered.
    pub fn has_link(&self, rel: StatusRel) -> bool {
        self.links.first_with_rel(rel, None).is_some()
    }

    /// Resolve the URL of the link with `rel`, preferring links declaring
    /// `preferred_type` and falling back to untyped ones.
    pub fn url(
        &self,
        rel: StatusRel,
        preferred_type: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<Url> {
        self.links
            .preferred(rel, preferred_type)
            .ok_or(ParseError::MissingLink(rel.as_str()))?
            .url(params)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawStatus {
    id: Option<String>,
    status: Option<String>,
    message: Option<String>,
    updated: Option<RawUpdated>,
    links: Option<Vec<RawLink>>,
    events: Option<Vec<RawEvent>>,
    potential_rights: Option<RawPotentialRights>,
}

#[derive(Deserialize)]
struct RawUpdated {
    license: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    id: Option<String>,
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct RawPotentialRights {
    end: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample() -> Value {
        json!({
            "id": "status-1",
            "status": "active",
            "message": "Your license is active",
            "updated": {
                "license": "2023-02-01T10:00:00Z",
                "status": "2023-02-02T10:00:00Z"
            },
            "links": [
                {"rel": "license", "href": "https://lsd.example.com/licenses/1", "type": "application/vnd.readium.lcp.license.v1.0+json"},
                {"rel": "register", "href": "https://lsd.example.com/licenses/1/register{?id,name}", "templated": true},
                {"rel": "return", "href": "https://lsd.example.com/licenses/1/return{?id,name}", "templated": true},
                {"rel": "renew", "href": "https://lsd.example.com/licenses/1/renew{?end,id,name}", "templated": true}
            ],
            "potential_rights": {"end": "2031-01-01T00:00:00Z"},
            "events": [
                {"type": "register", "name": "Reader A", "id": "device-a", "timestamp": "2023-01-02T10:00:00Z"},
                {"type": "renew", "name": "Reader A", "id": "device-a", "timestamp": "2023-01-03T10:00:00Z"},
                {"type": "register", "name": "Reader B", "id": "device-b", "timestamp": "2023-01-04T10:00:00Z"},
                {"type": "checkout", "name": "ignored"}
            ]
        })
    }

    fn parse(value: &Value) -> Result<StatusDocument> {
        StatusDocument::parse(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_parse_valid_status() {
        let status = parse(&sample()).unwrap();
        assert_eq!(status.id(), "status-1");
        assert_eq!(status.status(), Status::Active);
        assert_eq!(status.message(), "Your license is active");
        assert!(status.status_updated() > status.license_updated());
        assert_eq!(status.events().len(), 3);
        assert_eq!(status.events_of(EventKind::Register).count(), 2);
        assert!(status.max_renew_date().is_some());
        assert!(status.has_link(StatusRel::Renew));
    }

    #[test]
    fn test_register_url_expands_device_params() {
        let status = parse(&sample()).unwrap();
        let url = status
            .url(StatusRel::Register, None, &[("id", "dev"), ("name", "Reader")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://lsd.example.com/licenses/1/register?id=dev&name=Reader"
        );
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut doc = sample();
        doc["status"] = json!("suspended");
        assert!(matches!(
            parse(&doc).unwrap_err(),
            ParseError::InvalidField { field: "status", .. }
        ));
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["id", "status", "message", "updated", "links"] {
            let mut doc = sample();
            doc.as_object_mut().unwrap().remove(field);
            assert_eq!(parse(&doc).unwrap_err(), ParseError::MissingField(field));
        }

        let mut doc = sample();
        doc["updated"].as_object_mut().unwrap().remove("status");
        assert_eq!(
            parse(&doc).unwrap_err(),
            ParseError::MissingField("updated.status")
        );
    }

    #[test]
    fn test_optional_sections() {
        let mut doc = sample();
        let obj = doc.as_object_mut().unwrap();
        obj.remove("events");
        obj.remove("potential_rights");
        let status = parse(&doc).unwrap();
        assert!(status.events().is_empty());
        assert!(status.max_renew_date().is_none());
    }

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in [
            Status::Ready,
            Status::Active,
            Status::Revoked,
            Status::Returned,
            Status::Cancelled,
            Status::Expired,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!(Status::Revoked.is_terminal());
        assert!(!Status::Expired.is_terminal());
        assert!(Status::Ready.is_open());
    }
}
