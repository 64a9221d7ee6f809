//! Typed links and URI template expansion.
//!
//! Both documents carry a list of links keyed by relation. Relations are
//! parsed into closed enums when the document is built, so lookups never
//! compare strings at runtime.

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::{ParseError, Result};
use crate::media;

/// A relation kind that can appear in a link's `rel` member.
pub trait Relation: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Map a relation string to a known relation.
    fn from_rel(rel: &str) -> Option<Self>;

    /// The relation string as it appears in documents.
    fn as_str(self) -> &'static str;
}

/// Relations found in a License Document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LicenseRel {
    Hint,
    Publication,
    SelfLink,
    Support,
    Status,
}

impl Relation for LicenseRel {
    fn from_rel(rel: &str) -> Option<Self> {
        match rel {
            "hint" => Some(Self::Hint),
            "publication" => Some(Self::Publication),
            "self" => Some(Self::SelfLink),
            "support" => Some(Self::Support),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::Publication => "publication",
            Self::SelfLink => "self",
            Self::Support => "support",
            Self::Status => "status",
        }
    }
}

/// Relations found in a Status Document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusRel {
    Register,
    License,
    Return,
    Renew,
}

impl Relation for StatusRel {
    fn from_rel(rel: &str) -> Option<Self> {
        match rel {
            "register" => Some(Self::Register),
            "license" => Some(Self::License),
            "return" => Some(Self::Return),
            "renew" => Some(Self::Renew),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::License => "license",
            Self::Return => "return",
            Self::Renew => "renew",
        }
    }
}

/// Wire form of a link, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RawLink {
    href: Option<String>,
    rel: Option<OneOrMany>,
    #[serde(rename = "type")]
    media_type: Option<String>,
    templated: Option<bool>,
    title: Option<String>,
    profile: Option<String>,
    length: Option<u64>,
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// A validated link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link<R> {
    rels: Vec<R>,
    href: String,
    media_type: Option<String>,
    templated: bool,
    title: Option<String>,
    profile: Option<String>,
    length: Option<u64>,
    hash: Option<String>,
}

impl<R: Relation> Link<R> {
    pub fn rels(&self) -> &[R] {
        &self.rels
    }

    pub fn has_rel(&self, rel: R) -> bool {
        self.rels.contains(&rel)
    }

    /// The href as declared, possibly a URI template.
    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn is_templated(&self) -> bool {
        self.templated
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Expected length in bytes of the linked resource.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Expected hash of the linked resource.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Returns true when the link points to an HTML page rather than an API.
    pub fn is_html(&self) -> bool {
        self.media_type.as_deref().is_some_and(media::is_html)
    }

    /// Names of the variables declared by the href template.
    pub fn template_variables(&self) -> Vec<&str> {
        if !self.templated {
            return Vec::new();
        }
        template_expressions(&self.href)
            .flat_map(|expr| {
                expr.trim_start_matches(['?', '&'])
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
            })
            .collect()
    }

    /// Resolve the link to a URL, expanding the template with `params`.
    ///
    /// Variables missing from `params` are left out of the expansion.
    /// Non-templated links ignore `params`.
    pub fn url(&self, params: &[(&str, &str)]) -> Result<Url> {
        let href = if self.templated {
            expand_template(&self.href, params)
        } else {
            self.href.clone()
        };
        Url::parse(&href).map_err(|_| ParseError::InvalidUrl {
            rel: self.rel_label(),
            href,
        })
    }

    fn rel_label(&self) -> String {
        self.rels
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An ordered collection of links. Lookups return the first match in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links<R> {
    links: Vec<Link<R>>,
}

impl<R: Relation> Links<R> {
    pub(crate) fn from_raw(raw: Vec<RawLink>) -> Result<Self> {
        let mut links = Vec::with_capacity(raw.len());

        for link in raw {
            let href = link.href.ok_or(ParseError::MissingField("links.href"))?;
            let rel_strings = match link.rel.ok_or(ParseError::MissingField("links.rel"))? {
                OneOrMany::One(rel) => vec![rel],
                OneOrMany::Many(rels) => rels,
            };

            let rels: Vec<R> = rel_strings.iter().filter_map(|r| R::from_rel(r)).collect();
            if rels.is_empty() {
                tracing::debug!(href = %href, rels = ?rel_strings, "skipping link with unknown relation");
                continue;
            }

            links.push(Link {
                rels,
                href,
                media_type: link.media_type,
                templated: link.templated.unwrap_or(false),
                title: link.title,
                profile: link.profile,
                length: link.length,
                hash: link.hash,
            });
        }

        Ok(Self { links })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link<R>> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// All links carrying `rel`, in declaration order.
    pub fn all_with_rel(&self, rel: R) -> impl Iterator<Item = &Link<R>> {
        self.links.iter().filter(move |l| l.has_rel(rel))
    }

    /// First link with `rel`, restricted to `media_type` when one is given.
    pub fn first_with_rel(&self, rel: R, media_type: Option<&str>) -> Option<&Link<R>> {
        self.all_with_rel(rel).find(|l| match media_type {
            Some(expected) => l
                .media_type
                .as_deref()
                .is_some_and(|actual| media::matches(actual, expected)),
            None => true,
        })
    }

    /// First link with `rel` that declares no media type.
    pub fn first_with_rel_no_type(&self, rel: R) -> Option<&Link<R>> {
        self.all_with_rel(rel).find(|l| l.media_type.is_none())
    }

    /// First link with `rel` and `preferred_type`, falling back to the first
    /// untyped link with `rel`.
    pub fn preferred(&self, rel: R, preferred_type: Option<&str>) -> Option<&Link<R>> {
        self.first_with_rel(rel, preferred_type)
            .or_else(|| self.first_with_rel_no_type(rel))
    }

    pub(crate) fn require(&self, rel: R) -> Result<&Link<R>> {
        self.first_with_rel(rel, None)
            .ok_or(ParseError::MissingLink(rel.as_str()))
    }
}

/// Iterate over the contents of `{...}` expressions in a template.
fn template_expressions(template: &str) -> impl Iterator<Item = &str> {
    template.split('{').skip(1).filter_map(|s| s.split_once('}')).map(|(expr, _)| expr)
}

/// Expand a level-1 URI template, plus the form-style query operators
/// `{?a,b}` and `{&a,b}`.
pub fn expand_template(template: &str, params: &[(&str, &str)]) -> String {
    let lookup = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let expr = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let (operator, names) = match expr.chars().next() {
            Some(op @ ('?' | '&')) => (Some(op), &expr[1..]),
            _ => (None, expr),
        };

        let values: Vec<(&str, &str)> = names
            .split(',')
            .map(str::trim)
            .filter_map(|name| lookup(name).map(|value| (name, value)))
            .collect();

        match operator {
            Some(op) => {
                for (i, (name, value)) in values.iter().enumerate() {
                    out.push(if i == 0 { op } else { '&' });
                    out.push_str(name);
                    out.push('=');
                    out.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
                }
            }
            None => {
                let joined: Vec<String> = values
                    .iter()
                    .map(|(_, value)| url::form_urlencoded::byte_serialize(value.as_bytes()).collect())
                    .collect();
                out.push_str(&joined.join(","));
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(json: &str) -> Links<StatusRel> {
        let raw: Vec<RawLink> = serde_json::from_str(json).unwrap();
        Links::from_raw(raw).unwrap()
    }

    #[test]
    fn test_expand_query_template() {
        let url = expand_template(
            "https://lsd.example.com/licenses/1/register{?id,name}",
            &[("id", "device-1"), ("name", "My Reader")],
        );
        assert_eq!(
            url,
            "https://lsd.example.com/licenses/1/register?id=device-1&name=My+Reader"
        );
    }

    #[test]
    fn test_expand_omits_missing_variables() {
        let url = expand_template(
            "https://lsd.example.com/renew{?end,id,name}",
            &[("id", "d"), ("name", "n")],
        );
        assert_eq!(url, "https://lsd.example.com/renew?id=d&name=n");

        let url = expand_template("https://lsd.example.com/renew{?end}", &[]);
        assert_eq!(url, "https://lsd.example.com/renew");
    }

    #[test]
    fn test_expand_simple_variable() {
        let url = expand_template("https://example.com/{id}/status", &[("id", "a b")]);
        assert_eq!(url, "https://example.com/a+b/status");
    }

    #[test]
    fn test_first_match_uses_declaration_order() {
        let links = links(
            r#"[
                {"rel": "renew", "href": "https://example.com/renew.html", "type": "text/html"},
                {"rel": "renew", "href": "https://example.com/renew", "type": "application/vnd.readium.license.status.v1.0+json"},
                {"rel": "renew", "href": "https://example.com/renew-untyped"}
            ]"#,
        );

        let any = links.first_with_rel(StatusRel::Renew, None).unwrap();
        assert_eq!(any.href(), "https://example.com/renew.html");

        let typed = links
            .first_with_rel(StatusRel::Renew, Some(media::LCP_STATUS_DOCUMENT))
            .unwrap();
        assert_eq!(typed.href(), "https://example.com/renew");

        let untyped = links.first_with_rel_no_type(StatusRel::Renew).unwrap();
        assert_eq!(untyped.href(), "https://example.com/renew-untyped");
    }

    #[test]
    fn test_preferred_falls_back_to_untyped() {
        let links = links(
            r#"[
                {"rel": "license", "href": "https://example.com/license"}
            ]"#,
        );
        let link = links
            .preferred(StatusRel::License, Some(media::LCP_LICENSE_DOCUMENT))
            .unwrap();
        assert_eq!(link.href(), "https://example.com/license");
        assert!(links.preferred(StatusRel::Renew, None).is_none());
    }

    #[test]
    fn test_multiple_relations_and_unknown_relations() {
        let links = links(
            r#"[
                {"rel": ["return", "renew"], "href": "https://example.com/both"},
                {"rel": "cover", "href": "https://example.com/cover.jpg"}
            ]"#,
        );
        assert_eq!(links.len(), 1);
        let link = links.first_with_rel(StatusRel::Renew, None).unwrap();
        assert!(link.has_rel(StatusRel::Return));
    }

    #[test]
    fn test_missing_href_is_rejected() {
        let raw: Vec<RawLink> = serde_json::from_str(r#"[{"rel": "renew"}]"#).unwrap();
        let err = Links::<StatusRel>::from_raw(raw).unwrap_err();
        assert_eq!(err, ParseError::MissingField("links.href"));
    }

    #[test]
    fn test_template_variables() {
        let links = links(
            r#"[{"rel": "renew", "href": "https://example.com/renew{?end,id,name}", "templated": true}]"#,
        );
        let link = links.first_with_rel(StatusRel::Renew, None).unwrap();
        assert_eq!(link.template_variables(), vec!["end", "id", "name"]);
        let url = link.url(&[("id", "x")]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/renew?id=x");
    }

    #[test]
    fn test_invalid_url() {
        let links = links(r#"[{"rel": "license", "href": "not a url"}]"#);
        let link = links.first_with_rel(StatusRel::License, None).unwrap();
        assert!(matches!(link.url(&[]), Err(ParseError::InvalidUrl { .. })));
    }
}
