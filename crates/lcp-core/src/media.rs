//! Media types and identifiers used by LCP documents.

/// License Document media type.
pub const LCP_LICENSE_DOCUMENT: &str = "application/vnd.readium.lcp.license.v1.0+json";

/// Status Document media type.
pub const LCP_STATUS_DOCUMENT: &str = "application/vnd.readium.license.status.v1.0+json";

pub const HTML: &str = "text/html";
pub const XHTML: &str = "application/xhtml+xml";

/// Encryption scheme declared by resources protected with LCP.
pub const LCP_SCHEME: &str = "http://readium.org/2014/01/lcp";

/// The only profile with a public user-key transform.
pub const BASIC_PROFILE: &str = "http://readium.org/lcp/basic-profile";

/// Production profile. The user-key transform is not public.
pub const PROFILE_1_0: &str = "http://readium.org/lcp/profile-1.0";

pub const AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";
pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Returns true when `media_type` designates an HTML or XHTML page, ignoring
/// parameters such as `charset`.
pub fn is_html(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == HTML || essence == XHTML
}

/// Compares two media types by essence, ignoring case and parameters.
pub fn matches(a: &str, b: &str) -> bool {
    let essence = |m: &str| {
        m.split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    };
    essence(a) == essence(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html(LCP_STATUS_DOCUMENT));
    }

    #[test]
    fn test_matches_ignores_parameters() {
        assert!(matches(
            "application/vnd.readium.license.status.v1.0+json; charset=utf-8",
            LCP_STATUS_DOCUMENT
        ));
        assert!(!matches(HTML, XHTML));
    }
}
