//! URL helpers for the inspection hot path
//!
//! Host extraction borrows from the URL. Pseudo-protocol and
//! `data:` payloads are decoded the way the browser would hand them to the
//! script engine, so keywords hidden behind percent or base64 encoding are
//! still visible to the inspector.

use base64::Engine as _;
use percent_encoding::percent_decode_str;

const JAVASCRIPT_SCHEME: &str = "javascript:";
const DATA_SCHEME: &str = "data:";

/// Media types the browser executes as classic or module script.
const SCRIPT_MEDIA_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/ecmascript",
    "application/ecmascript",
];

// =============================================================================
// Host Extraction
// =============================================================================

/// Host of a `scheme://` URL, without userinfo or port. Borrows from `url`.
pub fn extract_host(url: &str) -> Option<&str> {
    let colon = url.find(':')?;
    let rest = url[colon..].strip_prefix("://")?;
    let authority = &rest[..rest.find(['/', '?', '#']).unwrap_or(rest.len())];
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    if host.starts_with('[') {
        // IPv6 literal keeps its brackets
        return Some(host.find(']').map_or(host, |end| &host[..=end]));
    }
    Some(host.split(':').next().unwrap_or(host))
}

// =============================================================================
// Pseudo-protocols
// =============================================================================

#[inline]
fn strip_prefix_ignore_ascii_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// Percent-decode, replacing invalid UTF-8 instead of failing.
pub fn percent_decode_lossy(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}

/// Decoded code of a `javascript:` URL, or None for any other scheme.
pub fn javascript_payload(value: &str) -> Option<String> {
    let rest = strip_prefix_ignore_ascii_case(value.trim_start(), JAVASCRIPT_SCHEME)?;
    Some(percent_decode_lossy(rest))
}

// =============================================================================
// Data URIs
// =============================================================================

/// Borrowed view of a `data:` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    /// Media type as written, without parameters
    pub media_type: &'a str,
    /// `;base64` was declared
    pub base64: bool,
    /// Everything after the first comma, still encoded
    pub payload: &'a str,
}

impl DataUri<'_> {
    /// The media type is one the browser would execute as script.
    pub fn is_script(&self) -> bool {
        SCRIPT_MEDIA_TYPES
            .iter()
            .any(|ty| self.media_type.eq_ignore_ascii_case(ty))
    }

    /// Payload as the script engine would see it.
    pub fn decode(&self) -> String {
        let text = percent_decode_lossy(self.payload);
        if !self.base64 {
            return text;
        }
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        match base64::engine::general_purpose::STANDARD.decode(compact.as_bytes()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => text,
        }
    }
}

/// Parse a `data:` URI. A URI without a comma has an empty payload.
pub fn parse_data_uri(uri: &str) -> Option<DataUri<'_>> {
    let rest = strip_prefix_ignore_ascii_case(uri.trim_start(), DATA_SCHEME)?;
    let (header, payload) = match rest.find(',') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    let mut params = header.split(';');
    let media_type = params.next().unwrap_or("").trim();
    let base64 = params.any(|param| param.trim().eq_ignore_ascii_case("base64"));

    Some(DataUri {
        media_type,
        base64,
        payload,
    })
}

// =============================================================================
// Resources
// =============================================================================

/// The URL's path (query and fragment ignored) names a `.js` file.
pub fn is_script_resource(url: &str) -> bool {
    let end = url.find(&['?', '#'][..]).unwrap_or(url.len());
    let path = &url[..end];
    path.len() >= 3
        && path.is_char_boundary(path.len() - 3)
        && path[path.len() - 3..].eq_ignore_ascii_case(".js")
}
