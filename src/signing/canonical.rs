//! Canonical request construction for SigV4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```

use super::HeaderValues;
use percent_encoding::{
    percent_decode_str, percent_encode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC,
};
use sha2::{Digest, Sha256};

/// Everything except the RFC 3986 unreserved characters (`A-Z a-z 0-9 - _ . ~`).
///
/// This is `encodeURIComponent` plus the extra escaping of `! ' ( ) *`.
const RFC3986_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a string with the RFC 3986 unreserved set.
///
/// ```
/// use sigv4_relay::signing::canonical::rfc3986_encode;
///
/// assert_eq!(rfc3986_encode("a b"), "a%20b");
/// assert_eq!(rfc3986_encode("it's(*)!"), "it%27s%28%2A%29%21");
/// assert_eq!(rfc3986_encode("AKID/20130524"), "AKID%2F20130524");
/// ```
pub fn rfc3986_encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986_ENCODE_SET).to_string()
}

/// Build the full canonical request string.
pub fn build_canonical_request(
    method: &str,
    path: &str,
    canonical_query: &str,
    headers: &HeaderValues,
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_headers = build_canonical_headers(headers);
    let signed_headers = build_signed_headers(headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers}\n{payload_hash}"
    )
}

/// Canonical URI: each segment decoded to bytes, then re-encoded. `/` is preserved and
/// an empty path becomes `/`.
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    path.split('/')
        .map(|segment| {
            // Raw bytes, so escapes that are not valid UTF-8 survive
            let decoded: Vec<u8> = percent_decode_str(segment).collect();
            percent_encode(&decoded, RFC3986_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `name:value` lines sorted by name. Values are trimmed and inner whitespace
/// runs collapse to one space.
pub fn build_canonical_headers(headers: &HeaderValues) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}:{}", name, collapse_whitespace(value.trim())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Semicolon-separated, sorted header names.
pub fn build_signed_headers(headers: &HeaderValues) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// Hex SHA-256 of a payload.
///
/// ```
/// use sigv4_relay::signing::canonical::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// True if `value` looks like a literal hex SHA-256 digest.
pub fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
