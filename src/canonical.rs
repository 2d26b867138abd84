//! Pure canonicalization rules for SigV4.
//!
//! Everything in here is a function of its inputs, no state and no I/O. The
//! rules are order- and encoding-sensitive: compatibility with S3-protocol
//! object stores depends on reproducing them bit-exact.

use crate::constants::{ALGORITHM, AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET};
use crate::hash::hex_sha256;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::collections::HashSet;

/// Re-encode the RFC 3986 reserved characters that standard percent-encoding
/// leaves unescaped: `!`, `'`, `(`, `)` and `*`.
pub fn encode_rfc3986(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '!' => out.push_str("%21"),
            '\'' => out.push_str("%27"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '*' => out.push_str("%2A"),
            _ => out.push(ch),
        }
    }
    out
}

/// Canonical URI encoding of a request path.
///
/// For `s3` the path is percent-decoded first (with `+` read as a literal
/// space) and then re-encoded once; for every other service duplicate slashes
/// are collapsed and the already-encoded path is encoded again, restoring
/// `%2F` to `/`. `single_encode` skips the re-encoding pass in both cases.
pub fn encode_path(service: &str, path: &str, single_encode: bool) -> String {
    let mut encoded = if service == "s3" {
        let plused = path.replace('+', " ");
        match percent_decode_str(&plused).decode_utf8() {
            Ok(v) => v.into_owned(),
            Err(_) => path.to_string(),
        }
    } else {
        collapse_slashes(path)
    };

    if !single_encode {
        encoded = utf8_percent_encode(&encoded, &AWS_URI_ENCODE_SET).to_string();
    }

    encode_rfc3986(&encoded)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !last_was_slash {
                out.push('/');
            }
            last_was_slash = true;
        } else {
            out.push(ch);
            last_was_slash = false;
        }
    }
    out
}

/// Canonical query string.
///
/// Pairs with empty keys are dropped; for `s3` only the first occurrence of a
/// repeated key is kept; keys and values are strict-encoded independently,
/// then pairs are sorted by encoded key and value and joined with `&`.
pub fn encode_query(service: &str, pairs: &[(String, String)]) -> String {
    let mut seen = HashSet::new();
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| {
            if k.is_empty() {
                return false;
            }
            if service == "s3" {
                // First value only for S3.
                return seen.insert(k.clone());
            }
            true
        })
        .map(|(k, v)| {
            (
                encode_rfc3986(&utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string()),
                encode_rfc3986(&utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string()),
            )
        })
        .collect();

    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Assemble the canonical request string.
///
/// `canonical_headers` is the newline-joined `name:value` list and
/// `signed_headers` the semicolon-joined name list, both already sorted.
pub fn canonical_request(
    method: &str,
    encoded_path: &str,
    encoded_query: &str,
    canonical_headers: &str,
    signed_headers: &str,
    body_hash: &str,
) -> String {
    [
        method.to_uppercase().as_str(),
        encoded_path,
        encoded_query,
        &format!("{canonical_headers}\n"),
        signed_headers,
        body_hash,
    ]
    .join("\n")
}

/// Assemble the string-to-sign from a canonical request.
pub fn string_to_sign(datetime: &str, scope: &str, creq: &str) -> String {
    [ALGORITHM, datetime, scope, &hex_sha256(creq.as_bytes())].join("\n")
}
