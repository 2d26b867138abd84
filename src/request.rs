use crate::constants::AWS_QUERY_ENCODE_SET;
use crate::{Error, Result};
use bytes::Bytes;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Uri};
use percent_encoding::utf8_percent_encode;
use std::str::FromStr;

/// A decomposed working copy of an HTTP request, used while signing.
///
/// The caller-owned request is never mutated; the signer builds one of these,
/// edits headers and query pairs freely, and assembles a fresh request at the
/// end. Query values are stored percent-decoded and re-encoded on [`apply`].
///
/// [`apply`]: SigningRequest::apply
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, as it appeared on the original URI.
    pub path: String,
    /// HTTP query parameters, percent-decoded.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing request from the pieces of an [`http::Request`].
    pub fn build(method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<Self> {
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| Error::request_invalid("request without authority cannot be signed"))?;

        let paq = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: method.clone(),
            scheme: uri.scheme().cloned().unwrap_or(Scheme::HTTP),
            authority,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),
            headers: headers.clone(),
        })
    }

    /// Assemble the signed request.
    ///
    /// Query pairs are written back percent-encoded with the strict AWS query
    /// set, so the serialized URI round-trips to the values that were signed.
    pub fn apply(self, body: Bytes) -> Result<http::Request<Bytes>> {
        let paq = if self.query.is_empty() {
            self.path
        } else {
            let mut s = self.path;
            s.push('?');
            for (i, (k, v)) in self.query.iter().enumerate() {
                if i > 0 {
                    s.push('&');
                }
                s.push_str(&utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string());
                s.push('=');
                s.push_str(&utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string());
            }
            s
        };

        let uri = Uri::builder()
            .scheme(self.scheme)
            .authority(self.authority)
            .path_and_query(PathAndQuery::from_str(&paq)?)
            .build()?;

        let mut req = http::Request::builder()
            .method(self.method)
            .uri(uri)
            .body(body)?;
        *req.headers_mut() = self.headers;

        Ok(req)
    }

    /// The host the request is addressed to, including any port.
    pub fn host(&self) -> &str {
        self.authority.as_str()
    }

    /// The host name without port, used for service/region inference.
    pub fn hostname(&self) -> &str {
        self.authority.host()
    }

    /// Set a query parameter, replacing any existing pairs with the same key.
    pub fn query_set(&mut self, key: &str, value: impl Into<String>) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.into()));
    }

    /// Get the first query value for a key.
    pub fn query_get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get a header value as a string, or `""` when absent.
    pub fn header_get_or_default(&self, key: &str) -> Result<&str> {
        match self.headers.get(key) {
            Some(v) => Ok(v.to_str()?),
            None => Ok(""),
        }
    }

    /// The combined value of a header for signing: every occurrence of the
    /// name joined with `", "`, then whitespace-normalized per step 4 of the
    /// canonical request rules.
    pub fn header_value_combined(&self, key: &str) -> String {
        let joined = self
            .headers
            .get_all(key)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        normalize_whitespace(&joined)
    }
}

/// Trim and collapse interior whitespace runs to a single space.
fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_ascii_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn build(uri: &str) -> SigningRequest {
        SigningRequest::build(
            &Method::GET,
            &uri.parse::<Uri>().unwrap(),
            &HeaderMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_decomposes_uri() {
        let req = build("https://s3.us-east-1.amazonaws.com/bucket/key?a=1&b=two%20words");
        assert_eq!(req.host(), "s3.us-east-1.amazonaws.com");
        assert_eq!(req.path, "/bucket/key");
        assert_eq!(
            req.query,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string())
            ]
        );
    }

    #[test]
    fn test_build_without_authority_fails() {
        let uri = Uri::from_static("/only/a/path");
        let res = SigningRequest::build(&Method::GET, &uri, &HeaderMap::new());
        assert!(res.is_err());
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let req = build("https://example.amazonaws.com");
        assert_eq!(req.path, "/");
    }

    #[test]
    fn test_query_set_replaces() {
        let mut req = build("https://example.amazonaws.com/?x=1&x=2");
        req.query_set("x", "3");
        assert_eq!(req.query, vec![("x".to_string(), "3".to_string())]);
    }

    #[test]
    fn test_apply_encodes_query() {
        let mut req = build("https://example.amazonaws.com/path");
        req.query_set("key", "a b/c");
        let out = req.apply(Bytes::new()).unwrap();
        assert_eq!(out.uri().query(), Some("key=a%20b%2Fc"));
    }

    #[test]
    fn test_header_value_combined_normalizes() {
        let mut headers = HeaderMap::new();
        headers.insert("k", HeaderValue::from_static("  a   b\t c  "));
        let req = SigningRequest::build(
            &Method::GET,
            &Uri::from_static("https://example.amazonaws.com/"),
            &headers,
        )
        .unwrap();
        assert_eq!(req.header_value_combined("k"), "a b c");
    }

    #[test]
    fn test_header_value_combined_joins_repeated_names() {
        let mut headers = HeaderMap::new();
        headers.append("k", HeaderValue::from_static("one"));
        headers.append("k", HeaderValue::from_static("  two "));
        let req = SigningRequest::build(
            &Method::GET,
            &Uri::from_static("https://example.amazonaws.com/"),
            &headers,
        )
        .unwrap();
        assert_eq!(req.header_value_combined("k"), "one, two");
        assert_eq!(req.header_value_combined("absent"), "");
    }
}
