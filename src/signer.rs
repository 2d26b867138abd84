use crate::canonical;
use crate::constants::{
    ALGORITHM, DEFAULT_S3_EXPIRES_SECS, UNSIGNABLE_HEADERS, UNSIGNED_PAYLOAD, X_AMZ_ALGORITHM,
    X_AMZ_CONTENT_SHA_256, X_AMZ_CREDENTIAL, X_AMZ_DATE, X_AMZ_EXPIRES, X_AMZ_SECURITY_TOKEN,
    X_AMZ_SIGNATURE, X_AMZ_SIGNED_HEADERS,
};
use crate::endpoint::guess_service_region;
use crate::hash::{hex_hmac_sha256, hex_sha256};
use crate::keycache::{signing_key, KeyCache};
use crate::time::{format_iso8601, now, DateTime};
use crate::{Credential, Error, Result, SigningRequest};
use bytes::Bytes;
use http::{header, HeaderValue};
use log::debug;
use std::sync::Arc;

/// Per-request signing options.
///
/// Everything is optional; unset service and region are inferred from the
/// host name, and an unset datetime takes the wall clock. Tests should always
/// inject `datetime`.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// AWS service code, e.g. `s3`. Inferred from the host when unset.
    pub service: Option<String>,
    /// AWS region. Inferred from the host when unset, falling back to
    /// `us-east-1`.
    pub region: Option<String>,
    /// Signing time. Defaults to now.
    pub datetime: Option<DateTime>,
    /// Sign via query parameters instead of the `Authorization` header.
    pub sign_query: bool,
    /// Defer the session token until after the signature is computed.
    ///
    /// Forced on for `iotdevicegateway`.
    pub append_session_token: bool,
    /// Sign every header, including the normally unsignable set.
    pub all_headers: bool,
    /// Skip the re-encoding pass on the canonical path.
    pub single_encode: bool,
}

/// A single SigV4 signing operation.
///
/// Construction resolves service/region, stamps `X-Amz-Date` (and the other
/// pre-signature fields) into a working copy of the request, and fixes the
/// canonicalization inputs. The intermediate artifacts are then available as
/// composable steps: [`canonical_request`], [`string_to_sign`], [`signature`],
/// and finally [`into_request`] which attaches either the `Authorization`
/// header or the `X-Amz-Signature` query parameter.
///
/// The caller-owned request is never mutated.
///
/// [`canonical_request`]: V4Signer::canonical_request
/// [`string_to_sign`]: V4Signer::string_to_sign
/// [`signature`]: V4Signer::signature
/// [`into_request`]: V4Signer::into_request
#[derive(Debug)]
pub struct V4Signer {
    req: SigningRequest,
    body: Bytes,
    credential: Credential,
    cache: Arc<dyn KeyCache>,

    service: String,
    region: String,
    datetime: String,
    sign_query: bool,
    append_session_token: bool,

    signed_headers: String,
    canonical_headers: String,
    scope: String,
    encoded_path: String,
    encoded_search: String,
}

impl V4Signer {
    /// Prepare a signing operation for `req`.
    pub fn new(
        req: &http::Request<Bytes>,
        credential: &Credential,
        cache: Arc<dyn KeyCache>,
        opts: &SignOptions,
    ) -> Result<Self> {
        if !credential.is_valid() {
            return Err(Error::config_invalid(
                "access_key_id and secret_access_key are required",
            ));
        }

        let mut signing = SigningRequest::build(req.method(), req.uri(), req.headers())?;

        let (service, region) = resolve_service_region(&signing, opts);
        let datetime = format_iso8601(opts.datetime.unwrap_or_else(now));
        let append_session_token = opts.append_session_token || service == "iotdevicegateway";

        // Host is always taken from the URL, never from a caller-set header.
        signing.headers.remove(header::HOST);

        if service == "s3"
            && !opts.sign_query
            && !signing.headers.contains_key(X_AMZ_CONTENT_SHA_256)
        {
            signing
                .headers
                .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::from_static(UNSIGNED_PAYLOAD));
        }

        // The date (and a non-deferred session token) go wherever the
        // signature will go: query parameters or headers.
        if opts.sign_query {
            signing.query_set(X_AMZ_DATE, datetime.clone());
            if let Some(token) = &credential.session_token {
                if !append_session_token {
                    signing.query_set(X_AMZ_SECURITY_TOKEN, token.clone());
                }
            }
        } else {
            signing
                .headers
                .insert(X_AMZ_DATE, HeaderValue::from_str(&datetime)?);
            if let Some(token) = &credential.session_token {
                if !append_session_token {
                    let mut value = HeaderValue::from_str(token)?;
                    value.set_sensitive(true);
                    signing.headers.insert(X_AMZ_SECURITY_TOKEN, value);
                }
            }
        }

        // `host` is signed from the authority; everything else comes from the
        // working header set, minus the unsignable list.
        let mut signable: Vec<String> = std::iter::once("host".to_string())
            .chain(signing.headers.keys().map(|k| k.as_str().to_string()))
            .filter(|h| opts.all_headers || !UNSIGNABLE_HEADERS.contains(&h.as_str()))
            .collect();
        signable.sort();
        signable.dedup();

        let signed_headers = signable.join(";");

        let canonical_headers = signable
            .iter()
            .map(|h| {
                let value = if h == "host" {
                    signing.host().to_string()
                } else {
                    signing.header_value_combined(h)
                };
                format!("{h}:{value}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let scope = format!("{}/{}/{}/aws4_request", &datetime[..8], region, service);

        if opts.sign_query {
            if service == "s3" && signing.query_get(X_AMZ_EXPIRES).is_none() {
                let expires = signing
                    .header_get_or_default(X_AMZ_EXPIRES)?
                    .to_string();
                let expires = if expires.is_empty() {
                    DEFAULT_S3_EXPIRES_SECS.to_string()
                } else {
                    expires
                };
                signing.query_set(X_AMZ_EXPIRES, expires);
            }
            signing.query_set(X_AMZ_ALGORITHM, ALGORITHM);
            signing.query_set(
                X_AMZ_CREDENTIAL,
                format!("{}/{}", credential.access_key_id, scope),
            );
            signing.query_set(X_AMZ_SIGNED_HEADERS, signed_headers.clone());
        }

        let encoded_path = canonical::encode_path(&service, &signing.path, opts.single_encode);
        let encoded_search = canonical::encode_query(&service, &signing.query);

        Ok(V4Signer {
            req: signing,
            body: req.body().clone(),
            credential: credential.clone(),
            cache,
            service,
            region,
            datetime,
            sign_query: opts.sign_query,
            append_session_token,
            signed_headers,
            canonical_headers,
            scope,
            encoded_path,
            encoded_search,
        })
    }

    /// The resolved service code, possibly inferred from the host.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The resolved region, possibly inferred from the host.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The signing timestamp, `YYYYMMDDTHHMMSSZ`.
    pub fn datetime(&self) -> &str {
        &self.datetime
    }

    /// The credential scope: `date/region/service/aws4_request`.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The semicolon-joined, sorted signed header names.
    pub fn signed_headers(&self) -> &str {
        &self.signed_headers
    }

    /// The hex body hash line of the canonical request.
    fn body_hash(&self) -> Result<String> {
        let from_header = self.req.header_get_or_default(X_AMZ_CONTENT_SHA_256)?;
        if !from_header.is_empty() {
            return Ok(from_header.to_string());
        }
        if self.service == "s3" && self.sign_query {
            return Ok(UNSIGNED_PAYLOAD.to_string());
        }
        Ok(hex_sha256(&self.body))
    }

    /// The canonical request string.
    pub fn canonical_request(&self) -> Result<String> {
        let creq = canonical::canonical_request(
            self.req.method.as_str(),
            &self.encoded_path,
            &self.encoded_search,
            &self.canonical_headers,
            &self.signed_headers,
            &self.body_hash()?,
        );
        debug!("calculated canonical request: {creq}");
        Ok(creq)
    }

    /// The string-to-sign derived from the canonical request.
    pub fn string_to_sign(&self) -> Result<String> {
        let sts = canonical::string_to_sign(&self.datetime, &self.scope, &self.canonical_request()?);
        debug!("calculated string to sign: {sts}");
        Ok(sts)
    }

    /// The hex signature for this request.
    pub fn signature(&self) -> Result<String> {
        let key = signing_key(
            self.cache.as_ref(),
            &self.credential.secret_access_key,
            &self.datetime[..8],
            &self.region,
            &self.service,
        );
        Ok(hex_hmac_sha256(&key, self.string_to_sign()?.as_bytes()))
    }

    /// The full `Authorization` header value.
    pub fn authorization(&self) -> Result<String> {
        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credential.access_key_id,
            self.scope,
            self.signed_headers,
            self.signature()?
        ))
    }

    /// Finish signing: attach the signature and assemble the signed request.
    pub fn into_request(mut self) -> Result<http::Request<Bytes>> {
        if self.sign_query {
            // The signature goes last, after everything it covers.
            let signature = self.signature()?;
            self.req.query_set(X_AMZ_SIGNATURE, signature);
            if let Some(token) = self.credential.session_token.clone() {
                if self.append_session_token {
                    self.req.query_set(X_AMZ_SECURITY_TOKEN, token);
                }
            }
        } else {
            let mut authorization = HeaderValue::from_str(&self.authorization()?)?;
            authorization.set_sensitive(true);
            self.req.headers.insert(header::AUTHORIZATION, authorization);
        }

        let body = std::mem::take(&mut self.body);
        self.req.apply(body)
    }
}

/// Resolve the effective service and region, inferring from the host when the
/// caller left either unset.
fn resolve_service_region(req: &SigningRequest, opts: &SignOptions) -> (String, String) {
    let (guessed_service, guessed_region) = if opts.service.is_none() || opts.region.is_none() {
        guess_service_region(req.hostname(), &req.path, &req.headers)
    } else {
        (String::new(), None)
    };

    let service = opts.service.clone().unwrap_or(guessed_service);
    let region = opts
        .region
        .clone()
        .or(guessed_region.filter(|r| !r.is_empty()))
        .unwrap_or_else(|| "us-east-1".to_string());

    (service, region)
}
