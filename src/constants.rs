use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

// Headers used while signing.
pub const X_AMZ_CONTENT_SHA_256: &str = "x-amz-content-sha256";
pub const X_AMZ_DATE: &str = "x-amz-date";
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
pub const X_AMZ_TARGET: &str = "x-amz-target";

// Query parameters used while signing via query string.
pub const X_AMZ_ALGORITHM: &str = "X-Amz-Algorithm";
pub const X_AMZ_CREDENTIAL: &str = "X-Amz-Credential";
pub const X_AMZ_EXPIRES: &str = "X-Amz-Expires";
pub const X_AMZ_SIGNATURE: &str = "X-Amz-Signature";
pub const X_AMZ_SIGNED_HEADERS: &str = "X-Amz-SignedHeaders";

/// The SigV4 algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Sentinel body hash for payloads that are not signed.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Default `X-Amz-Expires` for S3 query signing: 24 hours.
pub const DEFAULT_S3_EXPIRES_SECS: &str = "86400";

/// Headers excluded from signing because proxies and clients commonly rewrite
/// them in transit. They are only signed when `all_headers` is requested.
///
/// The list matches the one shipped in the AWS JavaScript SDK's v4 signer.
pub const UNSIGNABLE_HEADERS: [&str; 9] = [
    "authorization",
    "content-type",
    "content-length",
    "user-agent",
    "presigned-expires",
    "expect",
    "x-amzn-trace-id",
    "range",
    "connection",
];

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// - URI encode every byte except the unreserved characters: 'A'-'Z', 'a'-'z', '0'-'9', '-', '.', '_', and '~'.
/// - '/' is kept as-is in paths.
pub static AWS_URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// AsciiSet for [AWS UriEncode](https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html)
///
/// But used in query.
pub static AWS_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
