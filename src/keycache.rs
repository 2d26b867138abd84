use crate::hash::hmac_sha256;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

/// Cache for derived SigV4 signing keys.
///
/// Entries are pure functions of their key, so a lookup can never return
/// stale data and concurrent overwrites with recomputed values are harmless.
/// The default [`MemoryKeyCache`] grows by one entry per distinct
/// `(secret, date, region, service)` tuple; callers that worry about
/// long-lived processes can plug in a bounded implementation instead.
pub trait KeyCache: Debug + Send + Sync + 'static {
    /// Look up a derived key.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a derived key.
    fn put(&self, key: String, value: Vec<u8>);
}

/// Unbounded in-memory [`KeyCache`].
#[derive(Debug, Default)]
pub struct MemoryKeyCache {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl KeyCache for MemoryKeyCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().expect("lock poisoned").get(key).cloned()
    }

    fn put(&self, key: String, value: Vec<u8>) {
        self.inner.lock().expect("lock poisoned").insert(key, value);
    }
}

/// Derive the scope-bound signing key for `(secret, date, region, service)`,
/// memoized through `cache`.
///
/// The chain is
/// `HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`,
/// yielding a 32-byte key that is identical for a fixed input tuple.
pub fn signing_key(
    cache: &dyn KeyCache,
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let cache_key = [secret, date, region, service].join(",");
    if let Some(key) = cache.get(&cache_key) {
        return key;
    }

    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_credentials = hmac_sha256(&k_service, b"aws4_request");

    cache.put(cache_key, k_credentials.clone());
    k_credentials
}
