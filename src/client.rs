use crate::keycache::{KeyCache, MemoryKeyCache};
use crate::signer::{SignOptions, V4Signer};
use crate::{Credential, Error, HttpSend, Result};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use log::warn;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default number of retries after the initial attempt.
const DEFAULT_RETRIES: i32 = 3;

/// Default base for the jittered exponential backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Observation passed to the [`FetchOptions::on_attempt`] hook.
///
/// Fired once per attempt, success or failure, before the retry decision.
#[derive(Debug)]
pub struct Attempt<'a> {
    /// 0-based attempt counter.
    pub attempt: u32,
    /// How long the attempt took.
    pub duration: Duration,
    /// What the attempt produced.
    pub outcome: AttemptOutcome<'a>,
}

/// The outcome of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome<'a> {
    /// The upstream server sent a response (of any status).
    Response(&'a http::Response<Bytes>),
    /// The attempt failed before a response arrived, or the response was
    /// rejected by the caller's predicate.
    Error(&'a Error),
}

/// Per-attempt observation hook.
pub type AttemptHook = Box<dyn Fn(Attempt<'_>) + Send + Sync>;

/// Custom verdict on whether a response is okay.
pub type ResponsePredicate = Box<dyn Fn(&http::Response<Bytes>) -> bool + Send + Sync>;

/// Per-call options for [`Client::fetch`].
#[derive(Default)]
pub struct FetchOptions {
    /// Signing options for this request.
    pub sign: SignOptions,
    /// Override the client's retry count for this call.
    pub retries: Option<i32>,
    /// Maximum duration for the whole call, retries included.
    pub timeout: Option<Duration>,
    /// Cancellation token for the call and any retries. No retry is attempted
    /// once the token has been observed cancelled, even mid-backoff.
    pub cancel: Option<CancellationToken>,
    /// Hook invoked for each attempt, for gathering metrics or similar.
    pub on_attempt: Option<AttemptHook>,
    /// Custom verdict on whether the would-be-returned response is okay.
    ///
    /// A rejection with attempts remaining behaves like a retryable failure;
    /// a rejection on the final attempt raises an error carrying the
    /// response.
    pub is_response_ok: Option<ResponsePredicate>,
}

/// A signing HTTP client with retry, backoff, timeout and cancellation.
///
/// Owns one [`Credential`] and one derived-key cache; rotating credentials
/// means building a new client. Safe to share across tasks: concurrent calls
/// only share the key cache, whose entries are pure functions of their key.
#[derive(Debug, Clone)]
pub struct Client {
    credential: Credential,
    transport: Arc<dyn HttpSend>,
    cache: Arc<dyn KeyCache>,

    service: Option<String>,
    region: Option<String>,
    retries: i32,
    initial_backoff: Duration,
}

impl Client {
    /// Create a new client from a credential and a transport.
    pub fn new(credential: Credential, transport: impl HttpSend) -> Self {
        Self {
            credential,
            transport: Arc::new(transport),
            cache: Arc::new(MemoryKeyCache::default()),
            service: None,
            region: None,
            retries: DEFAULT_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    /// Set the default service for requests signed by this client.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the default region for requests signed by this client.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the default retry count. Validated at call time; negative values
    /// make [`fetch`](Client::fetch) fail without attempting.
    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the base for the jittered exponential backoff.
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Replace the derived signing key cache, e.g. with a bounded one.
    pub fn with_key_cache(mut self, cache: impl KeyCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Prepare a [`V4Signer`] for a request, merging in the client's default
    /// service and region.
    pub fn signer(&self, req: &http::Request<Bytes>, opts: &SignOptions) -> Result<V4Signer> {
        let mut opts = opts.clone();
        if opts.service.is_none() {
            opts.service = self.service.clone();
        }
        if opts.region.is_none() {
            opts.region = self.region.clone();
        }
        V4Signer::new(req, &self.credential, self.cache.clone(), &opts)
    }

    /// Sign a request without dispatching it.
    pub fn sign(
        &self,
        req: http::Request<Bytes>,
        opts: &SignOptions,
    ) -> Result<http::Request<Bytes>> {
        self.signer(&req, opts)?.into_request()
    }

    /// Sign and dispatch a request with retry, backoff, timeout and
    /// cancellation.
    ///
    /// HTTP 5xx, 429 and 499 responses and transport errors are retried with
    /// jittered exponential backoff; every retry re-signs the request from
    /// scratch so embedded timestamps stay fresh. Any other status is
    /// returned as-is. After the last attempt, a retryable response is
    /// returned to the caller and a transport error is propagated verbatim.
    pub async fn fetch(
        &self,
        req: http::Request<Bytes>,
        opts: FetchOptions,
    ) -> Result<http::Response<Bytes>> {
        let max_retries = opts.retries.unwrap_or(self.retries);
        if max_retries < 0 {
            return Err(Error::config_invalid(format!(
                "retries must not be negative, got {max_retries}"
            )));
        }
        let max_retries = max_retries as u32;

        // One composite signal per call: caller token + timeout deadline,
        // first to fire wins.
        let cancel = CancelSignal::new(opts.cancel.clone(), opts.timeout);

        let (parts, body) = req.into_parts();
        let (method, uri, headers) = (parts.method, parts.uri, parts.headers);

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("cancelled before attempt"));
            }

            let started = Instant::now();
            let result = self
                .attempt_once(&method, &uri, &headers, &body, &opts.sign, &cancel)
                .await;
            let duration = started.elapsed();
            let last = attempt == max_retries;

            match result {
                Ok(resp) => {
                    observe(&opts.on_attempt, attempt, duration, AttemptOutcome::Response(&resp));

                    if !retryable_status(resp.status()) || last {
                        match &opts.is_response_ok {
                            Some(pred) if !pred(&resp) => {
                                let err = Error::response_not_okay(resp);
                                warn!("attempt {attempt} rejected by response predicate");
                                observe(
                                    &opts.on_attempt,
                                    attempt,
                                    duration,
                                    AttemptOutcome::Error(&err),
                                );
                                if last || cancel.is_cancelled() {
                                    return Err(err);
                                }
                            }
                            _ => return Ok(resp),
                        }
                    }
                }
                Err(err) => {
                    warn!("attempt {attempt} failed: {err}");
                    observe(&opts.on_attempt, attempt, duration, AttemptOutcome::Error(&err));

                    if err.is_permanent() || last || cancel.is_cancelled() {
                        return Err(err);
                    }
                }
            }

            let delay = backoff_delay(self.initial_backoff, attempt);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled("cancelled during backoff"));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    /// Re-sign and dispatch once, racing the transport against cancellation.
    async fn attempt_once(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
        sign_opts: &SignOptions,
        cancel: &CancelSignal,
    ) -> Result<http::Response<Bytes>> {
        let mut req = http::Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(body.clone())?;
        *req.headers_mut() = headers.clone();

        let signed = self.sign(req, sign_opts)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled("cancelled during request")),
            resp = self.transport.http_send(signed) => resp,
        }
    }
}

fn observe(hook: &Option<AttemptHook>, attempt: u32, duration: Duration, outcome: AttemptOutcome) {
    if let Some(hook) = hook {
        hook(Attempt {
            attempt,
            duration,
            outcome,
        });
    }
}

/// Statuses worth another attempt: server errors, throttling (429) and
/// client-closed-request (499).
fn retryable_status(status: StatusCode) -> bool {
    status.as_u16() >= 500 || status.as_u16() == 429 || status.as_u16() == 499
}

/// Backoff before retrying attempt `n`: `random(0,1) * initial * 2^n`.
fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2f64.powi(attempt.min(31) as i32);
    initial.mul_f64(rand::random::<f64>() * factor)
}

/// Composite cancellation: caller token and per-call deadline merged into one
/// signal, first to fire wins.
struct CancelSignal {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    async fn cancelled(&self) {
        let token = async {
            match &self.token {
                Some(t) => t.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = token => {}
            _ = deadline => {}
        }
    }
}
