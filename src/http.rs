use crate::{Error, Result};
use bytes::Bytes;
use std::fmt::Debug;

/// HttpSend performs one HTTP exchange for a signed request.
///
/// This is the seam between the resilient client and the network: the client
/// signs, retries, and cancels; the transport only moves bytes. Implementors
/// should not retry internally.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send an http request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// [`HttpSend`] backed by a [`reqwest::Client`].
#[cfg(feature = "reqwest")]
#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::Client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest")]
#[async_trait::async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = reqwest::Request::try_from(req)
            .map_err(|e| Error::request_invalid(format!("request not convertible: {e}")).with_source(e))?;
        let resp: http::Response<_> = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::unexpected(format!("transport failed: {e}")).with_source(e))?
            .into();

        let (parts, body) = resp.into_parts();
        let bs = http_body_util::BodyExt::collect(body)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(|e| Error::unexpected(format!("reading body failed: {e}")).with_source(e))?;
        Ok(http::Response::from_parts(parts, bs))
    }
}
