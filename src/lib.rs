//! AWS SigV4 request signing with a retrying, cancellable fetch layer.
//!
//! This crate does two things, in one direction:
//!
//! - **Sign**: turn an outbound [`http::Request`] plus a [`Credential`] into a
//!   request carrying a valid AWS Signature Version 4, either as an
//!   `Authorization` header or as signed query parameters.
//! - **Fetch**: dispatch the signed request through a pluggable [`HttpSend`]
//!   transport with retries, jittered exponential backoff, a per-call timeout,
//!   cooperative cancellation, and an optional per-attempt hook.
//!
//! Signing keys derived from the secret are memoized in a swappable
//! [`KeyCache`] owned by the [`Client`]. Service and region are inferred from
//! the host name when not supplied.
//!
//! # Example
//!
//! ```no_run
//! use anyhow::Result;
//! use bytes::Bytes;
//! use sigv4_fetch::{Client, Credential, FetchOptions, ReqwestHttpSend};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let credential = Credential::new("access_key_id", "secret_access_key");
//!     let client = Client::new(credential, ReqwestHttpSend::default());
//!
//!     let req = http::Request::builder()
//!         .method("GET")
//!         .uri("https://s3.us-east-1.amazonaws.com/testbucket")
//!         .body(Bytes::new())?;
//!
//!     // Service and region are inferred from the host name here.
//!     let resp = client.fetch(req, FetchOptions::default()).await?;
//!     println!("resp got status: {}", resp.status());
//!     Ok(())
//! }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod canonical;
pub mod hash;
pub mod time;
pub mod utils;

mod constants;
pub use constants::UNSIGNABLE_HEADERS;

mod error;
pub use error::{Error, ErrorKind, Result};

mod credential;
pub use credential::Credential;

mod request;
pub use request::SigningRequest;

mod keycache;
pub use keycache::{signing_key, KeyCache, MemoryKeyCache};

mod endpoint;
pub use endpoint::guess_service_region;

mod signer;
pub use signer::{SignOptions, V4Signer};

mod http;
pub use crate::http::HttpSend;
#[cfg(feature = "reqwest")]
pub use crate::http::ReqwestHttpSend;

mod client;
pub use client::{Attempt, AttemptOutcome, Client, FetchOptions};
