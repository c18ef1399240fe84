//! The wire-level HTTP collaborators.
//!
//! A transport executes one fully built [`Request`] and returns the [`Response`] or an I/O
//! failure. Retries, decoding and error classification all happen above this layer, so
//! an implementation only needs to move bytes.

mod reqwest_client;

pub use reqwest_client::{BlockingReqwestTransport, ReqwestTransport};

use crate::{Options, Request, Response};
use std::io;

/// Executes requests on the calling thread.
pub trait Transport: Send + Sync {
    /// Sends `request` and waits for the response head.
    ///
    /// The body may still be streaming when this returns; the caller closes it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the request could not be sent or no response arrived in
    /// time. Non-2xx responses are not errors at this layer.
    fn execute(&self, request: &Request, options: &Options) -> io::Result<Response>;
}

/// Executes requests without blocking the calling thread.
///
/// # Examples
///
/// ```
/// use tether::transport::AsyncTransport;
/// use tether::{Body, Options, Request, Response};
/// use http::StatusCode;
/// use std::io;
///
/// /// Answers every request with an empty 204.
/// struct NoContent;
///
/// #[async_trait::async_trait]
/// impl AsyncTransport for NoContent {
///     async fn execute(&self, _request: &Request, _options: &Options) -> io::Result<Response> {
///         Ok(Response::builder(StatusCode::NO_CONTENT)
///             .body(Body::from_bytes(Vec::new()))
///             .build())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AsyncTransport: Send + Sync {
    /// Sends `request` and resolves to the response.
    ///
    /// Dropping the returned future abandons the exchange.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the request could not be sent or no response arrived in
    /// time.
    async fn execute(&self, request: &Request, options: &Options) -> io::Result<Response>;
}

/// Maps a `reqwest` failure onto the closest I/O error kind.
pub(crate) fn io_error(error: ::reqwest::Error) -> io::Error {
    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else if error.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else if error.is_body() || error.is_decode() {
        io::ErrorKind::UnexpectedEof
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, error)
}
