//! Error types for declarative HTTP calls.
//!
//! Every failure a client can produce is a variant of [`Error`], so callers can handle
//! failures uniformly or match on the kind they care about. Variants that come from a
//! received response keep the raw body and status for debugging.

use http::{HeaderMap, Method, StatusCode};
use std::time::SystemTime;

/// The main error type for declarative HTTP calls.
///
/// # Examples
///
/// ```no_run
/// use tether::{Client, Error, InterfaceDef, MethodDef, ReturnShape};
/// use tether::contract::RequestLine;
///
/// # fn example() -> Result<(), Error> {
/// let api = InterfaceDef::new("Status")
///     .method(MethodDef::new("ping").with(RequestLine::new("GET /ping")).returns(ReturnShape::Text));
/// let client = Client::builder().build(&api, "https://api.example.com")?;
///
/// match client.invoke("ping", &[]) {
///     Ok(outcome) => println!("pong: {:?}", outcome),
///     Err(Error::Status { status, raw_response, .. }) => {
///         eprintln!("HTTP error {}: {}", status, raw_response);
///     }
///     Err(e) if e.is_retryable() => eprintln!("gave up after retries: {}", e),
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The interface description could not be turned into request templates.
    ///
    /// Raised only while building a client: ambiguous HTTP verbs, empty annotation values,
    /// template variables with no bound parameter and similar mistakes.
    #[error("Contract error: {0}")]
    Contract(String),

    /// A call was made with arguments or settings the client cannot use.
    ///
    /// This covers wrong argument counts, invalid header names or values and null body
    /// arguments. It is never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A path template variable had no value when the request was built.
    #[error("Template error: {0}")]
    Template(String),

    /// The expanded request URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to serialize the request body.
    #[error("Failed to encode request body: {0}")]
    Encode(String),

    /// The response was successful but its body could not be materialized.
    ///
    /// # Fields
    ///
    /// * `status` - The HTTP status code
    /// * `raw_response` - The raw response body, lossily decoded as UTF-8
    /// * `message` - What went wrong
    #[error("Failed to decode response (status {status}): {message}")]
    Decode {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The decoder's error message
        message: String,
    },

    /// The transport failed to execute the request (connection refused, timeout, reset).
    ///
    /// Transport failures are retryable; the configured retryer decides whether another
    /// attempt happens.
    #[error("{method} {url} failed: {source}")]
    Io {
        /// The HTTP method of the failed request
        method: Method,
        /// The URL of the failed request
        url: String,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// The server or an error decoder asked for the request to be tried again.
    ///
    /// # Fields
    ///
    /// * `status` - The HTTP status code, when a response was received
    /// * `message` - A description of the failure
    /// * `method` - The HTTP method of the request, if known
    /// * `retry_after` - When the server suggested trying again
    /// * `source` - The failure that was reclassified as retryable
    #[error("Retryable failure: {message}")]
    Retryable {
        /// The HTTP status code, if a response was received
        status: Option<StatusCode>,
        /// A description of the failure
        message: String,
        /// The HTTP method of the request
        method: Option<Method>,
        /// The earliest time the server wants to see another attempt
        retry_after: Option<SystemTime>,
        /// The underlying failure
        #[source]
        source: Option<Box<Error>>,
    },

    /// The server returned a non-2xx status.
    ///
    /// # Fields
    ///
    /// * `status` - The HTTP status code
    /// * `reason` - The reason phrase, if the transport reported one
    /// * `config_key` - The method that made the call, e.g. `GitHub#contributors(owner,repo)`
    /// * `headers` - The response headers
    /// * `raw_response` - The raw response body
    #[error("HTTP error {status} calling {config_key}: {raw_response}")]
    Status {
        /// The HTTP status code
        status: StatusCode,
        /// The reason phrase
        reason: Option<String>,
        /// The configuration key of the method
        config_key: String,
        /// The response headers
        headers: HeaderMap,
        /// The raw response body
        raw_response: String,
    },

    /// An asynchronous call was cancelled before it completed.
    #[error("Call was cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error may go away on another attempt.
    ///
    /// Transport failures and explicit [`Error::Retryable`] failures are retryable.
    /// HTTP status errors are not, unless an error decoder reclassified them.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::Status {
    ///     status: StatusCode::SERVICE_UNAVAILABLE,
    ///     reason: None,
    ///     config_key: "Api#get()".to_string(),
    ///     headers: http::HeaderMap::new(),
    ///     raw_response: "busy".to_string(),
    /// };
    /// assert!(!err.is_retryable());
    ///
    /// let err = Error::Retryable {
    ///     status: Some(StatusCode::SERVICE_UNAVAILABLE),
    ///     message: "busy".to_string(),
    ///     method: None,
    ///     retry_after: None,
    ///     source: Some(Box::new(err)),
    /// };
    /// assert!(err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io { .. } => true,
            Error::Retryable { .. } => true,
            Error::Contract(_)
            | Error::Configuration(_)
            | Error::Template(_)
            | Error::InvalidUrl(_)
            | Error::Encode(_)
            | Error::Decode { .. }
            | Error::Status { .. }
            | Error::Cancelled => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Decode { status, .. } => Some(*status),
            Error::Retryable { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Status { raw_response, .. } => Some(raw_response),
            Error::Decode { raw_response, .. } => Some(raw_response),
            Error::Retryable {
                source: Some(source),
                ..
            } => source.raw_response(),
            _ => None,
        }
    }

    /// Returns the server-suggested time for the next attempt, if any.
    pub fn retry_after(&self) -> Option<SystemTime> {
        match self {
            Error::Retryable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Wraps a transport failure for the given request.
    pub(crate) fn executing(request: &crate::Request, source: std::io::Error) -> Self {
        Error::Io {
            method: request.method().clone(),
            url: request.url().to_string(),
            source,
        }
    }

    /// Returns the wrapped cause of a retryable failure, or the error itself.
    pub(crate) fn unwrap_cause(self) -> Self {
        match self {
            Error::Retryable {
                source: Some(source),
                ..
            } => *source,
            other => other,
        }
    }
}

/// A specialized `Result` type for declarative HTTP calls.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
