//! Transport-level requests and per-call options.

use http::{HeaderMap, Method};
use std::time::Duration;
use url::Url;

/// A fully resolved HTTP request, ready to hand to a transport.
///
/// Requests are immutable; they are produced from a resolved
/// [`RequestTemplate`](crate::template::RequestTemplate) after interceptors ran.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    charset: Option<String>,
}

impl Request {
    /// Creates a new `Request`.
    pub fn new(
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
        charset: Option<String>,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            charset,
        }
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The absolute URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The path and query of the URL, e.g. `/users/42?active=true`.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The character set of the body.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }
}

/// Per-call transport options.
///
/// # Examples
///
/// ```
/// use tether::Options;
/// use std::time::Duration;
///
/// let options = Options::default()
///     .connect_timeout(Duration::from_secs(2))
///     .read_timeout(Duration::from_secs(5))
///     .follow_redirects(false);
/// assert!(!options.follows_redirects());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Options {
    connect_timeout: Duration,
    read_timeout: Duration,
    follow_redirects: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            follow_redirects: true,
        }
    }
}

impl Options {
    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets whether redirects are followed.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// The connect timeout.
    pub fn connect_timeout_duration(&self) -> Duration {
        self.connect_timeout
    }

    /// The read timeout.
    pub fn read_timeout_duration(&self) -> Duration {
        self.read_timeout
    }

    /// Whether redirects are followed.
    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }
}
