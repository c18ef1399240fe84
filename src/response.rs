//! Responses returned by transports and the body resource they carry.
//!
//! A [`Response`] owns its [`Body`]. The body is closed exactly once: explicitly through
//! [`Body::close`], or when it is dropped. Closing twice is a no-op, so every exit path
//! can release the body without tracking whether someone else already did.

use crate::Request;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};

/// Bodies at or below this size are buffered when a raw [`Response`] is returned.
pub(crate) const MAX_RESPONSE_BUFFER_SIZE: u64 = 8192;

/// A source of response bytes.
///
/// Transports implement this to expose a streamed body. The default `close` does nothing,
/// which suits in-memory bodies.
pub trait BodySource: Read + Send {
    /// The declared or inferred length of the body, if known.
    fn length(&self) -> Option<u64>;

    /// Releases the underlying resource.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BytesSource {
    cursor: io::Cursor<Vec<u8>>,
    length: u64,
}

impl Read for BytesSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl BodySource for BytesSource {
    fn length(&self) -> Option<u64> {
        Some(self.length)
    }
}

/// A response body.
///
/// # Examples
///
/// ```
/// use tether::Body;
///
/// let mut body = Body::from_bytes("hello");
/// assert_eq!(body.length(), Some(5));
/// assert_eq!(body.read_to_string().unwrap(), "hello");
///
/// body.close();
/// body.close();
/// assert!(body.is_closed());
/// ```
pub struct Body {
    source: Box<dyn BodySource>,
    closed: bool,
}

impl Body {
    /// Wraps a streamed body source.
    pub fn new(source: impl BodySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            closed: false,
        }
    }

    /// Creates an in-memory body.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self::new(BytesSource {
            length: bytes.len() as u64,
            cursor: io::Cursor::new(bytes),
        })
    }

    /// The declared or inferred length of the body, if known.
    pub fn length(&self) -> Option<u64> {
        self.source.length()
    }

    /// Reads the remaining bytes of the body.
    pub fn read_to_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.length().unwrap_or(0).min(1 << 20) as usize);
        self.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads the remaining body as UTF-8, replacing invalid sequences.
    pub fn read_to_string(&mut self) -> io::Result<String> {
        let bytes = self.read_to_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Closes the body. Only the first call reaches the underlying source.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.source.close() {
            tracing::debug!(error = %e, "Failed to close response body");
        }
    }

    /// Returns `true` once the body was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response body is closed",
            ));
        }
        self.source.read(buf)
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("length", &self.length())
            .field("closed", &self.closed)
            .finish()
    }
}

/// An HTTP response received from a transport.
///
/// # Examples
///
/// ```
/// use tether::{Body, Response};
/// use http::StatusCode;
///
/// let response = Response::builder(StatusCode::OK)
///     .header("content-type", "application/json")
///     .body(Body::from_bytes(r#"{"id":1}"#))
///     .build();
///
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// assert!(response.status().is_success());
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    body: Option<Body>,
    request: Option<Request>,
}

impl Response {
    /// Starts building a response with the given status.
    pub fn builder(status: StatusCode) -> ResponseBuilder {
        ResponseBuilder {
            response: Response {
                status,
                reason: status.canonical_reason().map(str::to_string),
                headers: HeaderMap::new(),
                body: None,
                request: None,
            },
        }
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The body, if the response has one.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Mutable access to the body.
    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// Takes ownership of the body, leaving the response without one.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// The request that produced this response, once the client attached it.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Reads the whole body as text, or an empty string if there is none.
    pub fn text(&mut self) -> io::Result<String> {
        match self.body.as_mut() {
            Some(body) => body.read_to_string(),
            None => Ok(String::new()),
        }
    }

    /// Reads the whole body as bytes, or an empty vector if there is none.
    pub fn bytes(&mut self) -> io::Result<Vec<u8>> {
        match self.body.as_mut() {
            Some(body) => body.read_to_bytes(),
            None => Ok(Vec::new()),
        }
    }

    /// Closes the body, if any.
    pub fn close(&mut self) {
        if let Some(body) = self.body.as_mut() {
            body.close();
        }
    }

    pub(crate) fn replace_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    pub(crate) fn with_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    /// Reads the body into memory, closing the original source.
    pub(crate) fn rebuffer(mut self) -> io::Result<Self> {
        if let Some(mut body) = self.body.take() {
            let bytes = body.read_to_bytes();
            body.close();
            self.body = Some(Body::from_bytes(bytes?));
        }
        Ok(self)
    }

    /// Buffers small bodies so the response outlives the connection.
    pub(crate) fn buffer_if_small(self) -> io::Result<Self> {
        let small = self
            .body
            .as_ref()
            .and_then(Body::length)
            .is_some_and(|length| length <= MAX_RESPONSE_BUFFER_SIZE);
        if small {
            self.rebuffer()
        } else {
            Ok(self)
        }
    }
}

/// Builder for [`Response`], used by transports and tests.
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Sets the reason phrase.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.response.reason = Some(reason.into());
        self
    }

    /// Appends a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(name),
            http::HeaderValue::try_from(value),
        ) {
            self.response.headers.append(name, value);
        }
        self
    }

    /// Replaces all headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.response.headers = headers;
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: Body) -> Self {
        self.response.body = Some(body);
        self
    }

    /// Sets the request that produced the response.
    pub fn request(mut self, request: Request) -> Self {
        self.response.request = Some(request);
        self
    }

    /// Builds the `Response`.
    pub fn build(self) -> Response {
        self.response
    }
}

/// A lazily consumed line stream over a response body.
///
/// The stream owns the body and closes it when the last line was read or the stream is
/// dropped, whichever happens first.
pub struct Lines {
    reader: BufReader<Body>,
}

impl Lines {
    pub(crate) fn new(body: Body) -> Self {
        Self {
            reader: BufReader::new(body),
        }
    }

    /// Closes the underlying body without reading the rest.
    pub fn close(&mut self) {
        self.reader.get_mut().close();
    }
}

impl Iterator for Lines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.get_ref().is_closed() {
            return None;
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {
                self.close();
                None
            }
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(Ok(line))
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl fmt::Debug for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lines")
            .field("body", self.reader.get_ref())
            .finish()
    }
}
