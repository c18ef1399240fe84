//! An in-memory transport for tests.
//!
//! [`MockClient`] answers requests from canned responses keyed by method and path, records
//! everything it receives, and counts how often the bodies it handed out were closed.

use crate::response::BodySource;
use crate::transport::{AsyncTransport, Transport};
use crate::{Body, Options, Request, Response};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    delay: Duration,
}

impl MockResponse {
    /// A response with the given status and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
            delay: Duration::ZERO,
        }
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Waits before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Respond(MockResponse),
    Fail(io::ErrorKind, String),
}

#[derive(Debug, Default)]
struct State {
    canned: HashMap<(Method, String), VecDeque<Canned>>,
    requests: Vec<Request>,
}

/// A transport that serves canned responses.
///
/// Responses are matched on the HTTP method and the request's path and query, e.g.
/// `/repos/rust-lang/rust?per_page=10`. Registering several responses for the same key
/// serves them in order; the last one then repeats. Unmatched requests get a 404.
///
/// # Examples
///
/// ```
/// use tether::mock::{MockClient, MockResponse};
/// use http::{Method, StatusCode};
///
/// let mock = MockClient::new()
///     .fail(Method::GET, "/flaky", std::io::ErrorKind::ConnectionReset)
///     .ok(Method::GET, "/flaky", r#"{"ok": true}"#)
///     .add(Method::DELETE, "/users/1", MockResponse::new(StatusCode::NO_CONTENT));
///
/// assert_eq!(mock.request_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<State>>,
    closes: Arc<AtomicUsize>,
}

impl MockClient {
    /// Creates a mock with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `method` and `path_and_query`.
    pub fn add(self, method: Method, path_and_query: &str, response: MockResponse) -> Self {
        self.push(method, path_and_query, Canned::Respond(response));
        self
    }

    /// Queues a 200 response with `body`.
    pub fn ok(self, method: Method, path_and_query: &str, body: impl Into<Vec<u8>>) -> Self {
        self.add(method, path_and_query, MockResponse::new(StatusCode::OK).body(body))
    }

    /// Queues a transport failure.
    pub fn fail(self, method: Method, path_and_query: &str, kind: io::ErrorKind) -> Self {
        self.push(
            method,
            path_and_query,
            Canned::Fail(kind, format!("mock {:?}", kind)),
        );
        self
    }

    fn push(&self, method: Method, path_and_query: &str, canned: Canned) {
        self.lock()
            .canned
            .entry((method, path_and_query.to_string()))
            .or_default()
            .push_back(canned);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Requests received for `method` and `path_and_query`.
    pub fn requests_to(&self, method: &Method, path_and_query: &str) -> Vec<Request> {
        self.lock()
            .requests
            .iter()
            .filter(|request| {
                request.method() == method && request.path_and_query() == path_and_query
            })
            .cloned()
            .collect()
    }

    /// The number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// How many response bodies handed out by this mock were closed.
    pub fn body_closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Panics unless exactly `times` requests matched `method` and `path_and_query`.
    pub fn verify_times(&self, method: &Method, path_and_query: &str, times: usize) {
        let received = self.requests_to(method, path_and_query).len();
        assert_eq!(
            received, times,
            "expected {} {} {} time(s), received {}",
            method, path_and_query, times, received
        );
    }

    /// Panics if any request was received.
    pub fn verify_zero_interactions(&self) {
        let requests = self.requests();
        assert!(
            requests.is_empty(),
            "expected no requests, received {:?}",
            requests
                .iter()
                .map(|request| format!("{} {}", request.method(), request.path_and_query()))
                .collect::<Vec<_>>()
        );
    }

    /// Forgets received requests and resets the close counter.
    pub fn reset(&self) {
        self.lock().requests.clear();
        self.closes.store(0, Ordering::SeqCst);
    }

    /// Records `request` and picks its canned answer.
    fn next(&self, request: &Request) -> Canned {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let key = (request.method().clone(), request.path_and_query());
        match state.canned.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Canned::Respond(MockResponse::new(StatusCode::NOT_FOUND))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Canned::Respond(MockResponse::new(StatusCode::NOT_FOUND))),
            None => {
                tracing::debug!(
                    method = %request.method(),
                    path = %request.path_and_query(),
                    "No canned response, answering 404"
                );
                Canned::Respond(MockResponse::new(StatusCode::NOT_FOUND))
            }
        }
    }

    fn respond(&self, request: &Request, canned: MockResponse) -> Response {
        let mut builder = Response::builder(canned.status)
            .headers(canned.headers)
            .request(request.clone());
        if let Some(bytes) = canned.body {
            builder = builder.body(Body::new(CountingBody {
                length: bytes.len() as u64,
                cursor: io::Cursor::new(bytes),
                closes: self.closes.clone(),
            }));
        }
        builder.build()
    }
}

impl Transport for MockClient {
    fn execute(&self, request: &Request, _options: &Options) -> io::Result<Response> {
        match self.next(request) {
            Canned::Respond(canned) => {
                if !canned.delay.is_zero() {
                    std::thread::sleep(canned.delay);
                }
                Ok(self.respond(request, canned))
            }
            Canned::Fail(kind, message) => Err(io::Error::new(kind, message)),
        }
    }
}

#[async_trait::async_trait]
impl AsyncTransport for MockClient {
    async fn execute(&self, request: &Request, _options: &Options) -> io::Result<Response> {
        match self.next(request) {
            Canned::Respond(canned) => {
                if !canned.delay.is_zero() {
                    tokio::time::sleep(canned.delay).await;
                }
                Ok(self.respond(request, canned))
            }
            Canned::Fail(kind, message) => Err(io::Error::new(kind, message)),
        }
    }
}

struct CountingBody {
    length: u64,
    cursor: io::Cursor<Vec<u8>>,
    closes: Arc<AtomicUsize>,
}

impl Read for CountingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl BodySource for CountingBody {
    fn length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
