use super::{io_error, AsyncTransport, Transport};
use crate::response::BodySource;
use crate::{Body, Options, Request, Response};
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Mutex;
use std::time::Duration;

/// One `reqwest` client per connect timeout and redirect policy.
///
/// Building a `reqwest` client sets up a connection pool and TLS configuration, so clients
/// are built lazily and reused by every request with the same settings. The read timeout
/// varies per request and is applied on the request itself.
struct ClientCache<C> {
    clients: Mutex<HashMap<(Duration, bool), C>>,
}

impl<C: Clone> ClientCache<C> {
    fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_build(
        &self,
        options: &Options,
        build: impl FnOnce(Duration, bool) -> io::Result<C>,
    ) -> io::Result<C> {
        let key = (options.connect_timeout_duration(), options.follows_redirects());
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build(key.0, key.1)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn redirect_policy(follow: bool) -> ::reqwest::redirect::Policy {
    if follow {
        ::reqwest::redirect::Policy::default()
    } else {
        ::reqwest::redirect::Policy::none()
    }
}

/// The default asynchronous transport, backed by `reqwest`.
///
/// Response bodies are read completely before the future resolves, so the connection is
/// returned to the pool right away.
///
/// # Examples
///
/// ```no_run
/// use tether::transport::ReqwestTransport;
/// use tether::{Client, InterfaceDef};
///
/// # fn example(api: InterfaceDef) -> Result<(), tether::Error> {
/// let client = Client::builder()
///     .async_transport(ReqwestTransport::new())
///     .build_async(&api, "https://api.example.com")?;
/// # Ok(())
/// # }
/// ```
pub struct ReqwestTransport {
    clients: ClientCache<::reqwest::Client>,
}

impl ReqwestTransport {
    /// Creates a transport with an empty client cache.
    pub fn new() -> Self {
        Self {
            clients: ClientCache::new(),
        }
    }

    fn client(&self, options: &Options) -> io::Result<::reqwest::Client> {
        self.clients.get_or_build(options, |connect_timeout, follow| {
            ::reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .redirect(redirect_policy(follow))
                .build()
                .map_err(io_error)
        })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AsyncTransport for ReqwestTransport {
    async fn execute(&self, request: &Request, options: &Options) -> io::Result<Response> {
        let client = self.client(options)?;

        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .timeout(options.read_timeout_duration());
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(io_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(io_error)?;

        Ok(Response::builder(status)
            .headers(headers)
            .body(Body::from_bytes(bytes.to_vec()))
            .build())
    }
}

/// The default blocking transport, backed by `reqwest::blocking`.
///
/// The body is streamed: it is read from the connection as the decoder consumes it and
/// released when the body is closed.
///
/// `reqwest::blocking` starts its own runtime, so this transport must not be used from
/// inside an async task; call it from a plain thread or `spawn_blocking`.
pub struct BlockingReqwestTransport {
    clients: ClientCache<::reqwest::blocking::Client>,
}

impl BlockingReqwestTransport {
    /// Creates a transport with an empty client cache.
    pub fn new() -> Self {
        Self {
            clients: ClientCache::new(),
        }
    }

    fn client(&self, options: &Options) -> io::Result<::reqwest::blocking::Client> {
        self.clients.get_or_build(options, |connect_timeout, follow| {
            ::reqwest::blocking::Client::builder()
                .connect_timeout(connect_timeout)
                .redirect(redirect_policy(follow))
                .build()
                .map_err(io_error)
        })
    }
}

impl Default for BlockingReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for BlockingReqwestTransport {
    fn execute(&self, request: &Request, options: &Options) -> io::Result<Response> {
        let client = self.client(options)?;

        let mut builder = client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .timeout(options.read_timeout_duration());
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().map_err(io_error)?;
        let status = response.status();
        let headers = response.headers().clone();

        Ok(Response::builder(status)
            .headers(headers)
            .body(Body::new(StreamingBody {
                length: response.content_length(),
                response: Some(response),
            }))
            .build())
    }
}

/// A body read straight from the connection.
struct StreamingBody {
    length: Option<u64>,
    response: Option<::reqwest::blocking::Response>,
}

impl Read for StreamingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.response.as_mut() {
            Some(response) => response.read(buf),
            None => Ok(0),
        }
    }
}

impl BodySource for StreamingBody {
    fn length(&self) -> Option<u64> {
        self.length
    }

    fn close(&mut self) -> io::Result<()> {
        self.response.take();
        Ok(())
    }
}
