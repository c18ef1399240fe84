//! Clients generated from interface descriptions.
//!
//! [`ClientBuilder`] parses an [`InterfaceDef`] with a contract and wires one handler per
//! method. The resulting [`Client`] (blocking) or [`AsyncClient`] dispatches calls by
//! method name.

use crate::api::InterfaceDef;
use crate::codec::{
    Decoder, DefaultErrorDecoder, Encoder, ErrorDecoder, FormEncoder, JsonDecoder, JsonEncoder,
};
use crate::contract::{default_contract, Contract};
use crate::fallback::{Fallback, FallbackFactory, FallbackSource};
use crate::handler::{
    AsyncMethodHandler, Dispatch, Outcome, RequestFactory, ResponseHandler, SyncMethodHandler,
};
use crate::interceptor::RequestInterceptor;
use crate::logger::{LogLevel, Logger, TracingLogger};
use crate::metadata::MethodMetadata;
use crate::retry::{Backoff, PropagationPolicy, Retryer};
use crate::target::{HardCodedTarget, Target};
use crate::transport::{AsyncTransport, BlockingReqwestTransport, ReqwestTransport, Transport};
use crate::{Error, Options, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A blocking client for one interface.
///
/// The client is cheap to clone and safe to share between threads; every call gets its
/// own request template and retryer.
///
/// # Examples
///
/// ```no_run
/// use tether::contract::{Param, RequestLine};
/// use tether::{Client, InterfaceDef, MethodDef, ParamDef, ReturnShape};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Contributor {
///     login: String,
///     contributions: u32,
/// }
///
/// # fn example() -> Result<(), tether::Error> {
/// let github = InterfaceDef::new("GitHub").method(
///     MethodDef::new("contributors")
///         .with(RequestLine::new("GET /repos/{owner}/{repo}/contributors"))
///         .param(ParamDef::new("owner").with(Param::new("owner")))
///         .param(ParamDef::new("repo").with(Param::new("repo")))
///         .returns(ReturnShape::List),
/// );
///
/// let client = Client::builder().build(&github, "https://api.github.com")?;
///
/// let contributors: Vec<Contributor> =
///     client.call("contributors", &[json!("rust-lang"), json!("rust")])?;
/// for contributor in contributors {
///     println!("{} ({})", contributor.login, contributor.contributions);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner<SyncMethodHandler>>,
}

/// A non-blocking client for one interface.
///
/// Calls return futures. Dropping a call's future cancels it, including any pending
/// retry; [`AsyncClient::spawn`] runs a call as a task that can be cancelled explicitly.
///
/// # Examples
///
/// ```no_run
/// use tether::contract::RequestLine;
/// use tether::{Client, InterfaceDef, MethodDef, ReturnShape};
///
/// # async fn example() -> Result<(), tether::Error> {
/// let api = InterfaceDef::new("Status")
///     .method(MethodDef::new("ping").with(RequestLine::new("GET /ping")).returns(ReturnShape::Text));
/// let client = Client::builder().build_async(&api, "https://api.example.com")?;
///
/// let pong = client.invoke("ping", &[]).await?;
/// println!("{:?}", pong.into_text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncClient {
    inner: Arc<ClientInner<AsyncMethodHandler>>,
}

struct ClientInner<H> {
    name: String,
    handlers: HashMap<String, H>,
    fallback: Option<FallbackSource>,
}

impl<H> ClientInner<H> {
    fn handler(&self, method: &str) -> Result<&H> {
        self.handlers.get(method).ok_or_else(|| {
            Error::Configuration(format!("{} has no method named {}", self.name, method))
        })
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tether::contract::RequestLine;
    /// use tether::{Client, InterfaceDef, MethodDef};
    ///
    /// # fn example() -> Result<(), tether::Error> {
    /// let api = InterfaceDef::new("Api").method(MethodDef::new("ping").with(RequestLine::new("GET /ping")));
    /// let client = Client::builder().build(&api, "https://api.example.com")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Calls `method` with positional `args`, using the client's options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown method or a wrong argument count,
    /// and otherwise whatever the call failed with after retries (unless a fallback
    /// replaced the failure).
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Outcome> {
        self.dispatch(method, args, None)
    }

    /// Calls `method` with per-call connect and read timeouts and redirect policy.
    pub fn invoke_with_options(
        &self,
        method: &str,
        args: &[Value],
        options: Options,
    ) -> Result<Outcome> {
        self.dispatch(method, args, Some(options))
    }

    /// Calls `method` and deserializes the outcome into `T`.
    pub fn call<T: DeserializeOwned>(&self, method: &str, args: &[Value]) -> Result<T> {
        self.invoke(method, args)?.deserialize()
    }

    /// The parsed metadata of `method`.
    pub fn metadata(&self, method: &str) -> Option<&MethodMetadata> {
        self.inner
            .handlers
            .get(method)
            .map(|handler| &*handler.dispatch().metadata)
    }

    /// The names of the methods this client can call.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.inner.handlers.keys().map(String::as_str)
    }

    fn dispatch(&self, method: &str, args: &[Value], options: Option<Options>) -> Result<Outcome> {
        let handler = self.inner.handler(method)?;
        match (handler.invoke(args, options), &self.inner.fallback) {
            (Err(cause), Some(fallback)) => fallback.recover(method, args, cause),
            (result, _) => result,
        }
    }
}

impl AsyncClient {
    /// Calls `method` with positional `args`.
    ///
    /// # Errors
    ///
    /// See [`Client::invoke`].
    pub async fn invoke(&self, method: &str, args: &[Value]) -> Result<Outcome> {
        self.dispatch(method, args, None).await
    }

    /// Calls `method` with per-call options.
    pub async fn invoke_with_options(
        &self,
        method: &str,
        args: &[Value],
        options: Options,
    ) -> Result<Outcome> {
        self.dispatch(method, args, Some(options)).await
    }

    /// Calls `method` and deserializes the outcome into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, args: &[Value]) -> Result<T> {
        self.invoke(method, args).await?.deserialize()
    }

    /// Runs the call as a Tokio task.
    ///
    /// The returned [`PendingCall`] resolves to the call's result, or to
    /// [`Error::Cancelled`] if [`PendingCall::cancel`] was called first. Dropping it lets
    /// the call run to completion in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(&self, method: &str, args: Vec<Value>) -> PendingCall {
        let client = self.clone();
        let method = method.to_string();
        PendingCall {
            handle: tokio::spawn(async move { client.invoke(&method, &args).await }),
        }
    }

    /// The parsed metadata of `method`.
    pub fn metadata(&self, method: &str) -> Option<&MethodMetadata> {
        self.inner
            .handlers
            .get(method)
            .map(|handler| &*handler.dispatch().metadata)
    }

    /// The names of the methods this client can call.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.inner.handlers.keys().map(String::as_str)
    }

    async fn dispatch(
        &self,
        method: &str,
        args: &[Value],
        options: Option<Options>,
    ) -> Result<Outcome> {
        let handler = self.inner.handler(method)?;
        match (handler.invoke(args, options).await, &self.inner.fallback) {
            (Err(cause), Some(fallback)) => fallback.recover(method, args, cause),
            (result, _) => result,
        }
    }
}

/// A call running as a Tokio task.
#[derive(Debug)]
pub struct PendingCall {
    handle: tokio::task::JoinHandle<Result<Outcome>>,
}

impl PendingCall {
    /// Cancels the call. An in-flight exchange is abandoned and no retry is scheduled.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the call completed, failed or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingCall {
    type Output = Result<Outcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(e)) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

/// Builder for configuring and creating clients.
///
/// Every collaborator has a default: the default contract, a JSON encoder behind a form
/// encoder, the JSON decoder, the default error decoder, [`Backoff::default`], a
/// `tracing` logger at [`LogLevel::Basic`], and `reqwest` transports.
///
/// # Examples
///
/// ```no_run
/// use tether::interceptor::BasicAuthRequestInterceptor;
/// use tether::retry::Backoff;
/// use tether::{Client, InterfaceDef, Options};
/// use std::time::Duration;
///
/// # fn example(api: InterfaceDef) -> Result<(), tether::Error> {
/// let client = Client::builder()
///     .retryer(Backoff::new(Duration::from_millis(200), Duration::from_secs(5), 4).jitter(true))
///     .request_interceptor(BasicAuthRequestInterceptor::new("user", "secret"))
///     .options(Options::default().read_timeout(Duration::from_secs(10)))
///     .dismiss_404()
///     .build(&api, "https://api.example.com")?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    contract: Arc<dyn Contract>,
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    error_decoder: Arc<dyn ErrorDecoder>,
    retryer: Arc<dyn Retryer>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    logger: Arc<dyn Logger>,
    log_level: LogLevel,
    options: Options,
    dismiss_404: bool,
    propagation: PropagationPolicy,
    fallback: Option<FallbackSource>,
    transport: Option<Arc<dyn Transport>>,
    async_transport: Option<Arc<dyn AsyncTransport>>,
}

impl ClientBuilder {
    /// Creates a builder with every collaborator at its default.
    pub fn new() -> Self {
        Self {
            contract: Arc::new(default_contract()),
            encoder: Arc::new(FormEncoder::new(JsonEncoder)),
            decoder: Arc::new(JsonDecoder),
            error_decoder: Arc::new(DefaultErrorDecoder),
            retryer: Arc::new(Backoff::default()),
            interceptors: Vec::new(),
            logger: Arc::new(TracingLogger),
            log_level: LogLevel::default(),
            options: Options::default(),
            dismiss_404: false,
            propagation: PropagationPolicy::default(),
            fallback: None,
            transport: None,
            async_transport: None,
        }
    }

    /// Sets the contract used to parse the interface.
    pub fn contract(mut self, contract: impl Contract + 'static) -> Self {
        self.contract = Arc::new(contract);
        self
    }

    /// Sets the body encoder.
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    /// Sets the response decoder.
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Sets the decoder for unsuccessful responses.
    pub fn error_decoder(mut self, error_decoder: impl ErrorDecoder + 'static) -> Self {
        self.error_decoder = Arc::new(error_decoder);
        self
    }

    /// Sets the retryer prototype. Each call works on a fresh copy.
    pub fn retryer(mut self, retryer: impl Retryer + 'static) -> Self {
        self.retryer = Arc::new(retryer);
        self
    }

    /// Appends a request interceptor. Interceptors run in the order they were added.
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Sets the logger.
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Sets how much the logger records.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Sets the default timeouts and redirect policy.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Treats 404 responses as successful empty results instead of errors.
    pub fn dismiss_404(mut self) -> Self {
        self.dismiss_404 = true;
        self
    }

    /// Sets what a call fails with once retries are exhausted.
    pub fn propagation_policy(mut self, policy: PropagationPolicy) -> Self {
        self.propagation = policy;
        self
    }

    /// Recovers failed calls with `fallback`.
    pub fn fallback(mut self, fallback: impl Fallback + 'static) -> Self {
        self.fallback = Some(FallbackSource::Fixed(Arc::new(fallback)));
        self
    }

    /// Recovers failed calls with a fallback chosen per failure.
    pub fn fallback_factory(mut self, factory: impl FallbackFactory + 'static) -> Self {
        self.fallback = Some(FallbackSource::Factory(Arc::new(factory)));
        self
    }

    /// Sets the transport of blocking clients.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the transport of async clients.
    pub fn async_transport(mut self, transport: impl AsyncTransport + 'static) -> Self {
        self.async_transport = Some(Arc::new(transport));
        self
    }

    /// Builds a blocking client sending requests to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse, and [`Error::Contract`] if
    /// any method of `interface` is rejected by the contract.
    pub fn build(self, interface: &InterfaceDef, url: &str) -> Result<Client> {
        let target = HardCodedTarget::new(interface.name(), url)?;
        self.build_with_target(interface, target)
    }

    /// Builds a blocking client sending requests through `target`.
    pub fn build_with_target(
        mut self,
        interface: &InterfaceDef,
        target: impl Target + 'static,
    ) -> Result<Client> {
        let transport = self
            .transport
            .take()
            .unwrap_or_else(|| Arc::new(BlockingReqwestTransport::new()));
        let fallback = self.fallback.clone();
        let handlers = self
            .dispatches(interface, Arc::new(target))?
            .into_iter()
            .map(|(name, dispatch)| (name, SyncMethodHandler::new(dispatch, transport.clone())))
            .collect();

        Ok(Client {
            inner: Arc::new(ClientInner {
                name: interface.name().to_string(),
                handlers,
                fallback,
            }),
        })
    }

    /// Builds an async client sending requests to `url`.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn build_async(self, interface: &InterfaceDef, url: &str) -> Result<AsyncClient> {
        let target = HardCodedTarget::new(interface.name(), url)?;
        self.build_async_with_target(interface, target)
    }

    /// Builds an async client sending requests through `target`.
    pub fn build_async_with_target(
        mut self,
        interface: &InterfaceDef,
        target: impl Target + 'static,
    ) -> Result<AsyncClient> {
        let transport = self
            .async_transport
            .take()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let fallback = self.fallback.clone();
        let handlers = self
            .dispatches(interface, Arc::new(target))?
            .into_iter()
            .map(|(name, dispatch)| (name, AsyncMethodHandler::new(dispatch, transport.clone())))
            .collect();

        Ok(AsyncClient {
            inner: Arc::new(ClientInner {
                name: interface.name().to_string(),
                handlers,
                fallback,
            }),
        })
    }

    /// Parses the interface and wires everything but the transport, per method.
    fn dispatches(
        &self,
        interface: &InterfaceDef,
        target: Arc<dyn Target>,
    ) -> Result<Vec<(String, Dispatch)>> {
        let interceptors: Arc<[Arc<dyn RequestInterceptor>]> = self.interceptors.clone().into();
        let methods = self.contract.parse_and_validate(interface)?;

        tracing::debug!(
            interface = %interface.name(),
            url = %target.url(),
            methods = methods.len(),
            "Built client"
        );

        Ok(methods
            .into_iter()
            .map(|metadata| {
                let responses = ResponseHandler::new(
                    &metadata,
                    self.dismiss_404,
                    self.decoder.clone(),
                    self.error_decoder.clone(),
                    self.logger.clone(),
                    self.log_level,
                );
                let metadata = Arc::new(metadata);
                let dispatch = Dispatch {
                    factory: RequestFactory::new(metadata.clone(), self.encoder.clone()),
                    metadata: metadata.clone(),
                    target: target.clone(),
                    interceptors: interceptors.clone(),
                    retryer: self.retryer.clone(),
                    logger: self.logger.clone(),
                    level: self.log_level,
                    options: self.options,
                    propagation: self.propagation,
                    responses,
                };
                (metadata.method_name().to_string(), dispatch)
            })
            .collect())
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
