//! # Tether - Declarative HTTP clients
//!
//! Tether turns a description of an HTTP API into a working client. Describe each method
//! once (its verb, path template, headers, parameters and return shape) and call it by
//! name; tether builds the request, runs it through a pluggable transport, retries
//! transient failures, and decodes the response.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tether::contract::{Param, RequestLine};
//! use tether::{Client, InterfaceDef, MethodDef, ParamDef, ReturnShape};
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Deserialize)]
//! struct Contributor {
//!     login: String,
//!     contributions: u32,
//! }
//!
//! fn main() -> Result<(), tether::Error> {
//!     // Describe the API
//!     let github = InterfaceDef::new("GitHub").method(
//!         MethodDef::new("contributors")
//!             .with(RequestLine::new("GET /repos/{owner}/{repo}/contributors"))
//!             .param(ParamDef::new("owner").with(Param::new("owner")))
//!             .param(ParamDef::new("repo").with(Param::new("repo")))
//!             .returns(ReturnShape::List),
//!     );
//!
//!     // Build a client for it
//!     let client = Client::builder().build(&github, "https://api.github.com")?;
//!
//!     // Call it
//!     let contributors: Vec<Contributor> =
//!         client.call("contributors", &[json!("rust-lang"), json!("rust")])?;
//!     for contributor in contributors {
//!         println!("{} ({})", contributor.login, contributor.contributions);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Contracts** - Pluggable annotation vocabularies; a default one and a JAX-RS style one are included
//! - **Request templates** - `{name}` expressions in paths, queries, headers and bodies, encoded per URL part
//! - **Build-time validation** - Ambiguous verbs, unbound variables and conflicting bodies fail before any call
//! - **Retries** - Per-call backoff honoring `Retry-After`, with attempt limits and deadlines
//! - **Interceptors** - Re-run before every attempt, so signatures and timestamps stay fresh
//! - **Rich error handling** - Status errors keep the raw body, headers and the calling method
//! - **Blocking and async** - `reqwest`-backed transports for both, with cancellation of async calls
//! - **Streaming** - Line streams and raw responses that hand body ownership to the caller
//! - **Automatic logging** - Structured logging with `tracing`
//!
//! ## Error Handling
//!
//! Every failure is a variant of [`Error`]:
//!
//! ```no_run
//! use tether::{Client, Error};
//! use serde_json::json;
//!
//! # fn example(client: Client) {
//! match client.invoke("contributors", &[json!("rust-lang"), json!("rust")]) {
//!     Ok(outcome) => println!("Success: {:?}", outcome),
//!     Err(Error::Status { status, raw_response, config_key, .. }) => {
//!         eprintln!("{} returned {}: {}", config_key, status, raw_response);
//!     }
//!     Err(Error::Decode { raw_response, message, .. }) => {
//!         eprintln!("Failed to decode {}: {}", raw_response, message);
//!     }
//!     Err(e) if e.is_retryable() => eprintln!("Gave up retrying: {}", e),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```
//!
//! ## Retries
//!
//! ```no_run
//! use tether::codec::{DefaultErrorDecoder, RetryOnStatus};
//! use tether::retry::Backoff;
//! use tether::{Client, InterfaceDef};
//! use http::StatusCode;
//! use std::time::Duration;
//!
//! # fn example(api: InterfaceDef) -> Result<(), tether::Error> {
//! let client = Client::builder()
//!     .retryer(
//!         Backoff::new(Duration::from_millis(100), Duration::from_secs(30), 5)
//!             .jitter(true)
//!             .deadline(Duration::from_secs(60)),
//!     )
//!     .error_decoder(RetryOnStatus::new(
//!         DefaultErrorDecoder,
//!         [StatusCode::SERVICE_UNAVAILABLE],
//!     ))
//!     .build(&api, "https://api.example.com")?;
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
pub mod codec;
pub mod contract;
mod error;
pub mod expander;
pub mod fallback;
mod handler;
pub mod interceptor;
pub mod logger;
pub mod metadata;
pub mod mock;
mod request;
mod response;
pub mod retry;
pub mod target;
pub mod template;
pub mod transport;

pub use api::{AnnotatedMember, Annotation, InterfaceDef, Member, MethodDef, ParamDef};
pub use client::{AsyncClient, Client, ClientBuilder, PendingCall};
pub use error::{Error, Result};
pub use handler::Outcome;
pub use metadata::{BodyType, MethodMetadata, ReturnShape};
pub use request::{Options, Request};
pub use response::{Body, BodySource, Lines, Response, ResponseBuilder};
