//! Per-method dispatch: argument expansion, response handling and the retry loops.
//!
//! Every interface method gets one handler when the client is built. A call walks the
//! same states each attempt: build the request from the arguments, run the interceptors,
//! execute it, then decode the response or classify the failure. Retryable failures loop
//! back to building, with a fresh template, until the call's retryer says stop.

mod asynchronous;
mod sync;

pub(crate) use asynchronous::AsyncMethodHandler;
pub(crate) use sync::SyncMethodHandler;

use crate::codec::{Decoder, Encoder, ErrorDecoder};
use crate::expander::{Expander, ToStringExpander};
use crate::interceptor::RequestInterceptor;
use crate::logger::{LogLevel, Logger};
use crate::metadata::{BodyType, MethodMetadata, ReturnShape};
use crate::response::Lines;
use crate::retry::{PropagationPolicy, Retryer};
use crate::target::Target;
use crate::template::{RequestTemplate, TemplateValue, Variables};
use crate::{Body, Error, Options, Request, Response, Result};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// The result of invoking an interface method.
///
/// Which variant comes back is fixed by the method's [`ReturnShape`]: `Unit` for
/// [`ReturnShape::Unit`], `Value` for the decoded shapes, and so on.
///
/// # Examples
///
/// ```
/// use tether::Outcome;
/// use serde_json::json;
///
/// let outcome = Outcome::Value(json!([1, 2, 3]));
/// let numbers: Vec<u32> = outcome.deserialize()?;
/// assert_eq!(numbers, [1, 2, 3]);
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug)]
pub enum Outcome {
    /// The method returns nothing.
    Unit,
    /// A decoded body, or the shape's empty value.
    Value(Value),
    /// The body as text.
    Text(String),
    /// The body as bytes.
    Bytes(Vec<u8>),
    /// The raw response. The caller owns and closes its body.
    Response(Response),
    /// A lazy line stream. The caller owns it; the body closes when it is exhausted or
    /// dropped.
    Stream(Lines),
}

impl Outcome {
    /// Converts the outcome into a typed value with `serde`.
    ///
    /// `Unit` deserializes from `null`, `Text` from a JSON string and `Bytes` from an
    /// array of numbers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the value does not fit `T`, and
    /// [`Error::Configuration`] for raw responses and streams, which carry no value.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.into_value()?;
        serde_json::from_value(value.clone()).map_err(|e| {
            tracing::error!(error = %e, "Failed to deserialize response");
            Error::Decode {
                status: StatusCode::OK,
                raw_response: value.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Converts the outcome into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for raw responses and streams.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Outcome::Unit => Ok(Value::Null),
            Outcome::Value(value) => Ok(value),
            Outcome::Text(text) => Ok(Value::String(text)),
            Outcome::Bytes(bytes) => Ok(Value::Array(bytes.into_iter().map(Value::from).collect())),
            Outcome::Response(_) => Err(Error::Configuration(
                "a raw response has no decoded value".to_string(),
            )),
            Outcome::Stream(_) => Err(Error::Configuration(
                "a stream has no decoded value".to_string(),
            )),
        }
    }

    /// Returns the raw response, if this is one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Returns the line stream, if this is one.
    pub fn into_stream(self) -> Option<Lines> {
        match self {
            Outcome::Stream(lines) => Some(lines),
            _ => None,
        }
    }

    /// Returns the text, if this is a text outcome.
    pub fn into_text(self) -> Option<String> {
        match self {
            Outcome::Text(text) => Some(text),
            _ => None,
        }
    }
}

static NULL: Value = Value::Null;

/// Builds the resolved template of one attempt from the call's arguments.
pub(crate) struct RequestFactory {
    metadata: Arc<MethodMetadata>,
    encoder: Arc<dyn Encoder>,
}

impl RequestFactory {
    pub(crate) fn new(metadata: Arc<MethodMetadata>, encoder: Arc<dyn Encoder>) -> Self {
        Self { metadata, encoder }
    }

    pub(crate) fn create(&self, args: &[Value]) -> Result<RequestTemplate> {
        let metadata = &*self.metadata;
        if args.len() != metadata.param_count() {
            return Err(Error::Configuration(format!(
                "{} takes {} argument(s) but {} were supplied",
                metadata.config_key(),
                metadata.param_count(),
                args.len()
            )));
        }

        let mut variables = Variables::new();
        for (&index, names) in metadata.index_to_name() {
            let value = self.argument(index, args);
            let Some(expanded) = self.expand(index, value) else {
                continue;
            };
            for name in names {
                if metadata.is_encoded(index) {
                    variables.insert_encoded(name.as_str(), expanded.clone());
                } else {
                    variables.insert(name.as_str(), expanded.clone());
                }
            }
        }

        let mut template = metadata.template().resolve(&variables)?;

        if let Some(index) = metadata.query_map_index() {
            self.merge_query_map(&mut template, self.argument(index, args))?;
        }
        if let Some(index) = metadata.header_map_index() {
            self.merge_header_map(&mut template, self.argument(index, args))?;
        }

        if let Some(index) = metadata.body_index() {
            let body = self.argument(index, args);
            if body.is_null() {
                return Err(Error::Configuration(format!(
                    "Body parameter {} of {} was null",
                    index,
                    metadata.config_key()
                )));
            }
            self.encoder.encode(body, metadata.body_type(), &mut template)?;
        } else if !metadata.form_params().is_empty() {
            let form = self.form_fields(args);
            self.encoder
                .encode(&Value::Object(form), BodyType::Form, &mut template)?;
        }

        Ok(template)
    }

    /// The value at a position, reading bean members out of their owning argument.
    fn argument<'a>(&self, index: usize, args: &'a [Value]) -> &'a Value {
        match self.metadata.bean_member(index) {
            Some((owner, member)) => args
                .get(owner)
                .and_then(|owner| owner.get(member))
                .unwrap_or(&NULL),
            None => args.get(index).unwrap_or(&NULL),
        }
    }

    fn expand(&self, index: usize, value: &Value) -> Option<TemplateValue> {
        let expander: &dyn Expander = match self.metadata.expander(index) {
            Some(expander) => expander.as_ref(),
            None => &ToStringExpander,
        };
        match value {
            Value::Array(items) => Some(TemplateValue::Multi(
                items.iter().filter_map(|item| expander.expand(item)).collect(),
            )),
            other => expander.expand(other).map(TemplateValue::Single),
        }
    }

    fn merge_query_map(&self, template: &mut RequestTemplate, map: &Value) -> Result<()> {
        let Some(entries) = map_argument(map, "QueryMap", &self.metadata)? else {
            return Ok(());
        };
        for (name, value) in entries {
            let values = plain_values(value);
            if values.is_empty() {
                continue;
            }
            if self.metadata.query_map_encoded() {
                template.query_encoded(name, values);
            } else {
                template.query(name, values);
            }
        }
        Ok(())
    }

    fn merge_header_map(&self, template: &mut RequestTemplate, map: &Value) -> Result<()> {
        let Some(entries) = map_argument(map, "HeaderMap", &self.metadata)? else {
            return Ok(());
        };
        for (name, value) in entries {
            let values = plain_values(value);
            if !values.is_empty() {
                template.header(name, values);
            }
        }
        Ok(())
    }

    fn form_fields(&self, args: &[Value]) -> Map<String, Value> {
        let mut form = Map::new();
        for (&index, names) in self.metadata.index_to_name() {
            let value = self.argument(index, args);
            if value.is_null() {
                continue;
            }
            for name in names {
                if self.metadata.form_params().contains(name) {
                    form.insert(name.clone(), value.clone());
                }
            }
        }
        form
    }
}

fn map_argument<'a>(
    value: &'a Value,
    what: &str,
    metadata: &MethodMetadata,
) -> Result<Option<&'a Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(entries) => Ok(Some(entries)),
        other => Err(Error::Configuration(format!(
            "{} argument of {} must be an object, got {}",
            what,
            metadata.config_key(),
            other
        ))),
    }
}

fn plain_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| ToStringExpander.expand(item))
            .collect(),
        other => ToStringExpander.expand(other).into_iter().collect(),
    }
}

/// Turns a received response into the call's outcome or failure.
///
/// The response body is closed on every path, except when ownership passes to the caller
/// as a raw response or a line stream.
pub(crate) struct ResponseHandler {
    config_key: String,
    shape: ReturnShape,
    dismiss_404: bool,
    decoder: Arc<dyn Decoder>,
    error_decoder: Arc<dyn ErrorDecoder>,
    logger: Arc<dyn Logger>,
    level: LogLevel,
}

impl ResponseHandler {
    pub(crate) fn new(
        metadata: &MethodMetadata,
        dismiss_404: bool,
        decoder: Arc<dyn Decoder>,
        error_decoder: Arc<dyn ErrorDecoder>,
        logger: Arc<dyn Logger>,
        level: LogLevel,
    ) -> Self {
        Self {
            config_key: metadata.config_key().to_string(),
            shape: metadata.return_shape(),
            dismiss_404,
            decoder,
            error_decoder,
            logger,
            level,
        }
    }

    pub(crate) fn handle(&self, response: Response, elapsed: Duration) -> Result<Outcome> {
        let status = response.status();
        let mut response = self
            .logger
            .log_and_rebuffer_response(&self.config_key, self.level, response, elapsed)
            .map_err(|e| read_error(status, e))?;

        if self.shape == ReturnShape::Response {
            return response
                .buffer_if_small()
                .map(Outcome::Response)
                .map_err(|e| read_error(status, e));
        }

        let result = if status.is_success() {
            self.decode(&mut response, status)
        } else if status == StatusCode::NOT_FOUND && self.dismiss_404 {
            self.dismissed(&mut response)
        } else {
            Err(self.error_decoder.decode(&self.config_key, &mut response))
        };
        response.close();
        result
    }

    fn decode(&self, response: &mut Response, status: StatusCode) -> Result<Outcome> {
        match self.shape {
            ReturnShape::Unit => Ok(Outcome::Unit),
            ReturnShape::Text => response
                .text()
                .map(Outcome::Text)
                .map_err(|e| read_error(status, e)),
            ReturnShape::Bytes => response
                .bytes()
                .map(Outcome::Bytes)
                .map_err(|e| read_error(status, e)),
            ReturnShape::Stream => {
                let body = response
                    .take_body()
                    .unwrap_or_else(|| Body::from_bytes(Vec::new()));
                Ok(Outcome::Stream(Lines::new(body)))
            }
            shape => self.decoder.decode(response, shape).map(Outcome::Value),
        }
    }

    fn dismissed(&self, response: &mut Response) -> Result<Outcome> {
        match self.shape {
            ReturnShape::Unit => Ok(Outcome::Unit),
            ReturnShape::Text => Ok(Outcome::Text(String::new())),
            ReturnShape::Bytes => Ok(Outcome::Bytes(Vec::new())),
            ReturnShape::Stream => Ok(Outcome::Stream(Lines::new(Body::from_bytes(Vec::new())))),
            shape => self.decoder.decode(response, shape).map(Outcome::Value),
        }
    }
}

fn read_error(status: StatusCode, error: io::Error) -> Error {
    Error::Decode {
        status,
        raw_response: String::new(),
        message: format!("failed to read response body: {}", error),
    }
}

/// Everything one method's handler needs apart from the transport.
pub(crate) struct Dispatch {
    pub(crate) metadata: Arc<MethodMetadata>,
    pub(crate) factory: RequestFactory,
    pub(crate) target: Arc<dyn Target>,
    pub(crate) interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
    pub(crate) retryer: Arc<dyn Retryer>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) level: LogLevel,
    pub(crate) options: Options,
    pub(crate) propagation: PropagationPolicy,
    pub(crate) responses: ResponseHandler,
}

impl Dispatch {
    /// Builds and intercepts the request of one attempt.
    fn prepare(&self, args: &[Value]) -> Result<Request> {
        let mut template = self.factory.create(args)?;
        for interceptor in self.interceptors.iter() {
            interceptor.apply(&mut template);
        }
        let request = self.target.apply(&mut template)?;
        self.logger
            .log_request(self.metadata.config_key(), self.level, &request);
        Ok(request)
    }

    fn config_key(&self) -> &str {
        self.metadata.config_key()
    }
}
