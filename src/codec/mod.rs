//! Body encoding, response decoding and error classification.
//!
//! These are the collaborators a client hands request bodies and responses to. The
//! defaults speak JSON and url-encoded forms; plug in your own by implementing
//! [`Encoder`], [`Decoder`] or [`ErrorDecoder`].

mod decoder;
mod encoder;
mod error_decoder;

pub use decoder::JsonDecoder;
pub use encoder::{FormEncoder, JsonEncoder};
pub use error_decoder::{DefaultErrorDecoder, RetryOnStatus};

use crate::metadata::{BodyType, ReturnShape};
use crate::template::RequestTemplate;
use crate::{Error, Response, Result};
use serde_json::Value;

/// Writes a body argument into a request template.
pub trait Encoder: Send + Sync {
    /// Encodes `value` as the body of `template`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be serialized.
    fn encode(&self, value: &Value, body_type: BodyType, template: &mut RequestTemplate) -> Result<()>;
}

/// Materializes a successful response into a value.
pub trait Decoder: Send + Sync {
    /// Decodes the body of `response` into the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body cannot be read or parsed. A decoder may return
    /// [`Error::Retryable`] to ask for another attempt.
    fn decode(&self, response: &mut Response, shape: ReturnShape) -> Result<Value>;
}

/// Turns an unsuccessful response into the error a call fails with.
pub trait ErrorDecoder: Send + Sync {
    /// Builds the error for `response`, returned by the method identified by `config_key`.
    fn decode(&self, config_key: &str, response: &mut Response) -> Error;
}
