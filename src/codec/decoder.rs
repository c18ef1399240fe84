use super::Decoder;
use crate::metadata::ReturnShape;
use crate::{Error, Response, Result};
use http::StatusCode;
use serde_json::Value;

/// Parses JSON bodies with `serde_json`.
///
/// An empty body, a 204 and a 404 all decode to the shape's empty value, so a missing
/// list is `[]` rather than an error. Parse failures keep the raw body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, response: &mut Response, shape: ReturnShape) -> Result<Value> {
        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(shape.empty_value());
        }

        let bytes = response.bytes().map_err(|e| Error::Decode {
            status,
            raw_response: String::new(),
            message: format!("failed to read response body: {}", e),
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(shape.empty_value());
        }

        let decode_error = |message: String| Error::Decode {
            status,
            raw_response: String::from_utf8_lossy(&bytes).into_owned(),
            message,
        };

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| decode_error(e.to_string()))?;
        match (shape, &value) {
            (ReturnShape::List, Value::Array(_)) | (ReturnShape::List, Value::Null) => {}
            (ReturnShape::List, other) => {
                return Err(decode_error(format!("expected a JSON array, got {}", kind(other))))
            }
            (ReturnShape::Map, Value::Object(_)) | (ReturnShape::Map, Value::Null) => {}
            (ReturnShape::Map, other) => {
                return Err(decode_error(format!("expected a JSON object, got {}", kind(other))))
            }
            _ => {}
        }

        if value.is_null() {
            return Ok(shape.empty_value());
        }
        Ok(value)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
