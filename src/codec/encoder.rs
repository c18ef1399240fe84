use super::Encoder;
use crate::metadata::BodyType;
use crate::template::RequestTemplate;
use crate::{Error, Result};
use serde_json::Value;

/// Serializes bodies with `serde_json`.
///
/// `Text` bodies are written as-is and `Bytes` bodies must be strings or arrays of byte
/// values. JSON bodies get `Content-Type: application/json` unless the template already
/// has a content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, value: &Value, body_type: BodyType, template: &mut RequestTemplate) -> Result<()> {
        match body_type {
            BodyType::Json => {
                let bytes = serde_json::to_vec(value).map_err(|e| Error::Encode(e.to_string()))?;
                if template.header_values("Content-Type").is_none() {
                    template.header("Content-Type", ["application/json"]);
                }
                template.body(bytes);
            }
            BodyType::Text => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                template.body(text.into_bytes());
            }
            BodyType::Bytes => {
                template.body(bytes_of(value)?);
            }
            BodyType::Form => {
                return Err(Error::Encode(
                    "form bodies need a FormEncoder".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn bytes_of(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.clone().into_bytes()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| Error::Encode(format!("{} is not a byte", item)))
            })
            .collect(),
        other => Err(Error::Encode(format!(
            "expected a string or byte array body, got {}",
            other
        ))),
    }
}

/// Url-encodes form bodies and hands everything else to a delegate.
///
/// Form fields with a `null` value are skipped; arrays repeat the field name.
#[derive(Debug, Clone, Default)]
pub struct FormEncoder<E = super::JsonEncoder> {
    delegate: E,
}

impl<E: Encoder> FormEncoder<E> {
    /// Wraps `delegate`.
    pub fn new(delegate: E) -> Self {
        Self { delegate }
    }
}

impl<E: Encoder> Encoder for FormEncoder<E> {
    fn encode(&self, value: &Value, body_type: BodyType, template: &mut RequestTemplate) -> Result<()> {
        if body_type != BodyType::Form {
            return self.delegate.encode(value, body_type, template);
        }

        let fields = value.as_object().ok_or_else(|| {
            Error::Encode(format!("form body must be an object, got {}", value))
        })?;

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in fields {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter().filter(|item| !item.is_null()) {
                        serializer.append_pair(name, &plain(item));
                    }
                }
                other => {
                    serializer.append_pair(name, &plain(other));
                }
            }
        }

        if template.header_values("Content-Type").is_none() {
            template.header(
                "Content-Type",
                [format!("application/x-www-form-urlencoded; charset={}", template.charset())],
            );
        }
        template.body(serializer.finish().into_bytes());
        Ok(())
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
