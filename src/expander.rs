//! Conversion of argument values into template strings.

use serde_json::Value;
use std::fmt;

/// Turns one argument value into its template representation.
///
/// Returning `None` means the value is absent: the query parameter or header that
/// references it is dropped.
pub trait Expander: Send + Sync + fmt::Debug {
    /// Expands a single (non-array) value.
    fn expand(&self, value: &Value) -> Option<String>;
}

/// Renders strings, numbers and booleans as text and `null` as absent.
///
/// Objects are rendered as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToStringExpander;

impl Expander for ToStringExpander {
    fn expand(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// An expander backed by a closure.
///
/// # Examples
///
/// ```
/// use tether::expander::{Expander, FnExpander};
/// use serde_json::json;
///
/// let upper = FnExpander::new(|v| v.as_str().map(str::to_uppercase));
/// assert_eq!(upper.expand(&json!("abc")), Some("ABC".to_string()));
/// ```
pub struct FnExpander<F> {
    f: F,
}

impl<F> FnExpander<F>
where
    F: Fn(&Value) -> Option<String> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Expander for FnExpander<F>
where
    F: Fn(&Value) -> Option<String> + Send + Sync,
{
    fn expand(&self, value: &Value) -> Option<String> {
        (self.f)(value)
    }
}

impl<F> fmt::Debug for FnExpander<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExpander")
    }
}

/// Falls back to a fixed string when the argument is `null`.
///
/// The fallback is used verbatim; the wrapped expander only sees non-null values.
#[derive(Debug)]
pub struct DefaultValueExpander {
    default: String,
    delegate: std::sync::Arc<dyn Expander>,
}

impl DefaultValueExpander {
    /// Wraps `delegate` with a fallback value.
    pub fn new(default: impl Into<String>, delegate: std::sync::Arc<dyn Expander>) -> Self {
        Self {
            default: default.into(),
            delegate,
        }
    }
}

impl Expander for DefaultValueExpander {
    fn expand(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            Some(self.default.clone())
        } else {
            self.delegate.expand(value)
        }
    }
}
