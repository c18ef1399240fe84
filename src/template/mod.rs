//! Request templates and the values used to resolve them.
//!
//! A [`RequestTemplate`] holds the shape of one HTTP request with `{name}` insertion
//! points in its path, query values, header values and body. Resolving it against a
//! [`Variables`] map produces a concrete template that can become a [`crate::Request`].

mod encoding;
pub(crate) mod expression;
mod request;

pub use request::RequestTemplate;

use std::collections::{HashMap, HashSet};

/// The expanded value of one template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// A single value.
    Single(String),
    /// Several values; a query or header made of just this variable repeats once per value.
    Multi(Vec<String>),
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Single(value)
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(values: Vec<String>) -> Self {
        TemplateValue::Multi(values)
    }
}

/// Values for template variables, keyed by variable name.
///
/// Names marked as encoded are inserted into the URL verbatim; everything else is
/// percent-encoded for the part of the URL it lands in.
///
/// # Examples
///
/// ```
/// use tether::template::{RequestTemplate, Variables};
/// use http::Method;
///
/// let mut template = RequestTemplate::new();
/// template.method(Method::GET).uri("/users/{id}?active={flag}");
///
/// let resolved = template.resolve(&Variables::new().with("id", "42"))?;
/// assert_eq!(resolved.path_and_query(), "/users/42");
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, TemplateValue>,
    encoded: HashSet<String>,
}

impl Variables {
    /// Creates an empty set of variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Sets the value of a variable that is already percent-encoded.
    pub fn insert_encoded(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        let name = name.into();
        self.encoded.insert(name.clone());
        self.values.insert(name, value.into());
    }

    /// Sets the value of a variable, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value of a variable.
    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    /// Returns `true` if the variable was inserted as already encoded.
    pub fn is_encoded(&self, name: &str) -> bool {
        self.encoded.contains(name)
    }

    /// Returns `true` if no variables are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How a query parameter with several values is written into the URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionFormat {
    /// The name is repeated for each value: `foo=bar&foo=baz`.
    #[default]
    Exploded,
    /// Comma separated: `foo=bar,baz`.
    Csv,
    /// Space separated: `foo=bar%20baz`.
    Ssv,
    /// Tab separated: `foo=bar%09baz`.
    Tsv,
    /// Pipe separated: `foo=bar%7Cbaz`.
    Pipes,
}

impl CollectionFormat {
    fn separator(self) -> Option<&'static str> {
        match self {
            CollectionFormat::Exploded => None,
            CollectionFormat::Csv => Some(","),
            CollectionFormat::Ssv => Some("%20"),
            CollectionFormat::Tsv => Some("%09"),
            CollectionFormat::Pipes => Some("%7C"),
        }
    }
}
