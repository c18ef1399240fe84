//! The default annotation vocabulary.

use super::{check_not_empty, contract_error, with_warnings, DeclarativeContract};
use crate::expander::Expander;
use crate::metadata::MethodMetadata;
use crate::template::CollectionFormat;
use crate::Result;
use http::Method;
use std::sync::Arc;

/// The HTTP verb and path of a method, e.g. `GET /repos/{owner}/{repo}?page={page}`.
#[derive(Debug, Clone)]
pub struct RequestLine {
    line: String,
    decode_slash: bool,
    collection_format: CollectionFormat,
}

impl RequestLine {
    /// Creates a request line. Encoded slashes in path values are restored by default.
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            decode_slash: true,
            collection_format: CollectionFormat::default(),
        }
    }

    /// Controls whether `%2F` in expanded path values is turned back into `/`.
    pub fn decode_slash(mut self, decode: bool) -> Self {
        self.decode_slash = decode;
        self
    }

    /// Sets how multi-valued query parameters are serialized.
    pub fn collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = format;
        self
    }
}

/// Header lines such as `Accept: application/json`.
///
/// On an interface the headers apply to every method. On a method they replace interface
/// headers of the same name.
#[derive(Debug, Clone)]
pub struct Headers(Vec<String>);

impl Headers {
    /// Creates a header set from `Name: value` lines.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(lines.into_iter().map(Into::into).collect())
    }
}

/// A body template, e.g. `%7B"user": "{user}"%7D`.
#[derive(Debug, Clone)]
pub struct Body(pub String);

impl Body {
    /// Creates a body template.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }
}

/// Binds a parameter to a template variable.
///
/// A name that does not appear in the request line, headers or body template becomes a
/// form field.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    expander: Option<Arc<dyn Expander>>,
    encoded: bool,
}

impl Param {
    /// Binds the parameter to the variable `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expander: None,
            encoded: false,
        }
    }

    /// Uses a custom expander for the argument.
    pub fn expander(mut self, expander: impl Expander + 'static) -> Self {
        self.expander = Some(Arc::new(expander));
        self
    }

    /// Marks the argument as already percent-encoded.
    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }
}

/// A map argument whose entries become query parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMap {
    encoded: bool,
}

impl QueryMap {
    /// Creates a query map whose entries are percent-encoded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the entries as already percent-encoded.
    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }
}

/// A map argument whose entries become headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderMap;

const VERBS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
    Method::TRACE,
    Method::CONNECT,
];

/// Splits `VERB rest` where the verb is a run of uppercase ASCII letters.
fn split_request_line(line: &str) -> Option<(Method, &str)> {
    let end = line
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(line.len());
    if end == 0 {
        return None;
    }
    let verb = VERBS
        .iter()
        .find(|verb| verb.as_str() == &line[..end])?
        .clone();
    Some((verb, line[end..].trim_start_matches(' ')))
}

/// Parses `Name: value` lines into ordered (name, values) groups.
fn header_groups(lines: &[String], data: &MethodMetadata) -> Result<Vec<(String, Vec<String>)>> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            contract_error(
                data,
                format!("Header '{}' on {} has no ':'", line, data.config_key()),
            )
        })?;
        let value = value.trim().to_string();
        match groups.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, values)) => values.push(value),
            None => groups.push((name.to_string(), vec![value])),
        }
    }
    Ok(groups)
}

/// The default vocabulary: [`RequestLine`], [`Headers`], [`Body`], [`Param`],
/// [`QueryMap`] and [`HeaderMap`].
///
/// # Examples
///
/// ```
/// use tether::contract::{default_contract, Contract, Headers, Param, RequestLine};
/// use tether::{InterfaceDef, MethodDef, ParamDef};
///
/// let api = InterfaceDef::new("Users")
///     .with(Headers::new(["Accept: application/json"]))
///     .method(
///         MethodDef::new("get")
///             .with(RequestLine::new("GET /users/{id}?active={flag}"))
///             .param(ParamDef::new("id").with(Param::new("id")))
///             .param(ParamDef::new("flag").with(Param::new("flag"))),
///     );
///
/// let methods = default_contract().parse_and_validate(&api)?;
/// assert_eq!(methods[0].config_key(), "Users#get(id,flag)");
/// assert_eq!(methods[0].template().header_values("accept").unwrap(), ["application/json"]);
/// # Ok::<(), tether::Error>(())
/// ```
pub fn default_contract() -> DeclarativeContract {
    DeclarativeContract::new("Default")
        .register_class_annotation(|headers: &Headers, data| {
            if headers.0.is_empty() {
                return Err(contract_error(
                    data,
                    format!("Headers annotation was empty on type {}", data.config_key()),
                ));
            }
            for (name, values) in header_groups(&headers.0, data)? {
                if data.template().header_values(&name).is_none() {
                    data.template_mut().header(&name, values);
                }
            }
            Ok(())
        })
        .register_method_annotation(|line: &RequestLine, data| {
            check_not_empty(&line.line, "RequestLine annotation", data)?;
            let (verb, uri) = split_request_line(&line.line).ok_or_else(|| {
                contract_error(
                    data,
                    format!(
                        "RequestLine annotation didn't start with an HTTP verb on method {}",
                        data.config_key()
                    ),
                )
            })?;
            data.set_http_method(verb)
                .map_err(|e| with_warnings(data, e))?;
            data.template_mut()
                .uri(uri)
                .decode_slash(line.decode_slash)
                .collection_format(line.collection_format);
            Ok(())
        })
        .register_method_annotation(|body: &Body, data| {
            check_not_empty(&body.0, "Body annotation", data)?;
            if body.0.contains('{') {
                data.template_mut().body_template(body.0.clone());
            } else {
                data.template_mut().body(body.0.clone().into_bytes());
            }
            Ok(())
        })
        .register_method_annotation(|headers: &Headers, data| {
            if headers.0.is_empty() {
                return Err(contract_error(
                    data,
                    format!("Headers annotation was empty on method {}", data.config_key()),
                ));
            }
            for (name, values) in header_groups(&headers.0, data)? {
                data.template_mut().set_header(&name, values);
            }
            Ok(())
        })
        .register_parameter_annotation(|param: &Param, data, index| {
            check_not_empty(&param.name, "Param annotation", data)?;
            data.name_param(index, param.name.clone());
            if let Some(expander) = &param.expander {
                data.set_expander(index, expander.clone());
            }
            if param.encoded {
                data.mark_encoded(index);
            }
            if !data.template().has_variable(&param.name) {
                data.add_form_param(param.name.clone());
            }
            Ok(())
        })
        .register_parameter_annotation(|query_map: &QueryMap, data, index| {
            data.set_query_map(index, query_map.encoded)
                .map_err(|e| with_warnings(data, e))
        })
        .register_parameter_annotation(|_: &HeaderMap, data, index| {
            data.set_header_map(index)
                .map_err(|e| with_warnings(data, e))
        })
}
