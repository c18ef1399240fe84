//! Per-method metadata produced by a contract.

use crate::expander::Expander;
use crate::template::RequestTemplate;
use crate::{Error, Result};
use http::Method;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// The shape of a method's return value.
///
/// The shape is fixed when the contract is parsed and picks the decode strategy for
/// every call of the method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnShape {
    /// Nothing is returned; the body is never decoded.
    #[default]
    Unit,
    /// A single decoded value.
    Value,
    /// A decoded sequence; an empty body yields an empty list.
    List,
    /// A decoded object; an empty body yields an empty map.
    Map,
    /// A value that may be absent; an empty body yields `null`.
    Optional,
    /// The body as text.
    Text,
    /// The body as raw bytes.
    Bytes,
    /// The raw response. Small bodies are buffered, larger ones stay open for the caller.
    Response,
    /// A lazy line stream that owns the body and closes it when exhausted or dropped.
    Stream,
}

impl ReturnShape {
    /// The value produced for an empty body, a 204, or a dismissed 404.
    pub fn empty_value(self) -> Value {
        match self {
            ReturnShape::List => Value::Array(Vec::new()),
            ReturnShape::Map => Value::Object(serde_json::Map::new()),
            ReturnShape::Text => Value::String(String::new()),
            _ => Value::Null,
        }
    }

    /// Returns `true` if a JSON decoder materializes this shape.
    pub fn is_decoded(self) -> bool {
        matches!(
            self,
            ReturnShape::Value | ReturnShape::List | ReturnShape::Map | ReturnShape::Optional
        )
    }
}

/// How a body parameter is written into the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyType {
    /// Serialized as JSON.
    #[default]
    Json,
    /// A string written as-is.
    Text,
    /// An array of byte values written as-is.
    Bytes,
    /// A map of form fields, url-encoded.
    Form,
}

/// Everything a contract learned about one method.
///
/// Metadata is built once per method while a client is built and then shared read-only by
/// every call. The mutating methods exist for contract handlers; nothing calls them after
/// the contract returns.
#[derive(Clone)]
pub struct MethodMetadata {
    config_key: String,
    method_name: String,
    param_count: usize,
    return_shape: ReturnShape,
    template: RequestTemplate,
    index_to_name: BTreeMap<usize, Vec<String>>,
    index_to_expander: HashMap<usize, Arc<dyn Expander>>,
    encoded: BTreeSet<usize>,
    all_encoded: bool,
    body_index: Option<usize>,
    body_type: BodyType,
    form_params: Vec<String>,
    query_map_index: Option<usize>,
    query_map_encoded: bool,
    header_map_index: Option<usize>,
    ignored: BTreeSet<usize>,
    bean_members: BTreeMap<usize, (usize, String)>,
    warnings: Vec<String>,
}

impl MethodMetadata {
    /// Creates empty metadata for a method.
    pub fn new(config_key: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            config_key: config_key.into(),
            method_name: method_name.into(),
            param_count: 0,
            return_shape: ReturnShape::Unit,
            template: RequestTemplate::new(),
            index_to_name: BTreeMap::new(),
            index_to_expander: HashMap::new(),
            encoded: BTreeSet::new(),
            all_encoded: false,
            body_index: None,
            body_type: BodyType::Json,
            form_params: Vec::new(),
            query_map_index: None,
            query_map_encoded: false,
            header_map_index: None,
            ignored: BTreeSet::new(),
            bean_members: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// The configuration key, e.g. `GitHub#contributors(owner,repo)`.
    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    /// The method name used for dispatch.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The number of declared parameters.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub(crate) fn set_param_count(&mut self, count: usize) {
        self.param_count = count;
    }

    /// The declared return shape.
    pub fn return_shape(&self) -> ReturnShape {
        self.return_shape
    }

    pub(crate) fn set_return_shape(&mut self, shape: ReturnShape) {
        self.return_shape = shape;
    }

    /// The request template skeleton.
    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    /// Mutable access to the template skeleton, for contract handlers.
    pub fn template_mut(&mut self) -> &mut RequestTemplate {
        &mut self.template
    }

    /// Sets the HTTP method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] if a method was already set, even the same one.
    pub fn set_http_method(&mut self, method: Method) -> Result<()> {
        if let Some(existing) = self.template.http_method() {
            return Err(Error::Contract(format!(
                "Method {} contains multiple HTTP methods. Found: [{}, {}]",
                self.config_key, existing, method
            )));
        }
        self.template.method(method);
        Ok(())
    }

    /// Binds a template variable name to an argument position.
    pub fn name_param(&mut self, index: usize, name: impl Into<String>) {
        let names = self.index_to_name.entry(index).or_default();
        let name = name.into();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    /// Argument positions and the variable names bound to them.
    pub fn index_to_name(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.index_to_name
    }

    /// Returns `true` if some argument is bound to the variable `name`.
    pub fn is_bound(&self, name: &str) -> bool {
        self.index_to_name
            .values()
            .any(|names| names.iter().any(|bound| bound == name))
    }

    /// Sets the expander for an argument position.
    pub fn set_expander(&mut self, index: usize, expander: Arc<dyn Expander>) {
        self.index_to_expander.insert(index, expander);
    }

    /// Returns the expander for an argument position, if one was set.
    pub fn expander(&self, index: usize) -> Option<&Arc<dyn Expander>> {
        self.index_to_expander.get(&index)
    }

    /// Marks an argument as already percent-encoded.
    pub fn mark_encoded(&mut self, index: usize) {
        self.encoded.insert(index);
    }

    /// Marks every argument as already percent-encoded.
    pub fn mark_all_encoded(&mut self) {
        self.all_encoded = true;
    }

    /// Returns `true` if an argument is already percent-encoded.
    pub fn is_encoded(&self, index: usize) -> bool {
        self.all_encoded || self.encoded.contains(&index)
    }

    /// Claims an argument as the request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] if another argument already is the body.
    pub fn set_body_index(&mut self, index: usize, body_type: BodyType) -> Result<()> {
        if self.body_index.is_some_and(|existing| existing != index) {
            return Err(Error::Contract(format!(
                "Method has too many Body parameters: {}",
                self.config_key
            )));
        }
        self.body_index = Some(index);
        self.body_type = body_type;
        Ok(())
    }

    /// The position of the body argument.
    pub fn body_index(&self) -> Option<usize> {
        self.body_index
    }

    /// How the body is encoded.
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Records a variable as a form field.
    pub fn add_form_param(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.form_params.contains(&name) {
            self.form_params.push(name);
        }
    }

    /// Form field names in declaration order.
    pub fn form_params(&self) -> &[String] {
        &self.form_params
    }

    /// Claims an argument as the free-form query map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] if another argument already is the query map.
    pub fn set_query_map(&mut self, index: usize, encoded: bool) -> Result<()> {
        if self.query_map_index.is_some() {
            return Err(Error::Contract(format!(
                "QueryMap annotation was present on multiple parameters: {}",
                self.config_key
            )));
        }
        self.query_map_index = Some(index);
        self.query_map_encoded = encoded;
        Ok(())
    }

    /// The position of the query map argument.
    pub fn query_map_index(&self) -> Option<usize> {
        self.query_map_index
    }

    /// Returns `true` if query map entries are already percent-encoded.
    pub fn query_map_encoded(&self) -> bool {
        self.query_map_encoded
    }

    /// Claims an argument as the free-form header map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contract`] if another argument already is the header map.
    pub fn set_header_map(&mut self, index: usize) -> Result<()> {
        if self.header_map_index.is_some() {
            return Err(Error::Contract(format!(
                "HeaderMap annotation was present on multiple parameters: {}",
                self.config_key
            )));
        }
        self.header_map_index = Some(index);
        Ok(())
    }

    /// The position of the header map argument.
    pub fn header_map_index(&self) -> Option<usize> {
        self.header_map_index
    }

    /// Excludes an argument from the HTTP surface.
    pub fn ignore_param(&mut self, index: usize) {
        self.ignored.insert(index);
    }

    /// Returns `true` if an argument is excluded from the HTTP surface.
    pub fn is_ignored(&self, index: usize) -> bool {
        self.ignored.contains(&index)
    }

    /// Records that a synthetic position reads the field `member` of argument `owner`.
    pub(crate) fn add_bean_member(&mut self, synthetic: usize, owner: usize, member: &str) {
        self.bean_members
            .insert(synthetic, (owner, member.to_string()));
    }

    /// Resolves a synthetic position to its owning argument and field name.
    pub(crate) fn bean_member(&self, index: usize) -> Option<(usize, &str)> {
        self.bean_members
            .get(&index)
            .map(|(owner, member)| (*owner, member.as_str()))
    }

    /// Records a non-fatal problem found while parsing.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Non-fatal problems found while parsing, such as unknown annotations.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl fmt::Debug for MethodMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodMetadata")
            .field("config_key", &self.config_key)
            .field("return_shape", &self.return_shape)
            .field("template", &self.template)
            .field("index_to_name", &self.index_to_name)
            .field("expanders", &self.index_to_expander.len())
            .field("body_index", &self.body_index)
            .field("form_params", &self.form_params)
            .field("query_map_index", &self.query_map_index)
            .field("header_map_index", &self.header_map_index)
            .field("ignored", &self.ignored)
            .finish()
    }
}
