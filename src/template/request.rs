use super::encoding::{self, Context};
use super::expression::{self, Chunk};
use super::{CollectionFormat, TemplateValue, Variables};
use crate::{Error, Request, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// A parameterized HTTP request.
///
/// The path, query values, header values and body may contain `{name}` expressions.
/// [`RequestTemplate::resolve`] replaces them with values and returns an independent,
/// resolved copy; the original skeleton is left untouched so it can be shared and
/// resolved again for the next attempt.
///
/// Query parameters and headers keep insertion order, so the same template and values
/// always serialize to the same request.
///
/// # Examples
///
/// ```
/// use tether::template::{RequestTemplate, TemplateValue, Variables};
/// use http::Method;
///
/// let mut template = RequestTemplate::new();
/// template
///     .method(Method::GET)
///     .uri("/repos/{owner}/{repo}/issues?labels={labels}")
///     .header("Accept", ["application/json"]);
///
/// let variables = Variables::new()
///     .with("owner", "rust-lang")
///     .with("repo", "rust")
///     .with("labels", vec!["bug".to_string(), "easy".to_string()]);
///
/// let resolved = template.resolve(&variables)?;
/// assert_eq!(
///     resolved.path_and_query(),
///     "/repos/rust-lang/rust/issues?labels=bug&labels=easy"
/// );
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    method: Option<Method>,
    target: Option<String>,
    uri: String,
    queries: Vec<Entry>,
    headers: Vec<Entry>,
    body: Option<TemplateBody>,
    charset: String,
    decode_slash: bool,
    collection_format: CollectionFormat,
    resolved: bool,
}

/// A named list of values; an empty list is a bare query name such as `?flag`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateBody {
    Bytes(Vec<u8>),
    Template(String),
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            method: None,
            target: None,
            uri: String::new(),
            queries: Vec::new(),
            headers: Vec::new(),
            body: None,
            charset: "UTF-8".to_string(),
            decode_slash: true,
            collection_format: CollectionFormat::default(),
            resolved: false,
        }
    }
}

impl RequestTemplate {
    /// Creates an empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    /// Returns the HTTP method, if one was set.
    pub fn http_method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Replaces the path, adding any query parameters found after `?`.
    pub fn uri(&mut self, uri: &str) -> &mut Self {
        self.uri.clear();
        self.append_uri(uri)
    }

    /// Appends to the path, adding any query parameters found after `?`.
    pub fn append_uri(&mut self, uri: &str) -> &mut Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        self.uri.push_str(path);

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((name, value)) => self.push_query(name, vec![value.to_string()]),
                None => self.push_query(pair, Vec::new()),
            }
        }
        self
    }

    /// Returns the path template, without query parameters.
    pub fn path(&self) -> &str {
        &self.uri
    }

    /// Sets the base URL the path is appended to.
    pub fn target(&mut self, url: impl Into<String>) -> &mut Self {
        self.target = Some(url.into());
        self
    }

    /// Returns the base URL, if one was set.
    pub fn target_url(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Appends values to a query parameter. Passing no values removes the parameter.
    ///
    /// On a resolved template the values are taken literally and percent-encoded.
    pub fn query<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.queries.retain(|entry| entry.name != name);
            return self;
        }
        if self.resolved {
            let name = encoding::encode(name, Context::Query);
            let values = values
                .iter()
                .map(|value| encoding::encode(value, Context::Query))
                .collect();
            self.push_query(&name, values);
        } else {
            self.push_query(name, values);
        }
        self
    }

    /// Appends values that are already percent-encoded to a query parameter.
    pub fn query_encoded<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.push_query(name, values);
        }
        self
    }

    /// Returns the values of a query parameter.
    pub fn query_values(&self, name: &str) -> Option<&[String]> {
        self.queries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.values.as_slice())
    }

    /// Iterates over query parameters in insertion order.
    pub fn queries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.queries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Appends values to a header. Passing no values removes the header.
    pub fn header<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self.remove_header(name);
        }
        match self.header_entry_mut(name) {
            Some(entry) => entry.values.extend(values),
            None => self.headers.push(Entry {
                name: name.to_string(),
                values,
            }),
        }
        self
    }

    /// Replaces all values of a header.
    pub fn set_header<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_header(name);
        self.header(name, values)
    }

    /// Removes a header.
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers
            .retain(|entry| !entry.name.eq_ignore_ascii_case(name));
        self
    }

    /// Returns the values of a header, matching the name case-insensitively.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.values.as_slice())
    }

    /// Iterates over headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.headers
            .iter()
            .map(|entry| (entry.name.as_str(), entry.values.as_slice()))
    }

    /// Sets a literal request body.
    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = Some(TemplateBody::Bytes(body.into()));
        self
    }

    /// Sets a body template whose `{name}` expressions are expanded on resolve.
    ///
    /// Literal braces must be written as `%7B` and `%7D`.
    pub fn body_template(&mut self, template: impl Into<String>) -> &mut Self {
        self.body = Some(TemplateBody::Template(template.into()));
        self
    }

    /// Returns the literal body, if set.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Some(TemplateBody::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Returns `true` if a body or body template is set.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Returns the character set of the body.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Sets the character set of the body.
    pub fn set_charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = charset.into();
        self
    }

    /// Controls whether encoded slashes in path values are restored to `/`.
    pub fn decode_slash(&mut self, decode: bool) -> &mut Self {
        self.decode_slash = decode;
        self
    }

    /// Sets how multi-valued query parameters are serialized.
    pub fn collection_format(&mut self, format: CollectionFormat) -> &mut Self {
        self.collection_format = format;
        self
    }

    /// Returns `true` once [`RequestTemplate::resolve`] produced this template.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns every variable referenced by the template, in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut sources: Vec<&str> = vec![self.uri.as_str()];
        for entry in self.queries.iter().chain(self.headers.iter()) {
            sources.push(&entry.name);
            sources.extend(entry.values.iter().map(String::as_str));
        }
        if let Some(TemplateBody::Template(template)) = &self.body {
            sources.push(template);
        }

        let mut names: Vec<String> = Vec::new();
        for name in sources.into_iter().flat_map(expression::variables) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Returns `true` if the template references the named variable.
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables().iter().any(|variable| variable == name)
    }

    /// Resolves every expression against `variables`, returning a new template.
    ///
    /// Query and header values whose variables have no value are dropped; an entry left
    /// with no values disappears. A path variable without a value is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if a path variable has no value.
    pub fn resolve(&self, variables: &Variables) -> Result<RequestTemplate> {
        if self.resolved {
            return Ok(self.clone());
        }

        let mut resolved = self.clone();
        resolved.uri = self.expand_path(variables)?;
        resolved.queries = self
            .queries
            .iter()
            .filter_map(|entry| expand_query(entry, variables))
            .collect();
        resolved.headers = self
            .headers
            .iter()
            .filter_map(|entry| expand_header(entry, variables))
            .collect();
        if let Some(TemplateBody::Template(template)) = &self.body {
            resolved.body = Some(TemplateBody::Bytes(
                expand_body(template, variables).into_bytes(),
            ));
        }
        resolved.resolved = true;
        Ok(resolved)
    }

    /// Returns the serialized query string, without the leading `?`.
    pub fn query_string(&self) -> Option<String> {
        let parts: Vec<String> = self
            .queries
            .iter()
            .map(|entry| self.serialize_query(entry))
            .collect();
        (!parts.is_empty()).then(|| parts.join("&"))
    }

    /// Returns the path followed by the query string.
    pub fn path_and_query(&self) -> String {
        match self.query_string() {
            Some(query) => format!("{}?{}", self.uri, query),
            None => self.uri.clone(),
        }
    }

    /// Builds the transport-level request from a resolved template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the template is unresolved, has no method, or
    /// carries an invalid header, and [`Error::InvalidUrl`] if the URL does not parse.
    pub fn request(&self) -> Result<Request> {
        if !self.resolved {
            return Err(Error::Configuration(
                "template must be resolved before building a request".to_string(),
            ));
        }
        let method = self.method.clone().ok_or_else(|| {
            Error::Configuration("request template has no HTTP method".to_string())
        })?;

        let path_and_query = self.path_and_query();
        let url = if is_absolute(&self.uri) {
            path_and_query
        } else {
            let base = self.target.as_deref().unwrap_or_default();
            format!("{}{}", base.trim_end_matches('/'), path_and_query)
        };
        let url = url::Url::parse(&url)?;

        let mut headers = HeaderMap::new();
        for entry in &self.headers {
            let name = HeaderName::try_from(entry.name.as_str()).map_err(|e| {
                Error::Configuration(format!("Invalid header name {}: {}", entry.name, e))
            })?;
            for value in &entry.values {
                let value = HeaderValue::try_from(value.as_str()).map_err(|e| {
                    Error::Configuration(format!("Invalid header value for {}: {}", entry.name, e))
                })?;
                headers.append(name.clone(), value);
            }
        }

        let body = match &self.body {
            Some(TemplateBody::Bytes(bytes)) => Some(bytes.clone()),
            Some(TemplateBody::Template(template)) => Some(template.clone().into_bytes()),
            None => None,
        };

        Ok(Request::new(method, url, headers, body, Some(self.charset.clone())))
    }

    fn push_query(&mut self, name: &str, values: Vec<String>) {
        match self.queries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.values.extend(values),
            None => self.queries.push(Entry {
                name: name.to_string(),
                values,
            }),
        }
    }

    fn header_entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.headers
            .iter_mut()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    fn expand_path(&self, variables: &Variables) -> Result<String> {
        let mut path = String::with_capacity(self.uri.len());
        for chunk in expression::parse(&self.uri) {
            match chunk {
                Chunk::Literal(text) => path.push_str(&text),
                Chunk::Expression(name) => {
                    let value = variables.get(&name).ok_or_else(|| {
                        Error::Template(format!(
                            "path variable '{}' has no value in '{}'",
                            name, self.uri
                        ))
                    })?;
                    let encode = |raw: &str| {
                        if variables.is_encoded(&name) {
                            raw.to_string()
                        } else {
                            let encoded = encoding::encode(raw, Context::Path);
                            if self.decode_slash {
                                encoding::decode_slash(&encoded)
                            } else {
                                encoded
                            }
                        }
                    };
                    match value {
                        TemplateValue::Single(raw) => path.push_str(&encode(raw)),
                        TemplateValue::Multi(raws) => {
                            let joined: Vec<String> = raws.iter().map(|raw| encode(raw)).collect();
                            path.push_str(&joined.join(","));
                        }
                    }
                }
            }
        }
        Ok(path)
    }

    fn serialize_query(&self, entry: &Entry) -> String {
        if entry.values.is_empty() {
            return entry.name.clone();
        }
        match self.collection_format.separator() {
            None => entry
                .values
                .iter()
                .map(|value| format!("{}={}", entry.name, value))
                .collect::<Vec<_>>()
                .join("&"),
            Some(separator) => format!("{}={}", entry.name, entry.values.join(separator)),
        }
    }
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Expands one value template.
///
/// A value that is exactly one expression may fan out into several values; a value
/// mixing text and expressions joins multi-valued variables with commas. A value that
/// references a variable with no value yields nothing.
fn expand_values(
    template: &str,
    variables: &Variables,
    encode: &dyn Fn(&str, bool) -> String,
) -> Vec<String> {
    if let Some(name) = expression::single_expression(template) {
        let encoded = variables.is_encoded(&name);
        return match variables.get(&name) {
            None => Vec::new(),
            Some(TemplateValue::Single(value)) => vec![encode(value, encoded)],
            Some(TemplateValue::Multi(values)) => {
                values.iter().map(|value| encode(value, encoded)).collect()
            }
        };
    }

    let mut expanded = String::new();
    for chunk in expression::parse(template) {
        match chunk {
            Chunk::Literal(text) => expanded.push_str(&encode(&text, true)),
            Chunk::Expression(name) => {
                let encoded = variables.is_encoded(&name);
                match variables.get(&name) {
                    None => return Vec::new(),
                    Some(TemplateValue::Single(value)) => {
                        expanded.push_str(&encode(value, encoded))
                    }
                    Some(TemplateValue::Multi(values)) => {
                        let values: Vec<String> =
                            values.iter().map(|value| encode(value, encoded)).collect();
                        expanded.push_str(&values.join(","));
                    }
                }
            }
        }
    }
    vec![expanded]
}

fn expand_query(entry: &Entry, variables: &Variables) -> Option<Entry> {
    let encode = |value: &str, already_encoded: bool| {
        if already_encoded {
            encoding::encode_reserved(value, Context::Query)
        } else {
            encoding::encode(value, Context::Query)
        }
    };

    let name = expand_values(&entry.name, variables, &encode)
        .into_iter()
        .next()?;
    if entry.values.is_empty() {
        return Some(Entry {
            name,
            values: Vec::new(),
        });
    }

    let values: Vec<String> = entry
        .values
        .iter()
        .flat_map(|value| expand_values(value, variables, &encode))
        .collect();
    (!values.is_empty()).then_some(Entry { name, values })
}

fn expand_header(entry: &Entry, variables: &Variables) -> Option<Entry> {
    let verbatim = |value: &str, _: bool| value.to_string();
    let values: Vec<String> = entry
        .values
        .iter()
        .flat_map(|value| expand_values(value, variables, &verbatim))
        .collect();
    (!values.is_empty()).then(|| Entry {
        name: entry.name.clone(),
        values,
    })
}

fn expand_body(template: &str, variables: &Variables) -> String {
    let mut body = String::with_capacity(template.len());
    for chunk in expression::parse(template) {
        match chunk {
            Chunk::Literal(text) => body.push_str(&text),
            Chunk::Expression(name) => match variables.get(&name) {
                Some(TemplateValue::Single(value)) => body.push_str(value),
                Some(TemplateValue::Multi(values)) => body.push_str(&values.join(",")),
                None => {}
            },
        }
    }
    body.replace("%7B", "{").replace("%7D", "}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_template() -> RequestTemplate {
        let mut template = RequestTemplate::new();
        template
            .method(Method::GET)
            .uri("/users/{id}?active={flag}")
            .target("http://localhost:8080");
        template
    }

    #[test]
    fn test_resolves_path_and_query() {
        let variables = Variables::new().with("id", "42").with("flag", "true");
        let resolved = users_template().resolve(&variables).unwrap();

        assert_eq!(resolved.path_and_query(), "/users/42?active=true");
        assert!(resolved.is_resolved());
    }

    #[test]
    fn test_missing_query_value_drops_parameter() {
        let variables = Variables::new().with("id", "42");
        let resolved = users_template().resolve(&variables).unwrap();

        assert_eq!(resolved.path_and_query(), "/users/42");
        assert_eq!(resolved.query_values("active"), None);
    }

    #[test]
    fn test_missing_path_value_fails() {
        let result = users_template().resolve(&Variables::new());
        assert!(matches!(result, Err(Error::Template(_))));
    }

    #[test]
    fn test_repeated_placeholder() {
        let mut template = RequestTemplate::new();
        template
            .method(Method::GET)
            .uri("/{name}/mirror/{name}?of={name}")
            .header("X-Name", ["{name}"]);

        let resolved = template
            .resolve(&Variables::new().with("name", "echo"))
            .unwrap();
        assert_eq!(resolved.path_and_query(), "/echo/mirror/echo?of=echo");
        assert_eq!(resolved.header_values("x-name").unwrap(), ["echo"]);
    }

    #[test]
    fn test_multi_valued_header_and_query() {
        let mut template = RequestTemplate::new();
        template
            .method(Method::GET)
            .uri("/search?tag={tags}")
            .header("X-Tag", ["{tags}"]);

        let tags = vec!["a".to_string(), "b c".to_string()];
        let resolved = template
            .resolve(&Variables::new().with("tags", tags))
            .unwrap();

        assert_eq!(resolved.path_and_query(), "/search?tag=a&tag=b%20c");
        assert_eq!(resolved.header_values("X-Tag").unwrap(), ["a", "b c"]);
    }

    #[test]
    fn test_collection_format_csv() {
        let mut template = RequestTemplate::new();
        template
            .method(Method::GET)
            .uri("/search?tag={tags}")
            .collection_format(CollectionFormat::Csv);

        let tags = vec!["a".to_string(), "b".to_string()];
        let resolved = template
            .resolve(&Variables::new().with("tags", tags))
            .unwrap();
        assert_eq!(resolved.path_and_query(), "/search?tag=a,b");
    }

    #[test]
    fn test_missing_header_is_dropped() {
        let mut template = RequestTemplate::new();
        template
            .method(Method::GET)
            .uri("/")
            .header("Authorization", ["Bearer {token}"])
            .header("Accept", ["application/json"]);

        let resolved = template.resolve(&Variables::new()).unwrap();
        assert_eq!(resolved.header_values("Authorization"), None);
        assert_eq!(resolved.header_values("accept").unwrap(), ["application/json"]);
    }

    #[test]
    fn test_encoded_values_are_not_double_encoded() {
        let mut template = RequestTemplate::new();
        template.method(Method::GET).uri("/files/{path}?q={q}");

        let mut variables = Variables::new();
        variables.insert_encoded("path", "a%20b");
        variables.insert_encoded("q", "x%26y");
        let resolved = template.resolve(&variables).unwrap();
        assert_eq!(resolved.path_and_query(), "/files/a%20b?q=x%26y");

        let plain = Variables::new().with("path", "a%20b").with("q", "x&y");
        let resolved = template.resolve(&plain).unwrap();
        assert_eq!(resolved.path_and_query(), "/files/a%2520b?q=x%26y");
    }

    #[test]
    fn test_decode_slash() {
        let mut template = RequestTemplate::new();
        template.method(Method::GET).uri("/files/{path}");
        let variables = Variables::new().with("path", "dir/file.txt");

        let resolved = template.resolve(&variables).unwrap();
        assert_eq!(resolved.path(), "/files/dir/file.txt");

        template.decode_slash(false);
        let resolved = template.resolve(&variables).unwrap();
        assert_eq!(resolved.path(), "/files/dir%2Ffile.txt");
    }

    #[test]
    fn test_body_template() {
        let mut template = RequestTemplate::new();
        template
            .method(Method::POST)
            .uri("/login")
            .body_template(r#"%7B"user": "{user}", "password": "{password}"%7D"#);

        let variables = Variables::new()
            .with("user", "denominator")
            .with("password", "secret");
        let resolved = template.resolve(&variables).unwrap();
        assert_eq!(
            resolved.body_bytes().unwrap(),
            br#"{"user": "denominator", "password": "secret"}"#
        );
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let variables = Variables::new().with("id", "7").with("flag", "false");
        let template = users_template();

        let first = template.clone().resolve(&variables).unwrap();
        let second = template.clone().resolve(&variables).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.request().unwrap().url(),
            second.request().unwrap().url()
        );
        assert!(!template.is_resolved());
    }

    #[test]
    fn test_request_url() {
        let variables = Variables::new().with("id", "42").with("flag", "true");
        let request = users_template().resolve(&variables).unwrap().request().unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(
            request.url().as_str(),
            "http://localhost:8080/users/42?active=true"
        );
    }

    #[test]
    fn test_malformed_url_is_an_error() {
        let mut template = RequestTemplate::new();
        template.method(Method::GET).uri("/x").target("not a url");
        let result = template.resolve(&Variables::new()).unwrap().request();
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_variables_lists_every_location() {
        let mut template = RequestTemplate::new();
        template
            .uri("/a/{x}?q={y}")
            .header("H", ["{z}"])
            .body_template("{w}");
        assert_eq!(template.variables(), vec!["x", "y", "z", "w"]);
    }

    #[test]
    fn test_query_on_resolved_template_is_encoded() {
        let mut resolved = users_template()
            .resolve(&Variables::new().with("id", "1"))
            .unwrap();
        resolved.query("q", ["a b"]);
        assert_eq!(resolved.path_and_query(), "/users/1?q=a%20b");
    }
}
