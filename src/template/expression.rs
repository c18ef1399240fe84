//! Splitting template strings into literal text and `{name}` expressions.

/// One piece of a parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    Literal(String),
    Expression(String),
}

/// Parses a template into chunks.
///
/// An expression is `{name}` or `{name:pattern}`. A name is any non-empty text without
/// braces, quotes or whitespace, so `{filter[status]}` and `{$top}` are expressions.
/// Braces that do not enclose a valid name are kept as literal text, which keeps
/// JSON-looking body templates intact.
pub(crate) fn parse(template: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            literal.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let inner = &after[..close];
        match expression_name(inner) {
            Some(name) => {
                if !literal.is_empty() {
                    chunks.push(Chunk::Literal(std::mem::take(&mut literal)));
                }
                chunks.push(Chunk::Expression(name.to_string()));
                rest = &after[close + 1..];
            }
            None => {
                literal.push('{');
                rest = after;
            }
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        chunks.push(Chunk::Literal(literal));
    }
    chunks
}

/// Returns every variable name referenced by the template, in order of appearance.
pub(crate) fn variables(template: &str) -> Vec<String> {
    parse(template)
        .into_iter()
        .filter_map(|chunk| match chunk {
            Chunk::Expression(name) => Some(name),
            Chunk::Literal(_) => None,
        })
        .collect()
}

/// Returns `true` if the template is exactly one expression.
pub(crate) fn single_expression(template: &str) -> Option<String> {
    let mut chunks = parse(template);
    match (chunks.len(), chunks.pop()) {
        (1, Some(Chunk::Expression(name))) => Some(name),
        _ => None,
    }
}

fn expression_name(inner: &str) -> Option<&str> {
    let name = inner.split(':').next()?.trim();
    let valid = !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"'));
    valid.then_some(name)
}
