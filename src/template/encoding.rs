//! Percent-encoding for the parts of a URL a template value can land in.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Characters escaped inside a query name or value.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b':')
    .remove(b'@')
    .remove(b'/')
    .remove(b'?');

/// Where in the request a value is being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
    Path,
    Query,
}

impl Context {
    fn set(self) -> &'static AsciiSet {
        match self {
            Context::Path => PATH_SEGMENT,
            Context::Query => QUERY,
        }
    }
}

/// Fully encodes a caller-supplied value, including any `%` it contains.
pub(crate) fn encode(value: &str, context: Context) -> String {
    utf8_percent_encode(value, context.set()).to_string()
}

/// Encodes literal template text, keeping `%XX` sequences that are already escaped.
pub(crate) fn encode_reserved(value: &str, context: Context) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push_str(&encode(&value[start..i], context));
            out.push_str(&value[i..i + 3]);
            i += 3;
            start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&encode(&value[start..], context));
    out
}

/// Restores `/` in an encoded path value.
pub(crate) fn decode_slash(value: &str) -> String {
    value.replace("%2F", "/").replace("%2f", "/")
}
