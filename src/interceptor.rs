//! Hooks that adjust every request before it is sent.

use crate::template::RequestTemplate;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Mutates the resolved request of each attempt.
///
/// Interceptors run in registration order, after the template was resolved and before the
/// target turns it into a [`Request`](crate::Request). Each retry starts again from the
/// method's skeleton, so an interceptor never sees its own earlier changes.
///
/// Any `Fn(&mut RequestTemplate)` closure is an interceptor.
///
/// # Examples
///
/// ```
/// use tether::interceptor::RequestInterceptor;
/// use tether::template::RequestTemplate;
///
/// let trace = |template: &mut RequestTemplate| {
///     template.set_header("X-Trace-Id", ["abc123"]);
/// };
///
/// let mut template = RequestTemplate::new();
/// trace.apply(&mut template);
/// assert_eq!(template.header_values("x-trace-id").unwrap(), ["abc123"]);
/// ```
pub trait RequestInterceptor: Send + Sync {
    /// Adjusts `template` in place.
    fn apply(&self, template: &mut RequestTemplate);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut RequestTemplate) + Send + Sync,
{
    fn apply(&self, template: &mut RequestTemplate) {
        self(template)
    }
}

/// Adds an `Authorization: Basic` header.
#[derive(Debug, Clone)]
pub struct BasicAuthRequestInterceptor {
    header: String,
}

impl BasicAuthRequestInterceptor {
    /// Encodes `username:password` once, up front.
    pub fn new(username: &str, password: &str) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", username, password));
        Self {
            header: format!("Basic {}", credentials),
        }
    }
}

impl RequestInterceptor for BasicAuthRequestInterceptor {
    fn apply(&self, template: &mut RequestTemplate) {
        template.set_header("Authorization", [self.header.as_str()]);
    }
}
