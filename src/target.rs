//! Where requests are sent.

use crate::template::RequestTemplate;
use crate::{Error, Request, Result};
use std::fmt::Debug;

/// Turns a resolved template into a request against a concrete host.
pub trait Target: Send + Sync + Debug {
    /// The interface this target serves.
    fn name(&self) -> &str;

    /// The base URL requests are sent to.
    fn url(&self) -> &str;

    /// Points `template` at this target and builds the request.
    ///
    /// # Errors
    ///
    /// Fails if the template cannot become a request, for example because the expanded
    /// URL does not parse.
    fn apply(&self, template: &mut RequestTemplate) -> Result<Request>;
}

/// A target with a fixed base URL.
///
/// # Examples
///
/// ```
/// use tether::target::{HardCodedTarget, Target};
/// use tether::template::{RequestTemplate, Variables};
/// use http::Method;
///
/// let target = HardCodedTarget::new("GitHub", "https://api.github.com")?;
///
/// let mut template = RequestTemplate::new();
/// template.method(Method::GET).uri("/repos/{owner}");
/// let mut resolved = template.resolve(&Variables::new().with("owner", "rust-lang"))?;
///
/// let request = target.apply(&mut resolved)?;
/// assert_eq!(request.url().as_str(), "https://api.github.com/repos/rust-lang");
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct HardCodedTarget {
    name: String,
    url: String,
}

impl HardCodedTarget {
    /// Creates a target, validating the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)?;
        Ok(Self {
            name: name.into(),
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

impl Target for HardCodedTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn apply(&self, template: &mut RequestTemplate) -> Result<Request> {
        if template.target_url().is_none() {
            template.target(self.url.as_str());
        }
        template.request()
    }
}

/// A target with no base URL; every method path must be absolute.
#[derive(Debug, Clone)]
pub struct EmptyTarget {
    name: String,
}

impl EmptyTarget {
    /// Creates a target for the named interface.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Target for EmptyTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        ""
    }

    fn apply(&self, template: &mut RequestTemplate) -> Result<Request> {
        if !template.path().contains("://") {
            return Err(Error::Configuration(format!(
                "{} has no base URL; request path '{}' must be absolute",
                self.name,
                template.path()
            )));
        }
        template.request()
    }
}
