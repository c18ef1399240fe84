//! Substitute results for calls that failed.

use crate::{Error, Outcome, Result};
use serde_json::Value;
use std::sync::Arc;

/// Produces a result for a call that failed, in place of the failure.
///
/// A fallback sees every failure a call surfaces, after retries were exhausted. It may
/// return a substitute outcome or another error, including the original one.
///
/// Any `Fn(&str, &[Value], Error) -> Result<Outcome>` closure is a fallback.
///
/// # Examples
///
/// ```
/// use tether::fallback::Fallback;
/// use tether::{Error, Outcome};
/// use serde_json::{json, Value};
///
/// let cached = |method: &str, _args: &[Value], cause: Error| match method {
///     "contributors" => Ok(Outcome::Value(json!([]))),
///     _ => Err(cause),
/// };
///
/// let outcome = cached.fallback("contributors", &[], Error::Cancelled).unwrap();
/// assert_eq!(outcome.into_value().unwrap(), json!([]));
/// ```
pub trait Fallback: Send + Sync {
    /// Returns the substitute result of `method` called with `args`.
    fn fallback(&self, method: &str, args: &[Value], cause: Error) -> Result<Outcome>;
}

impl<F> Fallback for F
where
    F: Fn(&str, &[Value], Error) -> Result<Outcome> + Send + Sync,
{
    fn fallback(&self, method: &str, args: &[Value], cause: Error) -> Result<Outcome> {
        self(method, args, cause)
    }
}

/// Picks a fallback based on the failure that triggered it.
pub trait FallbackFactory: Send + Sync {
    /// Returns the fallback for `cause`.
    fn create(&self, cause: &Error) -> Arc<dyn Fallback>;
}

impl<F> FallbackFactory for F
where
    F: Fn(&Error) -> Arc<dyn Fallback> + Send + Sync,
{
    fn create(&self, cause: &Error) -> Arc<dyn Fallback> {
        self(cause)
    }
}

/// The fallback configured on a client.
#[derive(Clone)]
pub(crate) enum FallbackSource {
    Fixed(Arc<dyn Fallback>),
    Factory(Arc<dyn FallbackFactory>),
}

impl FallbackSource {
    pub(crate) fn recover(&self, method: &str, args: &[Value], cause: Error) -> Result<Outcome> {
        tracing::debug!(method = %method, error = %cause, "Falling back after failed call");
        match self {
            FallbackSource::Fixed(fallback) => fallback.fallback(method, args, cause),
            FallbackSource::Factory(factory) => factory.create(&cause).fallback(method, args, cause),
        }
    }
}
