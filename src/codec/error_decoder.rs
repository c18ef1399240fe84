//! Error decoding with `Retry-After` and rate-limit header support.

use super::ErrorDecoder;
use crate::{Error, Response};
use http::{HeaderMap, StatusCode};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Builds [`Error::Status`] from the response, or [`Error::Retryable`] when the server
/// said when to try again.
///
/// The retry time comes from `Retry-After` (delay in seconds or an HTTP date), falling
/// back to `X-RateLimit-Reset` or `RateLimit-Reset` (Unix timestamps).
///
/// # Examples
///
/// ```
/// use tether::codec::{DefaultErrorDecoder, ErrorDecoder};
/// use tether::{Body, Response};
/// use http::StatusCode;
///
/// let mut response = Response::builder(StatusCode::TOO_MANY_REQUESTS)
///     .header("retry-after", "30")
///     .body(Body::from_bytes("slow down"))
///     .build();
///
/// let err = DefaultErrorDecoder.decode("Api#list()", &mut response);
/// assert!(err.is_retryable());
/// assert_eq!(err.raw_response(), Some("slow down"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDecoder;

impl ErrorDecoder for DefaultErrorDecoder {
    fn decode(&self, config_key: &str, response: &mut Response) -> Error {
        let raw_response = match response.text() {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read error response body");
                String::new()
            }
        };

        let status = response.status();
        let error = Error::Status {
            status,
            reason: response.reason().map(str::to_string),
            config_key: config_key.to_string(),
            headers: response.headers().clone(),
            raw_response,
        };

        match retry_after(response.headers(), SystemTime::now()) {
            Some(retry_after) => Error::Retryable {
                status: Some(status),
                message: error.to_string(),
                method: response.request().map(|request| request.method().clone()),
                retry_after: Some(retry_after),
                source: Some(Box::new(error)),
            },
            None => error,
        }
    }
}

/// Reclassifies chosen statuses as retryable.
///
/// # Examples
///
/// ```
/// use tether::codec::{DefaultErrorDecoder, RetryOnStatus};
/// use http::StatusCode;
///
/// let decoder = RetryOnStatus::new(DefaultErrorDecoder, [StatusCode::SERVICE_UNAVAILABLE]);
/// ```
#[derive(Debug, Clone)]
pub struct RetryOnStatus<D = DefaultErrorDecoder> {
    delegate: D,
    statuses: HashSet<StatusCode>,
}

impl<D: ErrorDecoder> RetryOnStatus<D> {
    /// Wraps `delegate`, making the given statuses retryable.
    pub fn new(delegate: D, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            delegate,
            statuses: statuses.into_iter().collect(),
        }
    }
}

impl<D: ErrorDecoder> ErrorDecoder for RetryOnStatus<D> {
    fn decode(&self, config_key: &str, response: &mut Response) -> Error {
        let status = response.status();
        let error = self.delegate.decode(config_key, response);
        if error.is_retryable() || !self.statuses.contains(&status) {
            return error;
        }
        Error::Retryable {
            status: Some(status),
            message: error.to_string(),
            method: response.request().map(|request| request.method().clone()),
            retry_after: None,
            source: Some(Box::new(error)),
        }
    }
}

/// Reads the time the server wants the next attempt at.
///
/// A `Retry-After` date in the past is returned as-is; the retryer treats it as
/// "retry now".
fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<SystemTime> {
    parse_retry_after(headers, now).or_else(|| parse_rate_limit_reset(headers))
}

/// Parses the Retry-After header.
///
/// Supports both delay-seconds (integer) and HTTP-date formats.
fn parse_retry_after(headers: &HeaderMap, now: SystemTime) -> Option<SystemTime> {
    let header = headers.get("retry-after")?.to_str().ok()?.trim();

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(now + Duration::from_secs(seconds));
    }

    httpdate::parse_http_date(header).ok()
}

/// Parses X-RateLimit-Reset or RateLimit-Reset headers (Unix timestamp).
fn parse_rate_limit_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok()?.trim().parse::<u64>().ok())
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;
    use http::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let now = SystemTime::now();
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("60"));

        assert_eq!(
            parse_retry_after(&headers, now),
            Some(now + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );

        let at = parse_retry_after(&headers, SystemTime::now()).unwrap();
        assert_eq!(
            at.duration_since(UNIX_EPOCH).unwrap(),
            Duration::from_secs(1_445_412_480)
        );
    }

    #[test]
    fn test_parse_rate_limit_reset() {
        let mut headers = HeaderMap::new();
        let future_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 120;
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&future_timestamp.to_string()).unwrap(),
        );

        let reset_at = parse_rate_limit_reset(&headers).unwrap();
        assert!(reset_at > SystemTime::now());
    }

    #[test]
    fn test_plain_status_error() {
        let mut response = Response::builder(StatusCode::BAD_REQUEST)
            .header("x-request-id", "abc")
            .body(Body::from_bytes("bad input"))
            .build();

        let err = DefaultErrorDecoder.decode("Api#create(user)", &mut response);
        match err {
            Error::Status {
                status,
                config_key,
                headers,
                raw_response,
                ..
            } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(config_key, "Api#create(user)");
                assert_eq!(headers.get("x-request-id").unwrap(), "abc");
                assert_eq!(raw_response, "bad input");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_on_status() {
        let decoder = RetryOnStatus::new(DefaultErrorDecoder, [StatusCode::SERVICE_UNAVAILABLE]);

        let mut busy = Response::builder(StatusCode::SERVICE_UNAVAILABLE).build();
        let err = decoder.decode("Api#get()", &mut busy);
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.retry_after().is_none());

        let mut missing = Response::builder(StatusCode::NOT_FOUND).build();
        assert!(!decoder.decode("Api#get()", &mut missing).is_retryable());
    }
}
