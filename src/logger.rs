//! Request and response logging.

use crate::{Request, Response};
use std::fmt::Debug;
use std::io;
use std::time::Duration;

/// How much of each exchange is logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Nothing.
    None,
    /// Method, URL, status and elapsed time.
    #[default]
    Basic,
    /// Basic information plus request and response headers.
    Headers,
    /// Headers plus request and response bodies.
    Full,
}

/// Receives the events of each call.
///
/// None of these methods can fail a call; they only observe it.
pub trait Logger: Send + Sync + Debug {
    /// A request is about to be sent.
    fn log_request(&self, config_key: &str, level: LogLevel, request: &Request);

    /// A response arrived after `elapsed`.
    ///
    /// A logger that reads the body must return a response with an equivalent body so
    /// it can still be decoded.
    fn log_and_rebuffer_response(
        &self,
        config_key: &str,
        level: LogLevel,
        response: Response,
        elapsed: Duration,
    ) -> io::Result<Response>;

    /// Another attempt is scheduled after `delay`.
    fn log_retry(&self, config_key: &str, level: LogLevel, delay: Duration);

    /// The transport failed after `elapsed`.
    fn log_io_error(&self, config_key: &str, level: LogLevel, error: &io::Error, elapsed: Duration);
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_request(&self, config_key: &str, level: LogLevel, request: &Request) {
        if level == LogLevel::None {
            return;
        }
        tracing::debug!(
            config_key = %config_key,
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );
        if level >= LogLevel::Headers {
            for (name, value) in request.headers() {
                tracing::debug!(
                    config_key = %config_key,
                    header = %name,
                    value = ?value,
                    "Request header"
                );
            }
        }
        if level >= LogLevel::Full {
            if let Some(body) = request.body() {
                tracing::debug!(
                    config_key = %config_key,
                    bytes = body.len(),
                    body = %String::from_utf8_lossy(body),
                    "Request body"
                );
            }
        }
    }

    fn log_and_rebuffer_response(
        &self,
        config_key: &str,
        level: LogLevel,
        response: Response,
        elapsed: Duration,
    ) -> io::Result<Response> {
        if level == LogLevel::None {
            return Ok(response);
        }
        tracing::info!(
            config_key = %config_key,
            status = response.status().as_u16(),
            latency_ms = elapsed.as_millis(),
            "Received HTTP response"
        );
        if level >= LogLevel::Headers {
            for (name, value) in response.headers() {
                tracing::debug!(
                    config_key = %config_key,
                    header = %name,
                    value = ?value,
                    "Response header"
                );
            }
        }
        if level < LogLevel::Full || response.body().is_none() {
            return Ok(response);
        }

        let mut response = response.rebuffer()?;
        let body = response.text()?;
        tracing::debug!(
            config_key = %config_key,
            bytes = body.len(),
            body = %body,
            "Response body"
        );
        response.replace_body(crate::Body::from_bytes(body));
        Ok(response)
    }

    fn log_retry(&self, config_key: &str, level: LogLevel, delay: Duration) {
        if level == LogLevel::None {
            return;
        }
        tracing::info!(
            config_key = %config_key,
            delay_ms = delay.as_millis(),
            "Retrying request after delay"
        );
    }

    fn log_io_error(&self, config_key: &str, level: LogLevel, error: &io::Error, elapsed: Duration) {
        if level == LogLevel::None {
            return;
        }
        tracing::warn!(
            config_key = %config_key,
            error = %error,
            latency_ms = elapsed.as_millis(),
            "Request failed"
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log_request(&self, _config_key: &str, _level: LogLevel, _request: &Request) {}

    fn log_and_rebuffer_response(
        &self,
        _config_key: &str,
        _level: LogLevel,
        response: Response,
        _elapsed: Duration,
    ) -> io::Result<Response> {
        Ok(response)
    }

    fn log_retry(&self, _config_key: &str, _level: LogLevel, _delay: Duration) {}

    fn log_io_error(&self, _config_key: &str, _level: LogLevel, _error: &io::Error, _elapsed: Duration) {}
}
