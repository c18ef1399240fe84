use super::{Dispatch, Outcome};
use crate::retry::Decision;
use crate::transport::AsyncTransport;
use crate::{Error, Options, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Runs calls of one method as futures; backoff waits on a timer instead of a thread.
///
/// Dropping the call's future stops it where it is: an in-flight exchange is abandoned
/// and no further attempt is scheduled.
pub(crate) struct AsyncMethodHandler {
    dispatch: Dispatch,
    transport: Arc<dyn AsyncTransport>,
}

impl AsyncMethodHandler {
    pub(crate) fn new(dispatch: Dispatch, transport: Arc<dyn AsyncTransport>) -> Self {
        Self {
            dispatch,
            transport,
        }
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub(crate) async fn invoke(&self, args: &[Value], options: Option<Options>) -> Result<Outcome> {
        let options = options.unwrap_or(self.dispatch.options);
        let mut retryer = self.dispatch.retryer.fresh();
        let mut attempt = 1;

        loop {
            let error = match self.attempt(args, &options).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                config_key = %self.dispatch.config_key(),
                "Request failed"
            );

            match retryer.decide(&error) {
                Decision::Continue(delay) => {
                    self.dispatch.logger.log_retry(
                        self.dispatch.config_key(),
                        self.dispatch.level,
                        delay,
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Decision::Stop => return Err(self.dispatch.propagation.apply(error)),
            }
        }
    }

    async fn attempt(&self, args: &[Value], options: &Options) -> Result<Outcome> {
        let request = self.dispatch.prepare(args)?;

        let start = Instant::now();
        let response = match self.transport.execute(&request, options).await {
            Ok(response) => response,
            Err(e) => {
                self.dispatch.logger.log_io_error(
                    self.dispatch.config_key(),
                    self.dispatch.level,
                    &e,
                    start.elapsed(),
                );
                return Err(Error::executing(&request, e));
            }
        };
        let elapsed = start.elapsed();

        self.dispatch
            .responses
            .handle(response.with_request(request), elapsed)
    }
}
