use super::{Dispatch, Outcome};
use crate::retry::Decision;
use crate::transport::Transport;
use crate::{Error, Options, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Runs calls of one method on the calling thread, sleeping between attempts.
pub(crate) struct SyncMethodHandler {
    dispatch: Dispatch,
    transport: Arc<dyn Transport>,
}

impl SyncMethodHandler {
    pub(crate) fn new(dispatch: Dispatch, transport: Arc<dyn Transport>) -> Self {
        Self {
            dispatch,
            transport,
        }
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub(crate) fn invoke(&self, args: &[Value], options: Option<Options>) -> Result<Outcome> {
        let options = options.unwrap_or(self.dispatch.options);
        let mut retryer = self.dispatch.retryer.fresh();
        let mut attempt = 1;

        loop {
            let error = match self.attempt(args, &options) {
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
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Decision::Stop => return Err(self.dispatch.propagation.apply(error)),
            }
        }
    }

    fn attempt(&self, args: &[Value], options: &Options) -> Result<Outcome> {
        let request = self.dispatch.prepare(args)?;

        let start = Instant::now();
        let response = match self.transport.execute(&request, options) {
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
