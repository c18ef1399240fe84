//! Retry policies for transient failures.
//!
//! A [`Retryer`] is stateful: it counts attempts for one call. Clients keep a prototype and
//! ask it for a [`fresh`](Retryer::fresh) copy at the start of every call, so concurrent
//! calls never share attempt counters.

use crate::Error;
use rand::Rng;
use std::fmt::Debug;
use std::time::{Duration, Instant, SystemTime};

/// What to do after a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Try again after waiting for the given duration.
    Continue(Duration),
    /// Give up and surface the failure.
    Stop,
}

/// Decides whether and when a failed call is attempted again.
///
/// # Examples
///
/// ```
/// use tether::retry::{Decision, Retryer};
/// use tether::Error;
/// use std::time::Duration;
///
/// /// Retries once, immediately.
/// #[derive(Debug, Default)]
/// struct Once {
///     used: bool,
/// }
///
/// impl Retryer for Once {
///     fn decide(&mut self, _error: &Error) -> Decision {
///         if std::mem::replace(&mut self.used, true) {
///             Decision::Stop
///         } else {
///             Decision::Continue(Duration::ZERO)
///         }
///     }
///
///     fn fresh(&self) -> Box<dyn Retryer> {
///         Box::new(Once::default())
///     }
/// }
/// ```
pub trait Retryer: Send + Sync + Debug {
    /// Records a failed attempt and decides what happens next.
    fn decide(&mut self, error: &Error) -> Decision;

    /// Returns a copy with fresh state, for a new call.
    fn fresh(&self) -> Box<dyn Retryer>;
}

/// Backoff between attempts, growing by a multiplier up to a maximum interval.
///
/// The wait before retry `n` (1-indexed) is `period * multiplier^(n - 1)`, capped at
/// `max_period`. A server-suggested `retry_after` replaces the computed wait (still
/// capped); one in the past retries immediately.
///
/// # Examples
///
/// ```
/// use tether::retry::Backoff;
/// use std::time::Duration;
///
/// // 100ms, 150ms, 225ms... capped at 1s, at most 5 attempts in total.
/// let default = Backoff::default();
///
/// // 100ms between each of 3 attempts.
/// let fixed = Backoff::fixed(Duration::from_millis(100), 3);
///
/// // Randomized waits, giving up after 10 seconds overall.
/// let bounded = Backoff::new(Duration::from_millis(50), Duration::from_secs(2), 10)
///     .jitter(true)
///     .deadline(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    period: Duration,
    max_period: Duration,
    max_attempts: Option<u32>,
    multiplier: f64,
    jitter: bool,
    deadline: Option<Duration>,
    attempt: u32,
    started: Instant,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(1), 5)
    }
}

impl Backoff {
    /// Creates a backoff with multiplier 1.5 and at most `max_attempts` attempts in total.
    pub fn new(period: Duration, max_period: Duration, max_attempts: u32) -> Self {
        Self {
            period,
            max_period,
            max_attempts: Some(max_attempts),
            multiplier: 1.5,
            jitter: false,
            deadline: None,
            attempt: 1,
            started: Instant::now(),
        }
    }

    /// Creates a backoff that waits `period` between each of `max_attempts` attempts.
    pub fn fixed(period: Duration, max_attempts: u32) -> Self {
        Self::new(period, period, max_attempts).multiplier(1.0)
    }

    /// Removes the attempt limit. Combine with [`Backoff::deadline`] to bound the call.
    pub fn unbounded(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Sets the growth factor between consecutive waits.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Randomizes each wait to between 50% and 100% of its computed value.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Gives up once waiting again would pass `deadline` since the call started.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The number of the attempt that just failed, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The wait before retry `attempt` (1-indexed), before jitter.
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let nanos = (self.period.as_nanos() as f64 * factor).round();
        if !nanos.is_finite() || nanos >= self.max_period.as_nanos() as f64 {
            return self.max_period;
        }
        Duration::from_nanos(nanos as u64)
    }

    fn next_interval(&self, error: &Error) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return match retry_after.duration_since(SystemTime::now()) {
                Ok(wait) => wait.min(self.max_period),
                Err(_) => Duration::ZERO,
            };
        }

        let interval = self.interval_for_attempt(self.attempt);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            interval.mul_f64(factor)
        } else {
            interval
        }
    }
}

impl Retryer for Backoff {
    fn decide(&mut self, error: &Error) -> Decision {
        if !error.is_retryable() {
            return Decision::Stop;
        }
        if self
            .max_attempts
            .is_some_and(|max_attempts| self.attempt >= max_attempts)
        {
            return Decision::Stop;
        }

        let interval = self.next_interval(error);
        if let Some(deadline) = self.deadline {
            let next_attempt_at = self.started.elapsed().checked_add(interval);
            if !next_attempt_at.is_some_and(|at| at <= deadline) {
                return Decision::Stop;
            }
        }

        self.attempt += 1;
        Decision::Continue(interval)
    }

    fn fresh(&self) -> Box<dyn Retryer> {
        Box::new(Self {
            attempt: 1,
            started: Instant::now(),
            ..self.clone()
        })
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl Retryer for NeverRetry {
    fn decide(&mut self, _error: &Error) -> Decision {
        Decision::Stop
    }

    fn fresh(&self) -> Box<dyn Retryer> {
        Box::new(NeverRetry)
    }
}

/// What a call fails with once its retryer gives up on a retryable failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropagationPolicy {
    /// Surface the retryable failure itself.
    #[default]
    None,
    /// Surface the failure it wraps, when there is one.
    Unwrap,
}

impl PropagationPolicy {
    pub(crate) fn apply(self, error: Error) -> Error {
        match self {
            PropagationPolicy::None => error,
            PropagationPolicy::Unwrap => error.unwrap_cause(),
        }
    }
}
