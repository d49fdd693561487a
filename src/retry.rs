//! Retry Policy Executor
//!
//! Bounded retries with exponential backoff and proportional jitter. The delay before
//! attempt `n + 1` is `min(cap, base * multiplier^(n - 1))`, jittered, then clamped to the
//! cap again. A server supplied retry-after hint raises the delay but never past the cap.

use crate::config::RetryConfig;
use crate::error::{CapabilityError, PipelineError};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Whether a failure may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable { retry_after: Option<Duration> },
    Fatal,
}

pub trait Classify {
    fn classify(&self) -> ErrorClass;
}

impl Classify for CapabilityError {
    fn classify(&self) -> ErrorClass {
        match self {
            CapabilityError::Transient(_) => ErrorClass::Retryable { retry_after: None },
            CapabilityError::RateLimited { retry_after, .. } => ErrorClass::Retryable {
                retry_after: *retry_after,
            },
            CapabilityError::Auth(_)
            | CapabilityError::MalformedRequest(_)
            | CapabilityError::MalformedOutput(_) => ErrorClass::Fatal,
        }
    }
}

impl Classify for PipelineError {
    fn classify(&self) -> ErrorClass {
        match self {
            PipelineError::TransientNetwork(_) => ErrorClass::Retryable { retry_after: None },
            PipelineError::RateLimit {
                retry_after_secs, ..
            } => ErrorClass::Retryable {
                retry_after: retry_after_secs.map(Duration::from_secs),
            },
            _ => ErrorClass::Fatal,
        }
    }
}

/// Outcome of an operation that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// A non-retryable failure; no further attempts were made
    Fatal { error: E, attempts: u32 },
    /// Every attempt failed with a retryable error
    Exhausted {
        last: E,
        attempts: u32,
        elapsed: Duration,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Translate into the pipeline taxonomy, naming the stage that failed
    pub fn into_pipeline_error(self, stage: &str) -> PipelineError
    where
        E: Into<PipelineError>,
    {
        match self {
            RetryError::Fatal { error, .. } => error.into(),
            RetryError::Exhausted {
                last,
                attempts,
                elapsed,
            } => PipelineError::RetriesExhausted {
                stage: stage.to_string(),
                attempts,
                elapsed_ms: elapsed.as_millis(),
                last: Box::new(last.into()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Proportional jitter, 0.2 means +/-20%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based)
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    /// Apply jitter for a sample in `[-1.0, 1.0]`, clamped to `[0, cap]`
    pub fn jittered(&self, nominal: Duration, sample: f64) -> Duration {
        let factor = 1.0 + self.jitter * sample.clamp(-1.0, 1.0);
        let secs = (nominal.as_secs_f64() * factor).max(0.0);
        if secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay to sleep before retry number `retry`
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let sample = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        let delay = self.jittered(self.nominal_delay(retry), sample);
        match retry_after {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let start = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retry_after = match error.classify() {
                ErrorClass::Fatal => {
                    warn!(
                        operation = name,
                        attempt,
                        error = %error,
                        "Non-retryable failure"
                    );
                    return Err(RetryError::Fatal {
                        error,
                        attempts: attempt,
                    });
                }
                ErrorClass::Retryable { retry_after } => retry_after,
            };

            if attempt >= max_attempts {
                warn!(
                    operation = name,
                    attempts = attempt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    last: error,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            let delay = self.delay_for(attempt, retry_after);
            warn!(
                operation = name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable failure, backing off"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
