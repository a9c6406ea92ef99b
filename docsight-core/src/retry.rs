//! Backoff schedule for backend calls.
//!
//! Only [`BackendError::Transient`] failures are retried. Rejected and fatal
//! failures surface on the first attempt.

use crate::error::BackendError;
use config::EnrichmentSettings;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Calls per image, the first one included
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &EnrichmentSettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// One call, no backoff
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before call number `attempt`, counting the first call as 0.
    ///
    /// Doubles from `base_delay` per retry up to `max_delay`, then spreads
    /// the result by a quarter either way so parallel workers hitting the
    /// same rate limit do not retry in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retry) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let doubled = self.base_delay.saturating_mul(2u32.saturating_pow(retry));
        let nominal = doubled.min(self.max_delay).as_millis() as u64;

        let spread = nominal / 4;
        if spread == 0 {
            return Duration::from_millis(nominal);
        }
        Duration::from_millis(nominal - spread + rand::random_range(0..spread * 2))
    }

    /// Call `attempt` until it returns a record-worthy response, a
    /// non-transient error, or the attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, mut attempt: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut call = 0;
        loop {
            let delay = self.delay_for_attempt(call);
            if !delay.is_zero() {
                debug!(call, ?delay, "Backing off before backend call");
                sleep(delay).await;
            }

            let error = match attempt().await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            call += 1;
            if !error.is_retryable() || call >= self.max_attempts {
                return Err(error);
            }
            warn!(
                call,
                max_attempts = self.max_attempts,
                error = %error,
                "Transient backend failure"
            );
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&EnrichmentSettings::default())
    }
}
