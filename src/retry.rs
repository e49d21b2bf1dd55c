//! Retry and backoff for connection resolution.

use crate::error::StreamError;
use crate::transport::{ConnectionResolver, StreamsChannel};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry/backoff configuration.
///
/// Retries apply to connection resolution only. A read call that has
/// started is never re-issued.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
    /// Jitter mode for backoff delays (prevents thundering herd)
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 1.5,
            max_retries: 10,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial backoff delay
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set maximum backoff delay
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set maximum retry attempts
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set jitter mode
    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay before retry number `attempt` (zero based).
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }

    /// Calculate the next backoff delay with jitter
    pub fn next_backoff(&self, attempt: u32) -> Duration {
        apply_jitter(self.base_backoff(attempt), &self.jitter)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Jitter mode for retry backoff (following AWS SDK patterns).
#[derive(Clone, Debug, Default)]
pub enum JitterMode {
    /// No jitter - use exact backoff delay
    None,
    /// Full jitter: random delay between 0 and calculated backoff
    #[default]
    Full,
    /// Equal jitter: half fixed + half random
    Equal,
}

/// Apply jitter to a backoff delay.
pub fn apply_jitter(delay: Duration, mode: &JitterMode) -> Duration {
    let mut rng = rand::thread_rng();

    match mode {
        JitterMode::None => delay,
        JitterMode::Full => Duration::from_secs_f64(rng.gen::<f64>() * delay.as_secs_f64()),
        JitterMode::Equal => {
            let half = delay.as_secs_f64() / 2.0;
            Duration::from_secs_f64(half + rng.gen::<f64>() * half)
        }
    }
}

/// A [`ConnectionResolver`] that retries retryable failures of another
/// resolver with jittered backoff.
pub struct RetryingResolver<R> {
    inner: R,
    config: RetryConfig,
}

impl<R> RetryingResolver<R> {
    pub fn new(inner: R, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<R> ConnectionResolver for RetryingResolver<R>
where
    R: ConnectionResolver,
{
    async fn resolve(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn StreamsChannel>, StreamError> {
        let mut attempt = 0;

        loop {
            let err = match self.inner.resolve(cancel).await {
                Ok(channel) => return Ok(channel),
                Err(e) => e,
            };

            if !err.is_retryable() || !self.config.should_retry(attempt) {
                warn!(attempt, error = %err, "connection resolution failed");
                return Err(err);
            }

            let delay = self.config.next_backoff(attempt);
            debug!(attempt, ?delay, error = %err, "retrying connection resolution");
            attempt += 1;

            tokio::select! {
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
