use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::transport::{Reply, Transport};

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (counted from 0): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Transport wrapped with bounded exponential backoff. Only transport
/// failures are retried; any response that arrives is handed back as data.
pub struct RetryingFetcher<T: Transport, S: Sleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl<T: Transport, S: Sleeper> RetryingFetcher<T, S> {
    pub fn new(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn fetch(&self, url: &str) -> Result<Reply, HarvestError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            match self.transport.get(url) {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    let attempts = attempt + 1;
                    if !err.is_retryable() || attempts >= max_attempts {
                        warn!(url = %redact(url), attempts, error = %err, "giving up on request");
                        return Err(HarvestError::Transport {
                            url: redact(url),
                            attempts,
                            message: err.to_string(),
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        url = %redact(url),
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, backing off"
                    );
                    self.sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Strips the API key from a URL before it reaches logs or error messages.
pub fn redact(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let params = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("key", _)) => "key=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>();
    format!("{base}?{}", params.join("&"))
}
