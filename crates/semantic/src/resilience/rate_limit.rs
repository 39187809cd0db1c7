//! Client-side rate limiting for provider calls.
//!
//! Each provider instance owns its own [`TokenBucket`]; there is no process
//! wide limiter. Waiting happens on the tokio timer so a throttled call
//! never blocks a runtime worker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Requests that may be issued back to back from a full bucket.
    pub burst_size: u64,
    /// Longest a caller waits for a token before giving up (0 = never wait).
    #[serde(with = "crate::serde_millis")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            burst_size: 10,
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_burst_size(mut self, burst: u64) -> Self {
        self.burst_size = burst;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter.
#[derive(Debug)]
pub struct TokenBucket {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    granted: AtomicU64,
    waited: AtomicU64,
    rejected: AtomicU64,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: config.burst_size as f64,
                last_refill: Instant::now(),
            }),
            granted: AtomicU64::new(0),
            waited: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take a token if one is available. On failure returns how long until
    /// the next token is due.
    fn take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = (state.tokens + elapsed * self.config.requests_per_second)
            .min(self.config.burst_size as f64);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        if self.config.requests_per_second <= 0.0 {
            return Err(self.config.max_wait);
        }
        let missing = 1.0 - state.tokens;
        Err(Duration::from_secs_f64(
            missing / self.config.requests_per_second,
        ))
    }

    pub fn try_acquire(&self) -> bool {
        match self.take() {
            Ok(()) => {
                self.granted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait for a token, up to `max_wait`.
    pub async fn acquire(&self) -> Result<(), ProviderError> {
        let start = Instant::now();
        let mut slept = false;

        loop {
            let wait = match self.take() {
                Ok(()) => {
                    self.granted.fetch_add(1, Ordering::Relaxed);
                    if slept {
                        self.waited.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(());
                }
                Err(wait) => wait,
            };

            let remaining = self.config.max_wait.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(ProviderError::RateLimited);
            }
            tokio::time::sleep(wait.min(remaining).max(Duration::from_millis(1))).await;
            slept = true;
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let available_tokens = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens;
        RateLimitStats {
            available_tokens,
            granted: self.granted.load(Ordering::Relaxed),
            waited: self.waited.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub available_tokens: f64,
    pub granted: u64,
    /// Grants that had to sleep first.
    pub waited: u64,
    pub rejected: u64,
}
