//! Call-level resilience for external providers: bounded retry with
//! backoff and client-side rate limiting.

mod rate_limit;
mod retry;

pub use rate_limit::{RateLimitConfig, RateLimitStats, TokenBucket};
pub use retry::{retry_async, RetryOutcome, RetryPolicy, Retryable};
