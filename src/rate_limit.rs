//! Token bucket rate limiter, backed by `governor`'s GCRA implementation
//! rather than hand-rolled `Instant` bookkeeping, the same way
//! `examples/SaintPepsi-spiral-core/src/rate_limit.rs` builds its request
//! limiters on `governor::{Quota, RateLimiter}`.
//!
//! `governor`'s stable API only exposes a test-and-consume `check()` — there
//! is no non-consuming peek at remaining burst capacity or wait time.
//! `remaining_tokens` and `time_until_next_token_ms` therefore report the
//! outcome of the most recent `acquire_token` call rather than a live query;
//! they answer "what did the last decision say", not "what is true right
//! now". Callers that need a fresh answer should call `acquire_token` again.

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub tokens_per_interval: u32,
    pub interval_ms: u64,
    pub max_tokens: u32,
}

fn build_quota(config: &RateLimiterConfig) -> Quota {
    let cells_per_interval = config.tokens_per_interval.max(1);
    let period = Duration::from_millis(config.interval_ms.max(1)) / cells_per_interval;
    Quota::with_period(period)
        .expect("interval_ms must be positive")
        .allow_burst(NonZeroU32::new(config.max_tokens.max(1)).unwrap())
}

#[derive(Debug, Clone, Copy)]
struct LastCheck {
    allowed: bool,
    wait: Duration,
}

/// Single (non-keyed) token bucket. `acquire_token` is the only call that
/// consults `governor`; `remaining_tokens` and `time_until_next_token_ms`
/// replay the last decision (see module docs).
pub struct TokenBucket {
    config: RateLimiterConfig,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
    last: Mutex<LastCheck>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            limiter: RateLimiter::direct(build_quota(&config)),
            clock: DefaultClock::default(),
            last: Mutex::new(LastCheck { allowed: true, wait: Duration::ZERO }),
            config,
        }
    }

    /// Attempt to consume one token. Returns `true` and records the outcome
    /// for `remaining_tokens`/`time_until_next_token_ms` to report.
    pub async fn acquire_token(&self) -> bool {
        match self.limiter.check() {
            Ok(()) => {
                *self.last.lock().unwrap() = LastCheck { allowed: true, wait: Duration::ZERO };
                true
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                *self.last.lock().unwrap() = LastCheck { allowed: false, wait };
                false
            }
        }
    }

    pub async fn remaining_tokens(&self) -> u32 {
        if self.last.lock().unwrap().allowed {
            self.config.max_tokens
        } else {
            0
        }
    }

    /// Milliseconds until a token will next be available, as of the last
    /// `acquire_token` call. `0` if that call succeeded.
    pub async fn time_until_next_token_ms(&self) -> u64 {
        self.last.lock().unwrap().wait.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> TokenBucket {
        TokenBucket::new(RateLimiterConfig {
            tokens_per_interval: 10,
            interval_ms: 1000,
            max_tokens: 20,
        })
    }

    #[tokio::test]
    async fn exhausts_then_refuses() {
        let bucket = bucket();
        let mut allowed = 0;
        while bucket.acquire_token().await {
            allowed += 1;
        }
        assert_eq!(allowed, 20);
        assert_eq!(bucket.remaining_tokens().await, 0);
    }

    #[tokio::test]
    async fn time_until_next_token_is_positive_once_exhausted() {
        let bucket = bucket();
        while bucket.acquire_token().await {}
        assert!(bucket.time_until_next_token_ms().await > 0);
    }

    #[tokio::test]
    async fn refills_after_interval_elapses() {
        let bucket = TokenBucket::new(RateLimiterConfig {
            tokens_per_interval: 10,
            interval_ms: 50,
            max_tokens: 20,
        });
        while bucket.acquire_token().await {}
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(bucket.acquire_token().await);
    }

    #[tokio::test]
    async fn remaining_tokens_reports_max_before_any_calls() {
        let bucket = bucket();
        assert_eq!(bucket.remaining_tokens().await, 20);
    }
}
