//! Token bucket rate limiter

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bulwark_core::{Context, Result, Task, TaskError};

/// Float slack when comparing the token count against a whole token
const TOKEN_EPSILON: f64 = 1e-9;

/// `count` calls per `per`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub count: u32,
    #[serde(with = "humantime_serde")]
    pub per: Duration,
}

impl Rate {
    pub fn new(count: u32, per: Duration) -> Self {
        Self { count, per }
    }

    pub fn per_second(count: u32) -> Self {
        Self::new(count, Duration::from_secs(1))
    }

    pub fn per_minute(count: u32) -> Self {
        Self::new(count, Duration::from_secs(60))
    }

    /// Tokens added per second
    pub fn tokens_per_second(&self) -> f64 {
        self.count as f64 / self.per.as_secs_f64()
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained rate
    pub rate: Rate,

    /// Bucket capacity; defaults to `rate.count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,

    /// Longest a caller may wait for a token before failing fast
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,
}

impl RateLimitConfig {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            burst: None,
            max_wait: None,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn capacity(&self) -> u32 {
        self.burst.unwrap_or(self.rate.count)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate.count == 0 {
            return Err(TaskError::validation("rate count must be greater than zero"));
        }
        if self.rate.per.is_zero() {
            return Err(TaskError::validation("rate period must be greater than zero"));
        }
        if self.burst == Some(0) {
            return Err(TaskError::validation("burst must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
            capacity: capacity as f64,
            refill_rate,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 - TOKEN_EPSILON {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available; never zero when none is
    fn time_until_available(&self) -> Duration {
        let seconds = (1.0 - self.tokens) / self.refill_rate;
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(Duration::MAX)
            .max(Duration::from_nanos(1))
    }
}

/// Shared token bucket.
///
/// Cloning the limiter shares the bucket, so every task wrapped by clones of
/// one limiter draws from the same tokens. The bucket is refilled lazily when
/// a caller asks for a token.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
    max_wait: Option<Duration>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            bucket: Arc::new(Mutex::new(TokenBucket::new(
                config.capacity(),
                config.rate.tokens_per_second(),
            ))),
            max_wait: config.max_wait,
        })
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.bucket.lock().try_consume()
    }

    /// Tokens currently in the bucket, after refilling
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        bucket.refill();
        bucket.tokens
    }

    /// Wait for a token.
    ///
    /// Fails with [`TaskError::Cancelled`] if the context ends first, or with
    /// [`TaskError::RateLimitExceeded`] if the wait would exceed `max_wait`.
    pub async fn acquire(&self, ctx: &Context) -> Result<()> {
        loop {
            ctx.check()?;

            let wait = {
                let mut bucket = self.bucket.lock();
                if bucket.try_consume() {
                    return Ok(());
                }
                bucket.time_until_available()
            };

            if let Some(max_wait) = self.max_wait {
                if wait > max_wait {
                    warn!(
                        "Rate limit exceeded: next token in {:?}, max wait {:?}",
                        wait, max_wait
                    );
                    return Err(TaskError::RateLimitExceeded { retry_after: wait });
                }
            }

            debug!("Rate limited, waiting {:?} for a token", wait);
            ctx.sleep(wait).await?;
        }
    }

    /// Wrap `task` so every call first takes a token from this limiter
    pub fn wrap(&self, task: &Task) -> Task {
        let limiter = self.clone();
        task.decorate(move |inner, ctx| {
            let limiter = limiter.clone();
            async move {
                limiter.acquire(&ctx).await?;
                inner.call(ctx).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::CancelReason;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter(count: u32, per: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(Rate::new(count, per))).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_admits_capacity_then_refuses() {
        let limiter = limiter(3, Duration::from_secs(1));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(334)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_pressure_admits_one_call_per_interval() {
        let limiter = limiter(10, Duration::from_secs(1));
        let ctx = Context::background();

        // Drain the burst.
        for _ in 0..10 {
            limiter.acquire(&ctx).await.unwrap();
        }

        let started = Instant::now();
        for _ in 0..5 {
            limiter.acquire(&ctx).await.unwrap();
        }
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(520), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(Rate::per_second(100)).with_burst(5),
        )
        .unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.available_tokens() <= 5.0);

        while limiter.try_acquire() {}
        assert!(limiter.available_tokens() >= 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_drain_exactly_capacity() {
        const CAPACITY: u32 = 5;
        const CALLERS: usize = 40;

        // One token an hour: nothing refills while the callers race.
        let limiter = RateLimiter::new(
            RateLimitConfig::new(Rate::new(1, Duration::from_secs(3600))).with_burst(CAPACITY),
        )
        .unwrap();

        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    let admitted = limiter.try_acquire();
                    let tokens = limiter.available_tokens();
                    assert!(
                        (0.0..=CAPACITY as f64).contains(&tokens),
                        "tokens out of range: {tokens}"
                    );
                    admitted
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, CAPACITY as usize);
        let left = limiter.available_tokens();
        assert!((0.0..1.0).contains(&left), "{left}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_fails_fast() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(Rate::new(1, Duration::from_secs(10)))
                .with_max_wait(Duration::from_secs(1)),
        )
        .unwrap();
        let ctx = Context::background();

        limiter.acquire(&ctx).await.unwrap();
        let error = limiter.acquire(&ctx).await.unwrap_err();

        match error {
            TaskError::RateLimitExceeded { retry_after } => {
                assert!(retry_after > Duration::from_secs(9));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_skips_inner_task() {
        let limiter = limiter(1, Duration::from_secs(60));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let task = limiter.wrap(&Task::new(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }));

        task.call(Context::background()).await.unwrap();

        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let error = task.call(ctx).await.unwrap_err();

        assert!(matches!(
            error,
            TaskError::Cancelled(CancelReason::DeadlineExceeded)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let zero_count = RateLimitConfig::new(Rate::per_second(0));
        let zero_period = RateLimitConfig::new(Rate::new(5, Duration::ZERO));
        let zero_burst = RateLimitConfig::new(Rate::per_second(5)).with_burst(0);

        for config in [zero_count, zero_period, zero_burst] {
            assert!(matches!(
                RateLimiter::new(config),
                Err(TaskError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = "rate:\n  count: 5\n  per: 1s\nburst: 10\nmax_wait: 250ms\n";
        let config: RateLimitConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.rate, Rate::per_second(5));
        assert_eq!(config.capacity(), 10);
        assert_eq!(config.max_wait, Some(Duration::from_millis(250)));
    }
}
