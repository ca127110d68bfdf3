//! Backoff strategies for retry policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,

    /// delay = initial_delay * attempt
    Linear,

    /// delay = initial_delay * base^(attempt-1)
    Exponential {
        /// Growth factor (2.0 doubles the delay each attempt)
        base: f64,
    },

    /// delay = initial_delay * fib(attempt)
    Fibonacci,

    /// Explicit delays per attempt; the last one repeats
    Custom {
        /// Delays in milliseconds for each attempt
        delays_ms: Vec<u64>,
    },
}

/// Delay calculator for one strategy
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn new(
        strategy: BackoffStrategy,
        initial_delay: Duration,
        max_delay: Duration,
        jitter: bool,
    ) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Delay to wait after the given (1-indexed) failed attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt).min(self.max_delay);

        if self.jitter {
            // Jitter may push past the cap by at most 20%; clamp again.
            add_jitter(capped).min(self.max_delay)
        } else {
            capped
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,

            BackoffStrategy::Linear => self.scaled(attempt as f64),

            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
                self.scaled(base.powi(exponent))
            }

            BackoffStrategy::Fibonacci => self.scaled(fibonacci(attempt) as f64),

            BackoffStrategy::Custom { delays_ms } => {
                let index = (attempt as usize).saturating_sub(1);
                delays_ms
                    .get(index)
                    .or_else(|| delays_ms.last())
                    .map(|&ms| Duration::from_millis(ms))
                    .unwrap_or(self.max_delay)
            }
        }
    }

    /// initial_delay * factor, clamped into [0, max_delay]
    fn scaled(&self, factor: f64) -> Duration {
        let nanos = self.initial_delay.as_nanos() as f64 * factor;

        if nanos.is_nan() || nanos <= 0.0 {
            Duration::ZERO
        } else if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();

    // ±20% jitter
    let jitter_factor = rng.gen_range(0.8..1.2);
    Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
}

/// nth Fibonacci number (1-indexed), saturating
fn fibonacci(n: u32) -> u64 {
    match n {
        0 => 0,
        1 | 2 => 1,
        _ => {
            let (mut a, mut b) = (1u64, 1u64);
            for _ in 2..n {
                let next = a.saturating_add(b);
                a = b;
                b = next;
            }
            b
        }
    }
}
