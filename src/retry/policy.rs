//! Retry policy types and configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Retries after the first attempt unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay of the default policy.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Backoff cap of the default policy.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

/// How transient failures are retried.
///
/// Policies are plain data: they describe the retry budget and backoff curve
/// but never sleep themselves. Tests shrink a policy instead of touching the
/// production defaults.
///
/// The retry budget is always bounded. `max_retries(3)` means at most four
/// invocations of the operation.
///
/// # Examples
///
/// ```rust
/// use terminus::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries(), 3);
/// assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
/// assert_eq!(policy.delay_for_retry(3), None);
///
/// let fast = RetryPolicy::immediate(1);
/// assert_eq!(fast.delay_for_retry(0), Some(Duration::ZERO));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryPolicy {
    strategy: RetryStrategy,
    max_retries: u32,
    max_delay: Option<Duration>,
    jitter: JitterStrategy,
}

/// The backoff strategy for retry delays. Every strategy is non-decreasing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum RetryStrategy {
    /// Fixed delay between attempts.
    Constant(Duration),
    /// Delay increases linearly: base * (retry + 1).
    Linear {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay doubles: base * 2^retry.
    Exponential {
        /// Base delay duration.
        base: Duration,
    },
    /// Delay follows the Fibonacci sequence: base * fib(retry + 1).
    Fibonacci {
        /// Base delay duration.
        base: Duration,
    },
}

/// Randomness added to backoff delays.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum JitterStrategy {
    /// No jitter applied.
    #[default]
    None,
    /// Add ±percentage randomness to the delay.
    Proportional(f64),
    /// Random delay between 0 and the calculated delay.
    Full,
}

impl Default for RetryPolicy {
    /// Exponential backoff from 100ms, capped at 2s, with 3 retries.
    fn default() -> Self {
        RetryPolicy::exponential(DEFAULT_BASE_DELAY).with_max_delay(DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    fn with_strategy(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            max_retries: DEFAULT_MAX_RETRIES,
            max_delay: None,
            jitter: JitterStrategy::None,
        }
    }

    /// Constant delay between retries.
    pub fn constant(delay: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Constant(delay))
    }

    /// Retry with no delay at all. Meant for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self::constant(Duration::ZERO).with_max_retries(max_retries)
    }

    /// Linearly increasing delay: 100ms, 200ms, 300ms, ...
    ///
    /// ```rust
    /// use terminus::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::linear(Duration::from_millis(100)).with_max_retries(5);
    /// assert_eq!(policy.delay_for_retry(2), Some(Duration::from_millis(300)));
    /// ```
    pub fn linear(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Linear { base })
    }

    /// Exponentially increasing delay: 100ms, 200ms, 400ms, ...
    pub fn exponential(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Exponential { base })
    }

    /// Fibonacci delay: 100ms, 100ms, 200ms, 300ms, 500ms, ...
    pub fn fibonacci(base: Duration) -> Self {
        Self::with_strategy(RetryStrategy::Fibonacci { base })
    }

    /// Set the retry budget, not counting the initial attempt.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Cap every delay at `d`.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = Some(d);
        self
    }

    /// Add ±`factor` proportional jitter (clamped to 0.0..=1.0).
    ///
    /// Without the `jitter` feature this is recorded but has no effect.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = JitterStrategy::Proportional(factor.clamp(0.0, 1.0));
        self
    }

    /// Use full jitter: anywhere between zero and the calculated delay.
    ///
    /// Without the `jitter` feature this is recorded but has no effect.
    pub fn with_full_jitter(mut self) -> Self {
        self.jitter = JitterStrategy::Full;
        self
    }

    /// The retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts the policy allows: the initial one plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The delay cap.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// The jitter strategy.
    pub fn jitter(&self) -> &JitterStrategy {
        &self.jitter
    }

    /// The backoff strategy.
    pub fn strategy(&self) -> &RetryStrategy {
        &self.strategy
    }

    /// The un-jittered delay before retry `retry` (0-indexed).
    ///
    /// Returns `None` once the retry budget is spent.
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }

        let base_delay = match &self.strategy {
            RetryStrategy::Constant(d) => *d,
            RetryStrategy::Linear { base } => base.saturating_mul(retry.saturating_add(1)),
            RetryStrategy::Exponential { base } => base.saturating_mul(2u32.saturating_pow(retry)),
            RetryStrategy::Fibonacci { base } => {
                base.saturating_mul(fibonacci(retry.saturating_add(1)))
            }
        };

        Some(self.cap(base_delay))
    }

    /// The delay actually slept before retry `retry`.
    ///
    /// Jitter is applied, then the result is raised to at least `prev_delay`
    /// so that realized delays never shrink from one retry to the next.
    pub fn next_delay(&self, retry: u32, prev_delay: Option<Duration>) -> Option<Duration> {
        let base_delay = self.delay_for_retry(retry)?;
        let jittered = self.cap(self.jitter.apply(base_delay));
        Some(match prev_delay {
            Some(prev) => jittered.max(self.cap(prev)),
            None => jittered,
        })
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay.
    pub fn apply(&self, base_delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => base_delay,
            #[cfg(feature = "jitter")]
            JitterStrategy::Proportional(factor) => {
                use rand::Rng;
                let base_millis = base_delay.as_millis() as f64;
                let spread = base_millis * factor;
                let min = (base_millis - spread).max(0.0);
                let max = base_millis + spread;
                if max <= min {
                    base_delay
                } else {
                    let millis = rand::rng().random_range(min..=max);
                    Duration::from_millis(millis as u64)
                }
            }
            #[cfg(feature = "jitter")]
            JitterStrategy::Full => {
                use rand::Rng;
                let max_millis = base_delay.as_millis() as u64;
                if max_millis == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=max_millis))
                }
            }
            #[cfg(not(feature = "jitter"))]
            JitterStrategy::Proportional(_) | JitterStrategy::Full => base_delay,
        }
    }
}

fn fibonacci(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut a = 0u32;
    let mut b = 1u32;
    for _ in 1..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    b
}
