//! Token bucket rate limiter implementation.
//!
//! Tokens accrue continuously at `rate` per second up to `burst`. The level is
//! recomputed from elapsed time on every call, so no timer runs per bucket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{Clock, GlobalLimitConfig, MonotonicClock, RateLimitState};

/// Token bucket rate limiter.
///
/// Each admitted request consumes one token. `0 <= level <= burst` holds at
/// every observation point.
pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,

    /// Maximum tokens (bucket capacity).
    burst: u32,

    /// Current level and last refill time, updated together.
    state: Mutex<BucketState>,

    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    level: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket using the monotonic system clock.
    ///
    /// # Arguments
    ///
    /// * `rate_per_second` - Tokens added per second; `0` never refills
    /// * `burst` - Bucket capacity; `0` never admits
    #[must_use]
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        Self::with_clock(rate_per_second, burst, Arc::new(MonotonicClock))
    }

    /// Create a full bucket reading time from `clock`.
    ///
    /// Negative or non-finite rates are treated as `0`.
    #[must_use]
    pub fn with_clock(rate_per_second: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        let rate = if rate_per_second.is_finite() && rate_per_second > 0.0 {
            rate_per_second
        } else {
            0.0
        };
        let now = clock.now();
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                level: f64::from(burst),
                last_refill: now,
            }),
            clock,
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &GlobalLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(config.rate_per_second, config.burst, clock)
    }

    /// Tokens added per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }

    /// Try to consume one token.
    ///
    /// Returns `true` if the request is admitted. A rejection leaves the level
    /// untouched apart from the refill.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.level >= 1.0 {
            state.level -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens available right now.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        whole_tokens(state.level)
    }

    /// Time until one whole token is available.
    ///
    /// `Duration::MAX` when the bucket is empty and never refills.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        self.time_until_token(state.level)
    }

    /// Get the current state as a snapshot.
    #[must_use]
    pub fn state(&self) -> RateLimitState {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        let remaining = whole_tokens(state.level);

        RateLimitState {
            limit: self.burst,
            remaining,
            reset_after: self.time_until_token(state.level),
            is_limited: remaining == 0,
        }
    }

    /// Refill the bucket to capacity.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.level = f64::from(self.burst);
        state.last_refill = now;
    }

    /// Add tokens for the time elapsed since the last refill.
    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let added = elapsed.as_secs_f64() * self.rate;
        state.level = (state.level + added).min(f64::from(self.burst));
        state.last_refill = now;
    }

    fn time_until_token(&self, level: f64) -> Duration {
        if level >= 1.0 {
            return Duration::ZERO;
        }
        if self.rate == 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64((1.0 - level) / self.rate).unwrap_or(Duration::MAX)
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("TokenBucket")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("level", &state.level)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_tokens(level: f64) -> u32 {
    level.floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn bucket(rate: f64, burst: u32) -> (TokenBucket, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bucket = TokenBucket::with_clock(rate, burst, Arc::clone(&clock) as Arc<dyn Clock>);
        (bucket, clock)
    }

    #[test]
    fn test_token_bucket_basic() {
        let (limiter, _clock) = bucket(5.0, 5);

        for _ in 0..5 {
            assert!(limiter.allow());
        }

        assert!(!limiter.allow());
    }

    #[test]
    fn test_token_bucket_refill() {
        let (limiter, clock) = bucket(10.0, 2);

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        clock.advance(Duration::from_millis(150));

        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let (limiter, clock) = bucket(100.0, 3);
        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.remaining(), 3);
    }

    #[test]
    fn test_fractional_refill_accumulates() {
        let (limiter, clock) = bucket(4.0, 1);
        assert!(limiter.allow());

        // 0.125s * 4/s = 0.5 tokens, not enough
        clock.advance(Duration::from_millis(125));
        assert!(!limiter.allow());

        // the half token earned above is kept
        clock.advance(Duration::from_millis(125));
        assert!(limiter.allow());
    }

    #[test]
    fn test_zero_rate_never_refills() {
        let (limiter, clock) = bucket(0.0, 2);
        assert!(limiter.allow());
        assert!(limiter.allow());

        clock.advance(Duration::from_secs(3600));
        assert!(!limiter.allow());
        assert_eq!(limiter.wait_time(), Duration::MAX);
    }

    #[test]
    fn test_zero_burst_never_admits() {
        let (limiter, clock) = bucket(1000.0, 0);
        assert!(!limiter.allow());
        clock.advance(Duration::from_secs(10));
        assert!(!limiter.allow());
    }

    #[test]
    fn test_negative_rate_treated_as_zero() {
        let limiter = TokenBucket::new(-5.0, 1);
        assert!(limiter.rate() == 0.0);
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_token_bucket_state() {
        let (limiter, _clock) = bucket(10.0, 10);

        let state = limiter.state();
        assert_eq!(state.limit, 10);
        assert_eq!(state.remaining, 10);
        assert_eq!(state.reset_after, Duration::ZERO);
        assert!(!state.is_limited);

        for _ in 0..7 {
            limiter.allow();
        }

        let state = limiter.state();
        assert_eq!(state.remaining, 3);
    }

    #[test]
    fn test_wait_time_when_empty() {
        let (limiter, _clock) = bucket(2.0, 1);
        assert!(limiter.allow());
        assert_eq!(limiter.wait_time(), Duration::from_millis(500));
        assert!(limiter.state().is_limited);
    }

    #[test]
    fn test_reset_refills() {
        let (limiter, _clock) = bucket(0.0, 3);
        while limiter.allow() {}
        limiter.reset();
        assert_eq!(limiter.remaining(), 3);
    }

    #[test]
    fn test_concurrent_allow_never_over_admits() {
        let limiter = Arc::new(bucket(0.0, 50).0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow()).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
