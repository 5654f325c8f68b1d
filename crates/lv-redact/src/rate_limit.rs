//! Keyed sliding window rate limiter.
//!
//! Each key owns a log of recent event instants (sliding log approach). A
//! request is allowed while fewer than `max_requests` instants fall inside
//! the trailing window. Buckets are created on first use and purged by a
//! time-based sweep across all keys, so abandoned keys do not accumulate.
//!
//! ```text
//! is_allowed(key) → [sweep if due] → bucket(key) → prune → count < max?
//!                                                      ↓ yes
//!                                                  record now
//! ```

use crate::error::{RedactError, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Configuration for a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum events per key within one window.
    pub max_requests: usize,
    /// Length of the trailing window.
    pub window: Duration,
    /// How often expired instants are purged across all buckets.
    pub cleanup_interval: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cleanup_interval: Duration::from_secs(300),
        }
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Conservative limits for production systems.
    pub fn strict() -> Self {
        Self::new(50, Duration::from_secs(60))
    }

    /// Generous limits for development.
    pub fn relaxed() -> Self {
        Self::new(200, Duration::from_secs(60))
    }

    /// Effectively unlimited, for test suites.
    pub fn testing() -> Self {
        Self::new(1000, Duration::from_secs(60))
    }

    /// Build a configuration from a named profile.
    pub fn from_profile(profile: RateLimitProfile) -> Self {
        match profile {
            RateLimitProfile::Strict => Self::strict(),
            RateLimitProfile::Default => Self::default(),
            RateLimitProfile::Relaxed => Self::relaxed(),
            RateLimitProfile::Testing => Self::testing(),
        }
    }

    /// Reject settings that could never allow anything.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(RedactError::InvalidRateLimit(
                "max_requests must be at least 1".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(RedactError::InvalidRateLimit(
                "window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

/// Named rate limit presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitProfile {
    Strict,
    Default,
    Relaxed,
    Testing,
}

impl FromStr for RateLimitProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" | "production" => Ok(RateLimitProfile::Strict),
            "default" => Ok(RateLimitProfile::Default),
            "relaxed" | "development" => Ok(RateLimitProfile::Relaxed),
            "testing" | "test" => Ok(RateLimitProfile::Testing),
            _ => Err(format!("unknown rate limit profile: {}", s)),
        }
    }
}

impl fmt::Display for RateLimitProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitProfile::Strict => write!(f, "strict"),
            RateLimitProfile::Default => write!(f, "default"),
            RateLimitProfile::Relaxed => write!(f, "relaxed"),
            RateLimitProfile::Testing => write!(f, "testing"),
        }
    }
}

/// Snapshot of one key's usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    /// Events inside the current window.
    pub current: usize,
    /// Events still allowed inside the current window.
    pub remaining: usize,
    /// Configured maximum.
    pub limit: usize,
    /// Time until the oldest event leaves the window.
    pub reset_in: Duration,
}

#[derive(Debug)]
struct LimiterState {
    buckets: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

/// Sliding window rate limiter keyed by string.
///
/// Thread-safe; all buckets sit behind one mutex owned by the limiter.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter, rejecting unusable configurations.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check a key and record the request when it is allowed.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    pub(crate) fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.lock();
        if now.saturating_duration_since(state.last_sweep) >= self.config.cleanup_interval {
            self.sweep(&mut state, now);
        }

        let window = self.config.window;
        let bucket = state.buckets.entry(key.to_string()).or_default();
        prune(bucket, now, window);

        if bucket.len() < self.config.max_requests {
            bucket.push_back(now);
            true
        } else {
            false
        }
    }

    /// Requests still allowed for `key` in the current window.
    pub fn remaining(&self, key: &str) -> usize {
        self.stats_at(key, Instant::now()).remaining
    }

    /// Time until the oldest recorded request for `key` expires.
    pub fn time_until_reset(&self, key: &str) -> Duration {
        self.stats_at(key, Instant::now()).reset_in
    }

    /// Usage snapshot for `key`.
    pub fn stats(&self, key: &str) -> RateLimitStats {
        self.stats_at(key, Instant::now())
    }

    pub(crate) fn stats_at(&self, key: &str, now: Instant) -> RateLimitStats {
        let state = self.lock();
        let window = self.config.window;
        let (current, reset_in) = match state.buckets.get(key) {
            Some(bucket) => {
                let live: Vec<&Instant> = bucket
                    .iter()
                    .filter(|&&ts| now.saturating_duration_since(ts) < window)
                    .collect();
                let reset_in = live
                    .first()
                    .map(|&&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
                    .unwrap_or_default();
                (live.len(), reset_in)
            }
            None => (0, Duration::ZERO),
        };

        RateLimitStats {
            current,
            remaining: self.config.max_requests.saturating_sub(current),
            limit: self.config.max_requests,
            reset_in,
        }
    }

    /// Drop every bucket.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.buckets.clear();
        state.last_sweep = Instant::now();
    }

    /// Drop a single bucket.
    pub fn reset_key(&self, key: &str) {
        self.lock().buckets.remove(key);
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Keys with a live bucket.
    pub fn keys(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    fn sweep(&self, state: &mut LimiterState, now: Instant) {
        let window = self.config.window;
        state.buckets.retain(|_, bucket| {
            prune(bucket, now, window);
            !bucket.is_empty()
        });
        state.last_sweep = now;
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // A panic while holding the lock leaves only timestamps behind; they
        // are still consistent enough to keep limiting.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop instants that fell out of the window. Instants are pushed in order,
/// so expired ones are always at the front.
fn prune(bucket: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&ts) = bucket.front() {
        if now.saturating_duration_since(ts) >= window {
            bucket.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig::new(3, Duration::from_secs(10))
    }

    #[test]
    fn test_basic_rate_limiting() {
        let limiter = SlidingWindowRateLimiter::new(test_config()).unwrap();
        let now = Instant::now();

        assert!(limiter.is_allowed_at("general", now));
        assert!(limiter.is_allowed_at("general", now));
        assert!(limiter.is_allowed_at("general", now));
        assert!(!limiter.is_allowed_at("general", now));

        // Other keys have their own bucket
        assert!(limiter.is_allowed_at("json", now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowRateLimiter::new(test_config()).unwrap();
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.is_allowed_at("k", start));
        }
        assert!(!limiter.is_allowed_at("k", start + Duration::from_secs(9)));
        assert!(limiter.is_allowed_at("k", start + Duration::from_secs(10)));
    }

    #[test]
    fn test_stats() {
        let limiter = SlidingWindowRateLimiter::new(test_config()).unwrap();
        let start = Instant::now();
        limiter.is_allowed_at("k", start);
        limiter.is_allowed_at("k", start + Duration::from_secs(2));

        let stats = limiter.stats_at("k", start + Duration::from_secs(4));
        assert_eq!(stats.current, 2);
        assert_eq!(stats.remaining, 1);
        assert_eq!(stats.limit, 3);
        assert_eq!(stats.reset_in, Duration::from_secs(6));

        let unknown = limiter.stats_at("nope", start);
        assert_eq!(unknown.current, 0);
        assert_eq!(unknown.remaining, 3);
        assert_eq!(unknown.reset_in, Duration::ZERO);
    }

    #[test]
    fn test_sweep_purges_abandoned_keys() {
        let config = test_config().with_cleanup_interval(Duration::from_secs(30));
        let limiter = SlidingWindowRateLimiter::new(config).unwrap();
        let start = Instant::now();

        limiter.is_allowed_at("abandoned-1", start);
        limiter.is_allowed_at("abandoned-2", start);
        assert_eq!(limiter.bucket_count(), 2);

        // Next call after the cleanup interval sweeps every bucket
        limiter.is_allowed_at("fresh", start + Duration::from_secs(60));
        assert_eq!(limiter.keys(), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_reset() {
        let limiter = SlidingWindowRateLimiter::new(test_config()).unwrap();
        for _ in 0..3 {
            limiter.is_allowed("k");
        }
        assert!(!limiter.is_allowed("k"));

        limiter.reset_key("k");
        assert!(limiter.is_allowed("k"));

        limiter.reset();
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SlidingWindowRateLimiter::new(RateLimitConfig::new(0, Duration::from_secs(1))).is_err());
        assert!(SlidingWindowRateLimiter::new(RateLimitConfig::new(1, Duration::ZERO)).is_err());
    }

    #[test]
    fn test_profiles() {
        assert_eq!("production".parse::<RateLimitProfile>().unwrap(), RateLimitProfile::Strict);
        assert_eq!(RateLimitConfig::from_profile(RateLimitProfile::Strict).max_requests, 50);
        assert_eq!(RateLimitConfig::from_profile(RateLimitProfile::Default).max_requests, 100);
        assert_eq!(RateLimitConfig::from_profile(RateLimitProfile::Relaxed).max_requests, 200);
        assert!("bogus".parse::<RateLimitProfile>().is_err());
    }
}
