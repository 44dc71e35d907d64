//! [`LogThrottle`] – keeps hot loops from flooding the log.
//!
//! Wraps a `governor` direct rate limiter and counts how many lines were
//! suppressed since the last one that got through, so the next emitted line
//! can report the gap.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

pub struct LogThrottle {
    limiter: Option<DefaultDirectRateLimiter>,
    suppressed: AtomicU64,
}

impl LogThrottle {
    /// Allow at most `per_second` lines per second (minimum 1).
    pub fn per_second(per_second: u32) -> Self {
        let n = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(Quota::per_second(n))
    }

    /// Allow one line per `period`. A zero period means no limit.
    pub fn every(period: Duration) -> Self {
        match Quota::with_period(period) {
            Some(quota) => Self::with_quota(quota),
            None => Self::unlimited(),
        }
    }

    /// A throttle that lets everything through.
    pub fn unlimited() -> Self {
        Self {
            limiter: None,
            suppressed: AtomicU64::new(0),
        }
    }

    fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: Some(RateLimiter::direct(quota)),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns `Some(suppressed)` when a line may be emitted now, where
    /// `suppressed` is the number of lines dropped since the previous one.
    pub fn allow(&self) -> Option<u64> {
        match &self.limiter {
            None => Some(0),
            Some(limiter) => match limiter.check() {
                Ok(()) => Some(self.suppressed.swap(0, Ordering::Relaxed)),
                Err(_) => {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
        }
    }
}

impl std::fmt::Debug for LogThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogThrottle")
            .field("limited", &self.limiter.is_some())
            .field("suppressed", &self.suppressed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_one_then_suppressed() {
        let throttle = LogThrottle::per_second(1);
        assert_eq!(throttle.allow(), Some(0));
        assert_eq!(throttle.allow(), None);
        assert_eq!(throttle.allow(), None);
    }

    #[test]
    fn unlimited_always_allows() {
        let throttle = LogThrottle::unlimited();
        for _ in 0..100 {
            assert_eq!(throttle.allow(), Some(0));
        }
    }

    #[test]
    fn suppressed_count_is_reported_on_next_allowed_line() {
        let throttle = LogThrottle::every(Duration::from_millis(20));
        assert!(throttle.allow().is_some());
        assert!(throttle.allow().is_none());
        assert!(throttle.allow().is_none());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(throttle.allow(), Some(2));
    }

    #[test]
    fn zero_rate_is_clamped_to_one() {
        let throttle = LogThrottle::per_second(0);
        assert!(throttle.allow().is_some());
    }
}
