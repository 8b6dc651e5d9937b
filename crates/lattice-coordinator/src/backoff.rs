//! Bounded exponential backoff for coordinator-level retries.

use std::time::Duration;

/// Capped doubling schedule: `base * 2^attempt`, clamped to `cap`,
/// exhausted after `max_retries` attempts. Deterministic; the callers
/// are already spread in time by consensus deadlines, so no jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            cap: Duration::from_secs(30),
            max_retries: 4,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_retries: u32) -> Self {
        Self {
            base,
            cap,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (zero-based), or `None` when
    /// the schedule is exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        let b = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 10);
        assert_eq!(b.delay(0), Some(Duration::from_millis(100)));
        assert_eq!(b.delay(1), Some(Duration::from_millis(200)));
        assert_eq!(b.delay(2), Some(Duration::from_millis(400)));
        assert_eq!(b.delay(3), Some(Duration::from_millis(500)));
        assert_eq!(b.delay(9), Some(Duration::from_millis(500)));
    }

    #[test]
    fn exhausts_after_max_retries() {
        let b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 3);
        assert!(b.delay(2).is_some());
        assert!(b.delay(3).is_none());
        assert!(b.delay(100).is_none());
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let b = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), u32::MAX);
        assert_eq!(b.delay(40), Some(Duration::from_secs(60)));
        assert_eq!(b.delay(4_000_000), Some(Duration::from_secs(60)));
    }
}
