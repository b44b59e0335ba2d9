//! Anti-abuse rate limiting
//!
//! Enforces a process-wide daily message cap and a per-sender cap over a
//! trailing one-hour window. Exceeding a limit is a normal boolean
//! outcome, never an error: the caller decides whether to silently drop
//! (daily cap) or reply with a throttling notice (per-sender cap).

use crate::config::RATE_WINDOW_SECS;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

struct Inner {
    /// Per-sender message timestamps within the trailing window,
    /// pruned lazily on each check
    senders: HashMap<String, Vec<DateTime<Utc>>>,
    daily_count: u32,
    last_reset: NaiveDate,
}

/// Tracks daily and per-sender message volume
pub struct RateLimiter {
    max_per_day: u32,
    max_per_sender: usize,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    /// Create a limiter with the given caps
    #[must_use]
    pub fn new(max_per_day: u32, max_per_sender: usize) -> Self {
        Self {
            max_per_day,
            max_per_sender,
            inner: Mutex::new(Inner {
                senders: HashMap::new(),
                daily_count: 0,
                last_reset: Utc::now().date_naive(),
            }),
        }
    }

    /// Whether the bot may process another message today.
    ///
    /// Resets the daily counter and clears all per-sender records when
    /// the calendar date has rolled over since the last check.
    #[must_use]
    pub fn check_daily_limit(&self) -> bool {
        self.check_daily_limit_at(Utc::now())
    }

    /// Whether `sender` may send another message within the trailing hour.
    ///
    /// Accepting records the attempt; a rejected attempt is not recorded,
    /// so it cannot extend the sender's own throttling window.
    #[must_use]
    pub fn check_rate_limit(&self, sender: &str) -> bool {
        self.check_rate_limit_at(sender, Utc::now())
    }

    /// Count one successfully processed inbound message.
    ///
    /// Called once per processed message, not once per check.
    pub fn increment_daily_count(&self) {
        self.lock_inner().daily_count += 1;
    }

    /// Messages processed today
    #[must_use]
    pub fn daily_count(&self) -> u32 {
        self.lock_inner().daily_count
    }

    /// Distinct senders with at least one recorded message in the window
    #[must_use]
    pub fn active_senders(&self) -> usize {
        self.lock_inner().senders.len()
    }

    pub(crate) fn check_daily_limit_at(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock_inner();
        let today = now.date_naive();
        if today != inner.last_reset {
            debug!("📅 Daily counter reset ({} -> {})", inner.last_reset, today);
            inner.daily_count = 0;
            inner.last_reset = today;
            inner.senders.clear();
        }
        inner.daily_count < self.max_per_day
    }

    pub(crate) fn check_rate_limit_at(&self, sender: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock_inner();
        let window_start = now - ChronoDuration::seconds(RATE_WINDOW_SECS);

        let record = inner.senders.entry(sender.to_string()).or_default();
        record.retain(|ts| *ts > window_start);

        if record.len() >= self.max_per_sender {
            warn!("⚠️ Sender {sender} exceeded the hourly limit");
            return false;
        }

        record.push(now);
        true
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 10;

    fn limiter() -> RateLimiter {
        RateLimiter::new(200, CAP)
    }

    #[test]
    fn test_per_sender_cap_rejects_excess() {
        let limiter = limiter();
        let now = Utc::now();

        for i in 0..CAP {
            assert!(
                limiter.check_rate_limit_at("591700", now),
                "attempt {i} should be admitted"
            );
        }
        assert!(!limiter.check_rate_limit_at("591700", now));
    }

    #[test]
    fn test_per_sender_cap_releases_after_window() {
        let limiter = limiter();
        let start = Utc::now();

        for _ in 0..CAP {
            assert!(limiter.check_rate_limit_at("591700", start));
        }
        assert!(!limiter.check_rate_limit_at("591700", start));

        // Once the oldest timestamp ages past one hour, the sender is
        // admitted again
        let later = start + ChronoDuration::seconds(RATE_WINDOW_SECS + 1);
        assert!(limiter.check_rate_limit_at("591700", later));
    }

    #[test]
    fn test_rejected_attempt_is_not_recorded() {
        let limiter = limiter();
        let now = Utc::now();

        for _ in 0..CAP {
            let _ = limiter.check_rate_limit_at("591700", now);
        }
        // Hammering while throttled must not extend the window
        for _ in 0..5 {
            assert!(!limiter.check_rate_limit_at("591700", now));
        }

        let later = now + ChronoDuration::seconds(RATE_WINDOW_SECS + 1);
        assert!(limiter.check_rate_limit_at("591700", later));
    }

    #[test]
    fn test_senders_are_independent() {
        let limiter = limiter();
        let now = Utc::now();

        for _ in 0..CAP {
            assert!(limiter.check_rate_limit_at("first", now));
        }
        assert!(!limiter.check_rate_limit_at("first", now));
        assert!(limiter.check_rate_limit_at("second", now));
        assert_eq!(limiter.active_senders(), 2);
    }

    #[test]
    fn test_daily_limit_and_counter() {
        let limiter = RateLimiter::new(2, CAP);
        let now = Utc::now();

        assert!(limiter.check_daily_limit_at(now));
        limiter.increment_daily_count();
        assert!(limiter.check_daily_limit_at(now));
        limiter.increment_daily_count();
        assert!(!limiter.check_daily_limit_at(now));
        assert_eq!(limiter.daily_count(), 2);
    }

    #[test]
    fn test_daily_counter_resets_on_date_rollover() {
        let limiter = RateLimiter::new(2, CAP);
        let today = Utc::now();

        limiter.increment_daily_count();
        limiter.increment_daily_count();
        assert!(limiter.check_rate_limit_at("591700", today));
        assert!(!limiter.check_daily_limit_at(today));

        let tomorrow = today + ChronoDuration::days(1);
        assert!(limiter.check_daily_limit_at(tomorrow));
        assert_eq!(limiter.daily_count(), 0);
        // Per-sender records are cleared with the daily reset
        assert_eq!(limiter.active_senders(), 0);
    }
}
