//! Human-like timing simulation (anti-ban measures)
//!
//! Computes plausible read and typing delays from message content so the
//! bot's reply cadence does not look automated. Pure computation only;
//! the engine is responsible for actually sleeping on the returned values.
//!
//! Every delay carries random jitter, so tests must assert ranges rather
//! than exact values.

use crate::config::delays;
use lazy_regex::lazy_regex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Match a 7-8 digit run (street numbers, phone fragments) that would
/// slow a human reader down
static RE_LONG_NUMBER: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\d{7,8}");

/// Simulated time spent reading an inbound message.
///
/// Scales linearly with message length, clamped to the configured read
/// band, with fixed bonuses for multi-line text, long digit runs, and
/// messages longer than five words, plus bounded random jitter.
#[must_use]
pub fn read_delay(text: &str) -> Duration {
    let char_count = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    let base = (delays::READ_TIME_PER_CHAR * char_count).max(delays::MIN_READ_TIME);

    let mut complexity_bonus = Duration::ZERO;
    if text.contains('\n') {
        complexity_bonus += delays::READ_BONUS_MULTILINE;
    }
    if RE_LONG_NUMBER.is_match(text) {
        complexity_bonus += delays::READ_BONUS_LONG_NUMBER;
    }
    if text.split_whitespace().count() > 5 {
        complexity_bonus += delays::READ_BONUS_MANY_WORDS;
    }

    (base + complexity_bonus).min(delays::MAX_READ_TIME) + jitter(delays::READ_JITTER)
}

/// Simulated time spent typing an outgoing reply of `response_len` characters.
#[must_use]
pub fn typing_delay(response_len: usize) -> Duration {
    let char_count = u32::try_from(response_len).unwrap_or(u32::MAX);
    let base =
        (delays::TYPING_BASE + delays::TYPING_PER_CHAR * char_count).max(delays::MIN_TYPING_TIME);

    base.min(delays::MAX_TYPING_TIME) + jitter(delays::TYPING_JITTER)
}

/// Random pause within the generic response band.
#[must_use]
pub fn response_delay() -> Duration {
    let min = delays::MIN_RESPONSE_TIME.as_millis() as u64;
    let max = delays::MAX_RESPONSE_TIME.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

/// Pick a random element from a non-empty pool of reply fragments.
#[must_use]
pub fn pick<'a>(items: &'a [&'a str]) -> &'a str {
    items.choose(&mut rand::thread_rng()).copied().unwrap_or("")
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
