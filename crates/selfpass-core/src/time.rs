//! Millisecond durations with human-readable rendering.
//!
//! [`TimeDuration`] is used for session idle limits, intruder lockout
//! windows, persistent-login lifetimes, and the debug rendering of
//! `DURATION` settings (stored as seconds).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECOND: u64 = 1000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// A non-negative duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeDuration(u64);

impl TimeDuration {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn of_millis(ms: u64) -> Self {
        Self(ms)
    }

    #[must_use]
    pub const fn of_seconds(s: u64) -> Self {
        Self(s.saturating_mul(SECOND))
    }

    #[must_use]
    pub const fn of_minutes(m: u64) -> Self {
        Self(m.saturating_mul(MINUTE))
    }

    #[must_use]
    pub const fn of_hours(h: u64) -> Self {
        Self(h.saturating_mul(HOUR))
    }

    #[must_use]
    pub const fn of_days(d: u64) -> Self {
        Self(d.saturating_mul(DAY))
    }

    /// Time elapsed since `instant`; zero if `instant` is in the future.
    #[must_use]
    pub fn since(instant: DateTime<Utc>) -> Self {
        Self::between(instant, Utc::now())
    }

    /// Absolute distance between two instants.
    #[must_use]
    pub fn between(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        let ms = (b - a).num_milliseconds().unsigned_abs();
        Self(ms)
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_seconds(self) -> u64 {
        self.0 / SECOND
    }

    #[must_use]
    pub fn is_longer_than(self, other: Self) -> bool {
        self > other
    }

    #[must_use]
    pub fn is_shorter_than(self, other: Self) -> bool {
        self < other
    }

    #[must_use]
    pub fn as_std(self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// `instant + self`, saturating at the far future.
    #[must_use]
    pub fn after(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let ms = i64::try_from(self.0).unwrap_or(i64::MAX);
        instant
            .checked_add_signed(chrono::Duration::milliseconds(ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Compact form: `"1d 2h 3m 4s"`; sub-second values render as `"250ms"`.
    #[must_use]
    pub fn as_compact_string(self) -> String {
        if self.0 < SECOND {
            return format!("{}ms", self.0);
        }
        let parts = self.parts();
        let units = ["d", "h", "m", "s"];
        let rendered: Vec<String> = parts
            .iter()
            .zip(units)
            .filter(|(n, _)| **n > 0)
            .map(|(n, u)| format!("{n}{u}"))
            .collect();
        rendered.join(" ")
    }

    /// Long form: `"1 day, 2 hours, 3 minutes, 4 seconds"`.
    #[must_use]
    pub fn as_long_string(self) -> String {
        if self.0 < SECOND {
            return format!("{} milliseconds", self.0);
        }
        let parts = self.parts();
        let units = [("day", "days"), ("hour", "hours"), ("minute", "minutes"), ("second", "seconds")];
        let rendered: Vec<String> = parts
            .iter()
            .zip(units)
            .filter(|(n, _)| **n > 0)
            .map(|(n, (one, many))| format!("{n} {}", if *n == 1 { one } else { many }))
            .collect();
        rendered.join(", ")
    }

    fn parts(self) -> [u64; 4] {
        [
            self.0 / DAY,
            (self.0 % DAY) / HOUR,
            (self.0 % HOUR) / MINUTE,
            (self.0 % MINUTE) / SECOND,
        ]
    }

    /// Parse `"1500ms"`, `"90s"`, `"5m"`, `"2h30m"`, `"1d 4h"`, or bare seconds.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unparseable fragment.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("empty duration".to_owned());
        }
        if let Ok(secs) = trimmed.parse::<u64>() {
            return Ok(Self::of_seconds(secs));
        }

        let mut total: u64 = 0;
        let mut digits = String::new();
        let mut chars = trimmed.chars().filter(|c| !c.is_whitespace()).peekable();
        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let amount: u64 = digits
                .parse()
                .map_err(|_| format!("missing number before '{c}' in '{input}'"))?;
            digits.clear();
            let unit = match c {
                'm' if chars.peek() == Some(&'s') => {
                    chars.next();
                    1
                }
                'd' => DAY,
                'h' => HOUR,
                'm' => MINUTE,
                's' => SECOND,
                other => return Err(format!("unknown unit '{other}' in '{input}'")),
            };
            total = total.saturating_add(amount.saturating_mul(unit));
        }
        if !digits.is_empty() {
            return Err(format!("trailing number without unit in '{input}'"));
        }
        Ok(Self(total))
    }
}

impl fmt::Display for TimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_compact_string())
    }
}

impl From<Duration> for TimeDuration {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn compact_string_skips_zero_units() {
        let d = TimeDuration::of_days(1)
            .as_millis()
            .saturating_add(TimeDuration::of_minutes(3).as_millis());
        assert_eq!(TimeDuration::of_millis(d).as_compact_string(), "1d 3m");
        assert_eq!(TimeDuration::of_millis(250).as_compact_string(), "250ms");
        assert_eq!(TimeDuration::ZERO.as_compact_string(), "0ms");
    }

    #[test]
    fn long_string_pluralizes() {
        let d = TimeDuration::parse("1d2h1m").unwrap();
        assert_eq!(d.as_long_string(), "1 day, 2 hours, 1 minute");
    }

    #[test]
    fn parse_accepts_units_and_bare_seconds() {
        assert_eq!(TimeDuration::parse("90").unwrap(), TimeDuration::of_seconds(90));
        assert_eq!(TimeDuration::parse("5m").unwrap(), TimeDuration::of_minutes(5));
        assert_eq!(
            TimeDuration::parse("2h 30m").unwrap(),
            TimeDuration::of_minutes(150)
        );
        assert_eq!(TimeDuration::parse("1500ms").unwrap(), TimeDuration::of_millis(1500));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(TimeDuration::parse("").is_err());
        assert!(TimeDuration::parse("5x").is_err());
        assert!(TimeDuration::parse("m").is_err());
        assert!(TimeDuration::parse("3h5").is_err());
    }

    #[test]
    fn since_future_is_absolute_distance() {
        let future = Utc::now() + chrono::Duration::seconds(60);
        assert!(TimeDuration::since(future).as_seconds() <= 60);
    }

    #[test]
    fn ordering_helpers() {
        let short = TimeDuration::of_seconds(1);
        let long = TimeDuration::of_minutes(1);
        assert!(long.is_longer_than(short));
        assert!(short.is_shorter_than(long));
    }

    #[test]
    fn after_adds_duration() {
        let now = Utc::now();
        let later = TimeDuration::of_hours(1).after(now);
        assert_eq!((later - now).num_minutes(), 60);
    }
}
