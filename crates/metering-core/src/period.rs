//! Billing period boundaries.
//!
//! Usage is aggregated per UTC calendar month. Every reader and writer of
//! usage rows must compute the period through this module so a request near
//! a local-timezone month boundary can never land in two different rows.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A UTC calendar-month aggregation window.
///
/// `start` is the first instant of the month; `end` is the last
/// representable millisecond (`23:59:59.999` on the final day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// First instant of the month.
    pub start: DateTime<Utc>,
    /// Last instant of the month.
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// The period containing the current instant.
    #[must_use]
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    /// The period containing an arbitrary instant (historical lookups,
    /// tests).
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let (year, month) = (instant.year(), instant.month());
        let start = first_instant(year, month);
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = first_instant(next_year, next_month) - Duration::milliseconds(1);
        Self { start, end }
    }

    /// Whether an instant falls inside this period.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

fn first_instant(year: i32, month: u32) -> DateTime<Utc> {
    // INVARIANT: day 1 at midnight exists in every month, and UTC has no
    // DST gaps, so this lookup is always a single valid instant.
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month is always a valid UTC instant")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn mid_month_boundaries() {
        let period = BillingPeriod::containing(at("2026-03-17T09:30:00Z"));
        assert_eq!(period.start, at("2026-03-01T00:00:00Z"));
        assert_eq!(period.end, at("2026-03-31T23:59:59.999Z"));
    }

    #[test]
    fn december_rolls_into_january() {
        let period = BillingPeriod::containing(at("2025-12-31T23:59:59Z"));
        assert_eq!(period.start, at("2025-12-01T00:00:00Z"));
        assert_eq!(period.end, at("2025-12-31T23:59:59.999Z"));
    }

    #[test]
    fn leap_february_has_29_days() {
        let period = BillingPeriod::containing(at("2028-02-15T12:00:00Z"));
        assert_eq!(period.end, at("2028-02-29T23:59:59.999Z"));
    }

    #[test]
    fn end_is_last_millisecond() {
        let period = BillingPeriod::containing(at("2026-06-02T00:00:00Z"));
        assert_eq!(period.end.time().nanosecond(), 999_000_000);
    }

    #[test]
    fn first_and_last_instant_share_a_period() {
        let period = BillingPeriod::containing(at("2026-07-04T00:00:00Z"));
        assert!(period.contains(period.start));
        assert!(period.contains(period.end));
        assert!(!period.contains(period.end + Duration::milliseconds(1)));
    }
}
