//! Market clock: pure predicates over the fixed exchange timezone (§4.C).
//!
//! Every function here is side-effect free — the holiday set and the
//! open/close hours are passed in, never loaded from disk, so this module
//! stays trivially unit-testable.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use chrono_tz::Tz;
use std::collections::HashSet;

pub const NPT: Tz = chrono_tz::Asia::Kathmandu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketState {
    Closed,
    PreOpen,
    Open,
}

#[derive(Debug, Clone)]
pub struct MarketClock {
    pub open_hour: u32,
    pub close_hour: u32,
    pub holidays: HashSet<chrono::NaiveDate>,
}

impl MarketClock {
    pub fn new(open_hour: u32, close_hour: u32, holidays: HashSet<chrono::NaiveDate>) -> Self {
        Self {
            open_hour,
            close_hour,
            holidays,
        }
    }

    /// `t`'s weekday is Sun..Thu and not a configured holiday.
    pub fn is_trading_day(&self, t: DateTime<Tz>) -> bool {
        use chrono::Weekday::*;
        let is_trading_weekday = matches!(
            t.weekday(),
            Sun | Mon | Tue | Wed | Thu
        );
        is_trading_weekday && !self.holidays.contains(&t.date_naive())
    }

    pub fn is_open(&self, t: DateTime<Tz>) -> bool {
        self.is_trading_day(t) && self.open_hour <= t.hour() && t.hour() < self.close_hour
    }

    /// True iff the hour immediately precedes `open_hour` on a trading day.
    pub fn is_pre_open(&self, t: DateTime<Tz>) -> bool {
        self.is_trading_day(t) && self.open_hour > 0 && t.hour() == self.open_hour - 1
    }

    pub fn state(&self, t: DateTime<Tz>) -> MarketState {
        if self.is_open(t) {
            MarketState::Open
        } else if self.is_pre_open(t) {
            MarketState::PreOpen
        } else {
            MarketState::Closed
        }
    }

    /// Smallest future instant (hour resolution) satisfying `is_open`.
    pub fn next_open_from(&self, t: DateTime<Tz>) -> DateTime<Tz> {
        let mut cursor = t + Duration::hours(1);
        // Bounded search: at most two weeks of hourly steps.
        for _ in 0..(24 * 14) {
            if self.is_open(cursor) {
                let truncated = NPT
                    .with_ymd_and_hms(
                        cursor.year(),
                        cursor.month(),
                        cursor.day(),
                        cursor.hour(),
                        0,
                        0,
                    )
                    .single()
                    .unwrap_or(cursor);
                return truncated;
            }
            cursor += Duration::hours(1);
        }
        cursor
    }
}
