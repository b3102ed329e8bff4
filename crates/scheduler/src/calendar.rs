//! Trading-calendar gate.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

/// Decides whether a date is a trading day. Injectable so tests and other
/// venues can swap the rules.
pub trait TradingCalendar: Send + Sync {
    fn is_trading_day(&self, date: NaiveDate) -> bool;
}

/// Monday-Friday minus an explicit holiday list.
#[derive(Debug, Default, Clone)]
pub struct WeekdayCalendar {
    holidays: HashSet<NaiveDate>,
}

impl WeekdayCalendar {
    /// Calendar with no holidays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar with the given exchange holidays.
    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Add one holiday.
    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }
}
