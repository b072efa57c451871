use crate::config::SessionConfig;
use crate::errors::Result;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// One trading session in local wall-clock time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionWindow {
    pub open: NaiveDateTime,
    pub close: NaiveDateTime,
}

impl SessionWindow {
    pub fn is_open(&self, now: NaiveDateTime) -> bool {
        now >= self.open && now < self.close
    }

    /// Time left before the open; zero once it has passed
    pub fn until_open(&self, now: NaiveDateTime) -> std::time::Duration {
        (self.open - now).to_std().unwrap_or_default()
    }
}

/// Weekday sessions between fixed open and close times
#[derive(Clone, Copy, Debug)]
pub struct MarketCalendar {
    open: NaiveTime,
    close: NaiveTime,
}

impl MarketCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Ok(Self::new(config.open()?, config.close()?))
    }

    /// Today's session if it has not closed yet, otherwise the next weekday's
    pub fn next_session(&self, now: NaiveDateTime) -> SessionWindow {
        let mut day = now.date();
        if !is_trading_day(day) || now >= day.and_time(self.close) {
            day = next_trading_day(day);
        }

        SessionWindow {
            open: day.and_time(self.open),
            close: day.and_time(self.close),
        }
    }
}

fn is_trading_day(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_trading_day(day: NaiveDate) -> NaiveDate {
    let mut next = day + Duration::days(1);
    while !is_trading_day(next) {
        next += Duration::days(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> MarketCalendar {
        MarketCalendar::new(
            NaiveTime::from_hms_opt(8, 30, 30).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        )
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_before_open_on_weekday_is_today() {
        // Monday 2025-03-03
        let now = at(2025, 3, 3, 7, 0);
        let window = calendar().next_session(now);

        assert_eq!(window.open, at(2025, 3, 3, 8, 30) + Duration::seconds(30));
        assert_eq!(window.close, at(2025, 3, 3, 15, 0));
        assert!(!window.is_open(now));
        assert_eq!(window.until_open(now).as_secs(), 90 * 60 + 30);
    }

    #[test]
    fn test_during_session_is_today_and_open() {
        let now = at(2025, 3, 4, 11, 15);
        let window = calendar().next_session(now);

        assert_eq!(window.close, at(2025, 3, 4, 15, 0));
        assert!(window.is_open(now));
        assert_eq!(window.until_open(now).as_secs(), 0);
    }

    #[test]
    fn test_after_close_moves_to_next_weekday() {
        // Tuesday evening -> Wednesday
        let window = calendar().next_session(at(2025, 3, 4, 16, 0));
        assert_eq!(window.close, at(2025, 3, 5, 15, 0));

        // Friday evening -> Monday
        let window = calendar().next_session(at(2025, 3, 7, 15, 0));
        assert_eq!(window.close, at(2025, 3, 10, 15, 0));
    }

    #[test]
    fn test_weekend_moves_to_monday() {
        let saturday = calendar().next_session(at(2025, 3, 8, 10, 0));
        let sunday = calendar().next_session(at(2025, 3, 9, 23, 0));

        assert_eq!(saturday.close, at(2025, 3, 10, 15, 0));
        assert_eq!(saturday, sunday);
    }
}
