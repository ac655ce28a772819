//! Wall-clock helpers: configured time-of-day parsing, daily meal
//! windows anchored to a UTC day, and business-day arithmetic.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::error::{MealPassError, MealPassResult};

/// Parse a configured time of day in `HH:MM:SS.mmm` form.
///
/// The millisecond part is optional (`HH:MM:SS` is accepted).
pub fn parse_time_of_day(s: &str) -> MealPassResult<NaiveTime> {
    let bad = || MealPassError::Parse(format!("malformed time of day: {s:?}"));

    let mut parts = s.trim().split(':');
    let (Some(h), Some(m), Some(rest), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(bad());
    };
    let (sec, milli) = match rest.split_once('.') {
        Some((sec, milli)) => (sec, Some(milli)),
        None => (rest, None),
    };

    let num = |v: &str| -> MealPassResult<u32> {
        if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        v.parse::<u32>().map_err(|_| bad())
    };

    let milli = match milli {
        Some(ms) if ms.len() <= 3 => num(ms)? * 10u32.pow(3 - ms.len() as u32),
        Some(_) => return Err(bad()),
        None => 0,
    };

    NaiveTime::from_hms_milli_opt(num(h)?, num(m)?, num(sec)?, milli).ok_or_else(bad)
}

/// The instant at `time` on `day`, in UTC.
pub fn at_time_on(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    day.and_time(time).and_utc()
}

/// Inclusive on both ends.
pub fn window_contains(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start <= now && now <= end
}

/// A daily window between two times of day. When `end <= start` the
/// window runs overnight and ends on the following calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> MealPassResult<Self> {
        Ok(Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?))
    }

    pub fn is_overnight(&self) -> bool {
        self.end <= self.start
    }

    /// Start and end instants of the window opening on `day`.
    pub fn bounds_on(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = at_time_on(day, self.start);
        let mut end = at_time_on(day, self.end);
        if self.is_overnight() {
            end += Duration::days(1);
        }
        (start, end)
    }

    /// Whether `now` falls in the window opened today or, for overnight
    /// windows, in the one opened yesterday.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let (start, end) = self.bounds_on(today);
        if window_contains(now, start, end) {
            return true;
        }
        if self.is_overnight() {
            if let Some(yesterday) = today.pred_opt() {
                let (start, end) = self.bounds_on(yesterday);
                return window_contains(now, start, end);
            }
        }
        false
    }
}

/// The business day preceding `day`: the previous Friday on Mondays,
/// the previous calendar day otherwise.
pub fn previous_business_day(day: NaiveDate) -> NaiveDate {
    let back = if day.weekday() == Weekday::Mon { 3 } else { 1 };
    day - Duration::days(back)
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_last_saturday_of_month(day: NaiveDate) -> bool {
    day.weekday() == Weekday::Sat && (day + Duration::days(7)).month() != day.month()
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    at_time_on(day, NaiveTime::MIN)
}

/// Source of "now" for jobs and request handlers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    #[test]
    fn parses_full_format() {
        let time = parse_time_of_day("12:30:15.250").unwrap();
        assert_eq!(time, NaiveTime::from_hms_milli_opt(12, 30, 15, 250).unwrap());
    }

    #[test]
    fn parses_without_millis() {
        assert_eq!(parse_time_of_day("08:00:00").unwrap(), t(8, 0));
    }

    #[test]
    fn short_millis_are_scaled() {
        let time = parse_time_of_day("08:00:00.5").unwrap();
        assert_eq!(time, NaiveTime::from_hms_milli_opt(8, 0, 0, 500).unwrap());
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["", "8", "08:00", "25:00:00.000", "08:61:00.000", "aa:bb:cc", "08:00:00.1234", "08:00:00:00"] {
            let err = parse_time_of_day(bad).unwrap_err();
            assert!(matches!(err, MealPassError::Parse(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let day = date(2025, 3, 4);
        let w = DailyWindow::new(t(12, 0), t(14, 30));
        let (start, end) = w.bounds_on(day);
        assert!(w.contains(start));
        assert!(w.contains(end));
        assert!(!w.contains(start - Duration::milliseconds(1)));
        assert!(!w.contains(end + Duration::milliseconds(1)));
    }

    #[test]
    fn overnight_window_wraps_past_midnight() {
        let w = DailyWindow::new(t(19, 0), t(1, 0));
        assert!(w.is_overnight());
        let (start, end) = w.bounds_on(date(2025, 3, 4));
        assert_eq!(end, at_time_on(date(2025, 3, 5), t(1, 0)));
        assert!(w.contains(start + Duration::hours(5)));
        // 00:30 belongs to the window opened the previous evening.
        assert!(w.contains(at_time_on(date(2025, 3, 5), NaiveTime::from_hms_opt(0, 30, 0).unwrap())));
        assert!(!w.contains(at_time_on(date(2025, 3, 5), t(2, 0))));
        assert!(!w.contains(at_time_on(date(2025, 3, 5), t(18, 59))));
    }

    #[test]
    fn previous_business_day_skips_weekend() {
        // 2025-03-03 is a Monday.
        assert_eq!(previous_business_day(date(2025, 3, 3)), date(2025, 2, 28));
        assert_eq!(previous_business_day(date(2025, 3, 4)), date(2025, 3, 3));
    }

    #[test]
    fn last_saturday_detection() {
        assert!(is_last_saturday_of_month(date(2025, 3, 29)));
        assert!(!is_last_saturday_of_month(date(2025, 3, 22)));
        assert!(is_last_saturday_of_month(date(2025, 2, 22)));
        assert!(!is_last_saturday_of_month(date(2025, 3, 28)));
    }

    #[test]
    fn fixed_clock_advances() {
        let start = at_time_on(date(2025, 3, 4), t(4, 0));
        let clock = FixedClock::new(start);
        clock.advance(Duration::hours(12));
        assert_eq!(clock.now(), start + Duration::hours(12));
        assert_eq!(clock.today(), date(2025, 3, 4));
    }
}
