//! Wall-clock access.
//!
//! Day buckets (`YYYY-MM-DD`) and "start of today" are computed in the local
//! time zone, so everything that depends on them reads time through [`Clock`].

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Calendar date key used by daily statistics.
    fn today_key(&self) -> String {
        date_key(&self.now())
    }

    /// Epoch millis of local midnight for the current day.
    fn start_of_today_ms(&self) -> i64 {
        start_of_day_ms(&self.now())
    }
}

pub fn date_key(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn start_of_day_ms(at: &DateTime<Local>) -> i64 {
    local_midnight_ms(at.date_naive())
}

/// Epoch millis of local midnight starting `day`.
pub fn local_midnight_ms(day: NaiveDate) -> i64 {
    let midnight = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        // Midnight skipped by a DST jump: fall back to the naive UTC reading.
        .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for deterministic day-boundary behaviour.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn date_key_rolls_over_at_midnight() {
        let clock = ManualClock::new(local(2026, 3, 10, 23, 59));
        assert_eq!(clock.today_key(), "2026-03-10");

        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today_key(), "2026-03-11");
    }

    #[test]
    fn start_of_today_is_local_midnight() {
        let clock = ManualClock::new(local(2026, 3, 10, 15, 30));
        let expected = local(2026, 3, 10, 0, 0).timestamp_millis();
        assert_eq!(clock.start_of_today_ms(), expected);
        assert!(clock.now_ms() > clock.start_of_today_ms());
    }
}
