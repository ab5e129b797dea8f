//! Renewal schedule arithmetic.
//!
//! A `Schedule` is the validated `renew_every` / `renew_unit` / `renew_at`
//! triple. `next_fire` is pure over a `NaiveDateTime` so the daemon can feed
//! it local wall-clock time and the tests can feed it fixed instants.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDateTime, NaiveTime};

use certdeploy_config::{RenewConfig, RenewUnit, TimeOfDay};

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    every: u32,
    unit: RenewUnit,
    at: Option<TimeOfDay>,
}

impl Schedule {
    pub fn from_config(renew: &RenewConfig) -> Self {
        Self { every: renew.every, unit: renew.unit, at: renew.at }
    }

    /// The first fire time strictly after `after`.
    pub fn next_fire(&self, after: NaiveDateTime) -> NaiveDateTime {
        let every = i64::from(self.every.max(1));
        match self.unit {
            RenewUnit::Minute => after + ChronoDuration::minutes(every),
            RenewUnit::Hour => after + ChronoDuration::hours(every),
            RenewUnit::Day => self.anchored(after, ChronoDuration::days(1), every),
            RenewUnit::Week => self.anchored(after, ChronoDuration::weeks(1), every),
            RenewUnit::Weekday(target) => self.next_weekday(after, u32::from(target)),
        }
    }

    /// For day/week units: the next `renew_at` occurrence after `after`
    /// (interval-length steps when `renew_at` is unset), then the remaining
    /// `every - 1` full intervals.
    fn anchored(&self, after: NaiveDateTime, step: ChronoDuration, every: i64) -> NaiveDateTime {
        match self.at {
            None => after + step * every as i32,
            Some(at) => {
                let mut candidate = after.date().and_time(time_of(at));
                while candidate <= after {
                    candidate += step;
                }
                candidate + step * (every - 1) as i32
            }
        }
    }

    /// Weekday units fire weekly. Without `renew_at` the fire time keeps the
    /// time-of-day of `after`.
    fn next_weekday(&self, after: NaiveDateTime, target: u32) -> NaiveDateTime {
        let time = self.at.map(time_of).unwrap_or_else(|| after.time());
        let days_ahead =
            i64::from((target + 7 - after.date().weekday().num_days_from_monday()) % 7);
        let mut candidate = (after.date() + ChronoDuration::days(days_ahead)).and_time(time);
        if candidate <= after {
            candidate += ChronoDuration::weeks(1);
        }
        candidate
    }
}

fn time_of(at: TimeOfDay) -> NaiveTime {
    NaiveTime::from_hms_opt(u32::from(at.hour), u32::from(at.minute), 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default())
}
