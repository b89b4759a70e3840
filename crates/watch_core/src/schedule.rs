use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("interval must be between 1 and {max} minutes, got {got}")]
    InvalidInterval { got: u32, max: u32 },
    #[error("hour {0} is outside 0..24")]
    InvalidHour(u32),
}

/// Hours of the day during which scans may run, `start` inclusive and `end`
/// exclusive. A range with `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ScheduleError> {
        for hour in [start, end] {
            if hour > 23 {
                return Err(ScheduleError::InvalidHour(hour));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self { start: 5, end: 23 }
    }
}

/// When scan cycles run: fixed slots within an active-hours window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    active: HourRange,
    interval_minutes: u32,
}

impl Schedule {
    pub fn new(active: HourRange, interval_minutes: u32) -> Result<Self, ScheduleError> {
        if interval_minutes == 0 || interval_minutes >= MINUTES_PER_DAY {
            return Err(ScheduleError::InvalidInterval {
                got: interval_minutes,
                max: MINUTES_PER_DAY - 1,
            });
        }
        HourRange::new(active.start, active.end)?;
        Ok(Self {
            active,
            interval_minutes,
        })
    }

    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.active.contains(now.hour())
    }

    /// The first slot strictly after `now`. Slots are the minutes of the day
    /// that are multiples of the interval, restarting at midnight.
    pub fn next_run_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let minute_of_day = now.hour() * 60 + now.minute();
        let next_slot = (minute_of_day / self.interval_minutes + 1) * self.interval_minutes;
        let midnight = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
        if next_slot >= MINUTES_PER_DAY {
            midnight + Duration::days(1)
        } else {
            midnight + Duration::minutes(i64::from(next_slot))
        }
    }
}
