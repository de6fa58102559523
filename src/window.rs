//! Maintenance windows: recurring UTC intervals during which disruptive
//! operations are permitted.
//!
//! A window without days repeats every day; with days it repeats every week.
//! Windows may wrap past midnight (or the end of the week). Each occurrence
//! of a window has a stable identifier so the scheduler can tell "the same
//! window as last time" from "a new window".

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

const MINUTES_PER_DAY: i64 = 24 * 60;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// The window occurrence that is open at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindow {
    pub id: String,
}

/// Maintenance window predicate consumed by the scheduler and executors.
pub trait MaintenanceWindows: Send + Sync {
    fn active_window(&self, now: DateTime<Utc>) -> Option<ActiveWindow>;

    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_window(now).is_some()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "startDay", skip_serializing_if = "Option::is_none")]
    pub start_day: Option<String>,
    #[serde(rename = "startHour")]
    pub start_hour: u32,
    #[serde(default, rename = "startMinute")]
    pub start_minute: u32,
    #[serde(default, rename = "endDay", skip_serializing_if = "Option::is_none")]
    pub end_day: Option<String>,
    #[serde(rename = "endHour")]
    pub end_hour: u32,
    #[serde(default, rename = "endMinute")]
    pub end_minute: u32,
}

fn parse_day(value: &str) -> Result<Weekday> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| VaultError::config(format!("invalid day {:?}", value)))
}

impl MaintenanceWindow {
    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(VaultError::config("hours must be in 0..=23"));
        }
        if self.start_minute > 59 || self.end_minute > 59 {
            return Err(VaultError::config("minutes must be in 0..=59"));
        }
        if let Some(day) = &self.start_day {
            parse_day(day)?;
        }
        if let Some(day) = &self.end_day {
            parse_day(day)?;
        }
        Ok(())
    }

    /// Returns (period, start offset, end offset) in minutes within the period.
    fn bounds(&self) -> Result<(i64, i64, i64)> {
        let start_clock = i64::from(self.start_hour * 60 + self.start_minute);
        let end_clock = i64::from(self.end_hour * 60 + self.end_minute);
        match (&self.start_day, &self.end_day) {
            (None, None) => Ok((MINUTES_PER_DAY, start_clock, end_clock)),
            (start, end) => {
                let start_day = parse_day(start.as_deref().or(end.as_deref()).unwrap_or("mon"))?;
                let end_day = match end {
                    Some(day) => parse_day(day)?,
                    None => start_day,
                };
                let offset = |day: Weekday| i64::from(day.num_days_from_monday()) * MINUTES_PER_DAY;
                Ok((
                    MINUTES_PER_WEEK,
                    offset(start_day) + start_clock,
                    offset(end_day) + end_clock,
                ))
            }
        }
    }

    /// The start of the occurrence containing `now`, if any.
    pub fn occurrence_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (period, start, end) = self.bounds().ok()?;
        let mut now_offset = i64::from(now.hour() * 60 + now.minute());
        if period == MINUTES_PER_WEEK {
            now_offset += i64::from(now.weekday().num_days_from_monday()) * MINUTES_PER_DAY;
        }
        let mut length = (end - start).rem_euclid(period);
        if length == 0 {
            length = period;
        }
        let elapsed = (now_offset - start).rem_euclid(period);
        if elapsed >= length {
            return None;
        }
        let minute_floor = now.with_second(0)?.with_nanosecond(0)?;
        Some(minute_floor - Duration::minutes(elapsed))
    }
}

/// The configured set of windows. An empty set is always open.
#[derive(Debug, Clone, Default)]
pub struct WindowSet {
    windows: Vec<MaintenanceWindow>,
}

impl WindowSet {
    pub fn new(windows: Vec<MaintenanceWindow>) -> Self {
        Self { windows }
    }
}

impl MaintenanceWindows for WindowSet {
    fn active_window(&self, now: DateTime<Utc>) -> Option<ActiveWindow> {
        if self.windows.is_empty() {
            return Some(ActiveWindow {
                id: format!("always@{}", now.format("%Y-%m-%d")),
            });
        }
        self.windows.iter().enumerate().find_map(|(idx, window)| {
            let start = window.occurrence_start(now)?;
            let name = window
                .name
                .clone()
                .unwrap_or_else(|| format!("window-{}", idx));
            Some(ActiveWindow {
                id: format!("{}@{}", name, start.format("%Y-%m-%dT%H:%MZ")),
            })
        })
    }
}
