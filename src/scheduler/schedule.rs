//! Time-window schedules
//!
//! A [`Schedule`] is a list of [`WindowRule`]s evaluated in the exchange
//! timezone. Inside a window, time is cut into cadence-sized slots aligned
//! to the window start; a [`Trigger`] fires once per slot.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::{GexError, GexResult};

/// Days, a half-open local time window `[start, end)` and a cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRule {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub cadence_secs: u64,
}

impl WindowRule {
    /// Monday to Friday between two local times
    pub fn weekdays(
        start_hour: u32,
        start_min: u32,
        end_hour: u32,
        end_min: u32,
        cadence_secs: u64,
    ) -> Self {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start: at(start_hour, start_min),
            end: at(end_hour, end_min),
            cadence_secs,
        }
    }

    pub fn validate(&self) -> GexResult<()> {
        if self.cadence_secs == 0 {
            return Err(GexError::config("window cadence must be at least one second"));
        }
        if self.start >= self.end {
            return Err(GexError::config(format!(
                "window {}-{} is empty",
                self.start, self.end
            )));
        }
        if self.days.is_empty() {
            return Err(GexError::config("window has no days"));
        }
        Ok(())
    }

    /// Start of the slot containing `local`, if the window covers it
    pub fn slot_for(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.cadence_secs == 0 || !self.days.contains(&local.weekday()) {
            return None;
        }
        let time = local.time();
        if time < self.start || time >= self.end {
            return None;
        }

        let window_start = local.date().and_time(self.start);
        let elapsed = (local - window_start).num_seconds();
        let cadence = self.cadence_secs as i64;
        Some(window_start + Duration::seconds(elapsed / cadence * cadence))
    }
}

/// Rules in one timezone
#[derive(Debug, Clone)]
pub struct Schedule {
    rules: Vec<WindowRule>,
    tz: Tz,
}

impl Schedule {
    pub fn new(rules: Vec<WindowRule>, tz: Tz) -> Self {
        Self { rules, tz }
    }

    /// Slot of the first rule covering `now`, as local time
    pub fn slot_at(&self, now: DateTime<Utc>) -> Option<NaiveDateTime> {
        let local = now.with_timezone(&self.tz).naive_local();
        self.rules.iter().find_map(|rule| rule.slot_for(local))
    }

    /// Whether any window covers `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.slot_at(now).is_some()
    }
}

/// Fires once per schedule slot
#[derive(Debug, Clone)]
pub struct Trigger {
    schedule: Schedule,
    last: Option<NaiveDateTime>,
}

impl Trigger {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            last: None,
        }
    }

    /// Mark the slot covering `now` as already fired
    pub fn prime(&mut self, now: DateTime<Utc>) {
        self.last = self.schedule.slot_at(now);
    }

    /// Whether `now` falls in a slot that has not fired yet
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.schedule.slot_at(now) {
            Some(slot) if self.last != Some(slot) => {
                self.last = Some(slot);
                true
            }
            _ => false,
        }
    }
}
