//! Session pacing timer
//!
//! Tracks elapsed and remaining time for an optional session length and turns
//! that into a pacing directive for the system prompt. All time queries take
//! `now` explicitly so the timer stays a plain value.
//!
//! Elapsed time is wall-clock time since the start. Pausing only silences the
//! timer: no ticks, no directive, no expiry, until it is resumed.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Remaining-minutes threshold for the wrap-up directive
const LOW_REMAINING_MINUTES: i64 = 5;
/// Sessions this short never get the wrap-up directive
const MIN_MINUTES_FOR_WRAP_UP: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacingTimer {
    duration: TimeDelta,
    start_time: Option<DateTime<Utc>>,
    is_paused: bool,
    is_active: bool,
    has_expired: bool,
}

/// Derived timer view for observers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshot {
    pub is_active: bool,
    pub is_paused: bool,
    pub has_expired: bool,
    pub duration_secs: i64,
    pub elapsed_secs: i64,
    pub remaining_secs: i64,
    pub progress: f64,
    pub elapsed_label: String,
    pub remaining_label: String,
    pub duration_label: String,
}

impl PacingTimer {
    /// Start a new run, discarding any previous one
    pub fn start(&mut self, duration: TimeDelta, now: DateTime<Utc>) {
        self.stop();
        self.duration = duration;
        self.start_time = Some(now);
        self.is_active = true;
    }

    pub fn pause(&mut self) {
        if self.is_active {
            self.is_active = false;
            self.is_paused = true;
        }
    }

    /// Resume a paused run. The clock kept running while paused.
    pub fn resume(&mut self) {
        if self.start_time.is_none() || !self.is_paused {
            return;
        }
        self.is_paused = false;
        self.is_active = true;
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired
    }

    /// Periodic update. Returns true on the tick where the run first expires.
    /// Expiry is sticky and the clock keeps running to measure overtime.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.has_expired {
            return false;
        }
        if self.remaining(now) <= TimeDelta::zero() {
            self.has_expired = true;
            return true;
        }
        false
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        let Some(start) = self.start_time else {
            return TimeDelta::zero();
        };
        (now - start).max(TimeDelta::zero())
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.duration - self.elapsed(now)).max(TimeDelta::zero())
    }

    /// Fraction of the run elapsed, clamped to `0..=1`
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let total = self.duration.num_milliseconds();
        if total <= 0 {
            return 0.0;
        }
        (self.elapsed(now).num_milliseconds() as f64 / total as f64).min(1.0)
    }

    /// Natural-language pacing directive; `None` unless the timer is running
    pub fn pacing_description(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_active {
            return None;
        }

        let duration_minutes = self.duration.num_minutes();
        let elapsed_minutes = self.elapsed(now).num_minutes();
        let remaining_minutes = self.remaining(now).num_minutes();
        let expired = self.has_expired || self.remaining(now) <= TimeDelta::zero();

        let text = if expired {
            format!(
                "The user requested a {duration_minutes}-minute session which has now expired (running {} minutes over). Please begin wrapping up the session with a summary of what was covered.",
                elapsed_minutes - duration_minutes
            )
        } else if remaining_minutes <= LOW_REMAINING_MINUTES
            && duration_minutes > MIN_MINUTES_FOR_WRAP_UP
        {
            format!(
                "The user requested a {duration_minutes}-minute session. There are {remaining_minutes} minutes remaining. Consider starting to wrap up key points."
            )
        } else {
            format!(
                "The user requested a {duration_minutes}-minute session. {elapsed_minutes} minutes have elapsed with {remaining_minutes} minutes remaining. Pace the lesson accordingly."
            )
        };
        Some(text)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let elapsed = self.elapsed(now);
        let remaining = self.remaining(now);
        TimerSnapshot {
            is_active: self.is_active,
            is_paused: self.is_paused(),
            has_expired: self.has_expired,
            duration_secs: self.duration.num_seconds(),
            elapsed_secs: elapsed.num_seconds(),
            remaining_secs: remaining.num_seconds(),
            progress: self.progress(now),
            elapsed_label: format_duration(elapsed),
            remaining_label: format_duration(remaining),
            duration_label: format_duration(self.duration),
        }
    }
}

/// "X min", "X hr" or "X hr Y min"
pub fn format_duration(duration: TimeDelta) -> String {
    let minutes = duration.num_minutes();
    let hours = minutes / 60;
    let remaining_minutes = minutes % 60;

    match (hours, remaining_minutes) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} hr"),
        (h, m) => format!("{h} hr {m} min"),
    }
}
