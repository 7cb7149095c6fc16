//! Daily reset window: rollover timing and baseline snapshots.

use crate::feeds::state::{Baseline, Counters};
use chrono::{DateTime, Duration, Local, Timelike};
use tracing::warn;

/// The recurring daily window deltas are measured against.
///
/// Invariant after any [`align`](Self::align): `reset_at.hour() == reset_hour`
/// and `reset_at.minute() == 0`. `reset_at` is the next rollover instant for
/// the current cycle until crossed.
#[derive(Debug, Clone)]
pub struct ResetWindow {
    pub reset_hour: u32,
    pub reset_at: DateTime<Local>,
    pub baseline: Baseline,
}

impl ResetWindow {
    /// Rebuilds the window from a persisted blob, falling back to freshly
    /// observed values when the blob is missing, malformed, or a first-run
    /// sentinel.
    pub fn restore(
        reset_hour: u32,
        raw_blob: Option<&str>,
        fallback: Baseline,
        now: DateTime<Local>,
    ) -> Self {
        let baseline = match raw_blob {
            Some(raw) => Baseline::from_feed_value(raw, &fallback).unwrap_or_else(|e| {
                warn!("Could not parse stored baseline blob: {:#}", e);
                fallback
            }),
            None => fallback,
        };

        let reset_at = restore_timestamp(baseline.reset_timestamp).unwrap_or(now);

        Self { reset_hour, reset_at, baseline }
    }

    /// True once the wall clock has crossed the rollover instant.
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now > self.reset_at
    }

    /// Adopts an externally changed reset hour. Returns true if it differed.
    pub fn adopt_hour(&mut self, desired: u32) -> bool {
        if desired == self.reset_hour {
            return false;
        }
        self.reset_hour = desired;
        true
    }

    /// True if `reset_at` no longer satisfies the hour/minute invariant.
    pub fn needs_alignment(&self) -> bool {
        self.reset_at.hour() != self.reset_hour || self.reset_at.minute() != 0
    }

    /// Rewrites `reset_at`'s hour and minute in place, keeping the date.
    pub fn align(&mut self) {
        if let Some(aligned) = at_hour(self.reset_at, self.reset_hour) {
            self.reset_at = aligned;
        }
    }

    /// Rolls the window over: snapshots the counters as the new baseline and
    /// schedules the next rollover at today's reset hour, or tomorrow's if
    /// that instant has already passed.
    pub fn roll_over(&mut self, counters: &Counters, now: DateTime<Local>) {
        self.reset_at = next_rollover(self.reset_hour, now);
        self.baseline = Baseline::snapshot(counters, self.reset_at.timestamp() as f64);
    }

    /// The blob to persist, with the timestamp synced to `reset_at`.
    pub fn blob(&self) -> Baseline {
        Baseline { reset_timestamp: self.reset_at.timestamp() as f64, ..self.baseline.clone() }
    }
}

/// Today's date at `reset_hour:00`, pushed a day out if already in the past.
fn next_rollover(reset_hour: u32, now: DateTime<Local>) -> DateTime<Local> {
    let today = at_hour(now, reset_hour).unwrap_or(now);
    if today < now {
        today + Duration::days(1)
    } else {
        today
    }
}

/// Same instant with the time-of-day replaced by `hour:00:00`.
///
/// None only when the local timezone makes that wall-clock time nonexistent
/// (DST gap); callers keep the previous value in that case.
fn at_hour(instant: DateTime<Local>, hour: u32) -> Option<DateTime<Local>> {
    instant
        .with_hour(hour)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
}

fn restore_timestamp(timestamp: f64) -> Option<DateTime<Local>> {
    if timestamp <= 0.0 {
        return None;
    }
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos).map(|utc| utc.with_timezone(&Local))
}
