// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Time-windowed recording for a single day.
//!
//! The controller ticks immediately and then every `poll_interval`. On each
//! tick every window containing the current time triggers one recording,
//! sequentially. After a tick the loop ends if the calendar date is no
//! longer the date the controller started on.

use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use crate::capture::{Recorder, RecordingReport};
use crate::error::{RecorderError, Result};
use crate::layout::RecordingLayout;

/// Inclusive `[start, end]` time-of-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ScheduleWindow {
    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        if start > end {
            return Err(RecorderError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| RecorderError::InvalidWindow(format!("'{s}': {e}")))
}

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// What a finished schedule did.
#[derive(Debug, Default)]
pub struct ScheduleSummary {
    pub ticks: u64,
    pub recordings: Vec<RecordingReport>,
}

/// Drives a [`Recorder`] across the windows of one day.
pub struct ScheduleController<C = SystemClock> {
    windows: Vec<ScheduleWindow>,
    poll_interval: Duration,
    layout: RecordingLayout,
    clock: C,
}

impl ScheduleController<SystemClock> {
    pub fn new(windows: Vec<ScheduleWindow>, poll_interval: Duration, layout: RecordingLayout) -> Self {
        Self::with_clock(windows, poll_interval, layout, SystemClock)
    }
}

impl<C: Clock> ScheduleController<C> {
    pub fn with_clock(
        windows: Vec<ScheduleWindow>,
        poll_interval: Duration,
        layout: RecordingLayout,
        clock: C,
    ) -> Self {
        Self { windows, poll_interval, layout, clock }
    }

    /// Tick until the date changes.
    pub async fn run<R: Recorder>(&self, recorder: &mut R) -> ScheduleSummary {
        let start_date: NaiveDate = self.clock.now().date();
        info!(
            camera = recorder.source_id(),
            windows = self.windows.len(),
            date = %start_date,
            "Schedule started"
        );

        let mut summary = ScheduleSummary::default();
        loop {
            summary.ticks += 1;
            let reports = self.tick(recorder).await;
            summary.recordings.extend(reports);

            if self.clock.now().date() != start_date {
                info!(
                    camera = recorder.source_id(),
                    ticks = summary.ticks,
                    recordings = summary.recordings.len(),
                    "Date changed, schedule complete"
                );
                return summary;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Evaluate every window once against the current time.
    pub async fn tick<R: Recorder>(&self, recorder: &mut R) -> Vec<RecordingReport> {
        let mut reports = Vec::new();
        for window in &self.windows {
            let now = self.clock.now();
            if !window.contains(now.time()) {
                continue;
            }

            let output = self.layout.scheduled_path(recorder.source_id(), now);
            info!(
                camera = recorder.source_id(),
                start = %window.start.format("%H:%M"),
                end = %window.end.format("%H:%M"),
                output = ?output,
                "Scheduled recording"
            );
            reports.push(recorder.record(output).await);
        }
        if reports.is_empty() {
            debug!(camera = recorder.source_id(), "No active window");
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_parse_window() {
        let w = ScheduleWindow::parse("07:00", "09:00").unwrap();
        assert_eq!(w.start, t(7, 0));
        assert_eq!(w.end, t(9, 0));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ScheduleWindow::parse("7am", "09:00").is_err());
        assert!(ScheduleWindow::parse("24:00", "24:30").is_err());
        assert!(matches!(
            ScheduleWindow::parse("13:00", "12:00"),
            Err(RecorderError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let w = ScheduleWindow::parse("12:00", "13:00").unwrap();
        assert!(w.contains(t(12, 0)));
        assert!(w.contains(t(12, 30)));
        assert!(w.contains(t(13, 0)));
        assert!(!w.contains(NaiveTime::from_hms_opt(13, 0, 1).unwrap()));
        assert!(!w.contains(t(11, 59)));
    }
}
