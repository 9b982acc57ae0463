//! Basal schedule index and rate override expansion.
//!
//! A basal schedule is a recurring 24-hour template of segments, each active
//! from its start time until the next segment's start. This module answers
//! same-day range queries against the template and expands a rate override
//! over an arbitrary (< 24h) interval into temp basal events split exactly at
//! segment boundaries and at midnight.

use crate::timeline::relative_minutes;
use crate::{BasalOverride, Error, Result, SimulationEvent};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One segment of the daily basal template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BasalScheduleSegment {
    #[serde(rename = "start")]
    pub start_time_of_day: NaiveTime,
    /// Scheduled rate in U/hour
    #[serde(rename = "rate")]
    pub rate_per_hour: f64,
}

impl BasalScheduleSegment {
    pub fn new(start_time_of_day: NaiveTime, rate_per_hour: f64) -> Self {
        Self {
            start_time_of_day,
            rate_per_hour,
        }
    }
}

/// A validated, immutable daily basal schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(
    try_from = "Vec<BasalScheduleSegment>",
    into = "Vec<BasalScheduleSegment>"
)]
pub struct BasalSchedule {
    segments: Vec<BasalScheduleSegment>,
}

impl TryFrom<Vec<BasalScheduleSegment>> for BasalSchedule {
    type Error = Error;

    fn try_from(segments: Vec<BasalScheduleSegment>) -> Result<Self> {
        Self::new(segments)
    }
}

impl From<BasalSchedule> for Vec<BasalScheduleSegment> {
    fn from(schedule: BasalSchedule) -> Self {
        schedule.segments
    }
}

impl BasalSchedule {
    /// Validate and build a schedule
    ///
    /// Segments must be non-empty, strictly ascending by start time, and carry
    /// finite non-negative rates.
    pub fn new(segments: Vec<BasalScheduleSegment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::InvalidSchedule("schedule has no segments".into()));
        }

        for (idx, segment) in segments.iter().enumerate() {
            if !segment.rate_per_hour.is_finite() || segment.rate_per_hour < 0.0 {
                return Err(Error::InvalidSchedule(format!(
                    "segment {} has invalid rate {}",
                    idx, segment.rate_per_hour
                )));
            }
        }

        if let Some(pair) = segments
            .windows(2)
            .find(|pair| pair[0].start_time_of_day >= pair[1].start_time_of_day)
        {
            return Err(Error::InvalidSchedule(format!(
                "segment starting at {} is not after {}",
                pair[1].start_time_of_day, pair[0].start_time_of_day
            )));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[BasalScheduleSegment] {
        &self.segments
    }

    /// Segments active between two times of the same day
    ///
    /// Returns the contiguous run from the last segment starting at or before
    /// `start` (or the first segment, if none does) up to, and including, the
    /// last segment starting at or before `end`.
    pub fn rates_in_range(&self, start: NaiveTime, end: NaiveTime) -> Result<&[BasalScheduleSegment]> {
        if start >= end {
            return Err(Error::InvalidRange(format!(
                "time-of-day range {} to {} is not increasing",
                start, end
            )));
        }
        Ok(self.segment_run(start, Some(end)))
    }

    /// `end == None` means the query runs through the end of the day
    fn segment_run(&self, start: NaiveTime, end: Option<NaiveTime>) -> &[BasalScheduleSegment] {
        let start_index = self
            .segments
            .iter()
            .rposition(|s| s.start_time_of_day <= start)
            .unwrap_or(0);
        let end_index = match end {
            Some(end) => self
                .segments
                .iter()
                .position(|s| s.start_time_of_day > end)
                .unwrap_or(self.segments.len()),
            None => self.segments.len(),
        };

        &self.segments[start_index..end_index.max(start_index + 1)]
    }

    /// Expand a rate override over `[start, end]` into temp basal events
    ///
    /// Events are split at every schedule boundary and at midnight, and
    /// carry the difference between the override rate and the scheduled rate
    /// in U/minute. Consecutive events are contiguous; sub-intervals that
    /// round to zero minutes are dropped.
    pub fn adjustments_in_range(
        &self,
        zero: NaiveDateTime,
        start: NaiveDateTime,
        end: NaiveDateTime,
        basal_override: BasalOverride,
    ) -> Result<Vec<SimulationEvent>> {
        if start >= end {
            return Err(Error::InvalidRange(format!(
                "{} is not before {}",
                start, end
            )));
        }
        if end - start >= Duration::hours(24) {
            return Err(Error::InvalidRange(format!(
                "{} to {} spans 24 hours or more",
                start, end
            )));
        }
        basal_override.validate()?;

        let mut events = Vec::new();
        let mut piece_start = start;
        while piece_start < end {
            let next_midnight = piece_start
                .date()
                .succ_opt()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
                .ok_or_else(|| Error::InvalidRange(format!("{} has no next day", piece_start)))?;
            let piece_end = end.min(next_midnight);

            self.expand_within_day(
                zero,
                piece_start,
                piece_end,
                piece_end == next_midnight,
                basal_override,
                &mut events,
            );
            piece_start = piece_end;
        }

        Ok(events)
    }

    fn expand_within_day(
        &self,
        zero: NaiveDateTime,
        start: NaiveDateTime,
        end: NaiveDateTime,
        ends_at_midnight: bool,
        basal_override: BasalOverride,
        events: &mut Vec<SimulationEvent>,
    ) {
        let day = start.date();
        let end_time = if ends_at_midnight { None } else { Some(end.time()) };
        let run = self.segment_run(start.time(), end_time);

        for (idx, segment) in run.iter().enumerate() {
            let sub_start = if idx == 0 {
                start
            } else {
                day.and_time(segment.start_time_of_day)
            };
            let sub_end = match run.get(idx + 1) {
                Some(next) => day.and_time(next.start_time_of_day),
                None => end,
            };

            let t1 = relative_minutes(zero, sub_start);
            let t2 = relative_minutes(zero, sub_end);
            if t1 >= t2 {
                continue;
            }

            let new_rate = basal_override.rate_for(segment.rate_per_hour);
            let delta = (new_rate - segment.rate_per_hour) / 60.0;
            events.push(SimulationEvent::temp_basal(t1, t2, delta));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    /// Daily template shared by the decoder tests
    pub(crate) fn test_schedule() -> BasalSchedule {
        BasalSchedule::new(vec![
            BasalScheduleSegment::new(hm(0, 0), 0.9),
            BasalScheduleSegment::new(hm(4, 0), 0.925),
            BasalScheduleSegment::new(hm(9, 0), 0.85),
            BasalScheduleSegment::new(hm(12, 0), 0.75),
            BasalScheduleSegment::new(hm(14, 0), 0.4),
            BasalScheduleSegment::new(hm(15, 0), 0.8),
            BasalScheduleSegment::new(hm(22, 0), 0.9),
        ])
        .unwrap()
    }

    fn assert_temp_basal(event: &SimulationEvent, t1: i64, t2: i64, dbdt: f64) {
        match event {
            SimulationEvent::TempBasal {
                time_minutes,
                start_minutes,
                end_minutes,
                delta_rate_per_minute,
            } => {
                assert_eq!(*time_minutes, t1);
                assert_eq!(*start_minutes, t1);
                assert_eq!(*end_minutes, t2);
                assert!(
                    (delta_rate_per_minute - dbdt).abs() < 1e-12,
                    "dbdt {} != {}",
                    delta_rate_per_minute,
                    dbdt
                );
            }
            other => panic!("Expected TempBasal, got {:?}", other),
        }
    }

    #[test]
    fn test_rates_in_range() {
        let schedule = test_schedule();
        let segments = schedule.segments();

        assert_eq!(schedule.rates_in_range(hm(0, 0), hm(23, 59)).unwrap(), segments);
        assert_eq!(schedule.rates_in_range(hm(0, 0), hm(1, 0)).unwrap(), &segments[0..1]);
        assert_eq!(schedule.rates_in_range(hm(4, 0), hm(9, 0)).unwrap(), &segments[1..3]);
        assert_eq!(schedule.rates_in_range(hm(16, 0), hm(20, 0)).unwrap(), &segments[5..6]);
    }

    #[test]
    fn test_rates_in_range_rejects_non_increasing() {
        let schedule = test_schedule();

        assert!(matches!(
            schedule.rates_in_range(hm(4, 0), hm(4, 0)),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            schedule.rates_in_range(hm(4, 0), hm(3, 0)),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_rates_before_first_segment_use_first() {
        let schedule = BasalSchedule::new(vec![
            BasalScheduleSegment::new(hm(6, 0), 1.0),
            BasalScheduleSegment::new(hm(18, 0), 0.5),
        ])
        .unwrap();

        let run = schedule.rates_in_range(hm(1, 0), hm(7, 0)).unwrap();
        assert_eq!(run, &schedule.segments()[0..1]);

        let run = schedule.rates_in_range(hm(1, 0), hm(2, 0)).unwrap();
        assert_eq!(run, &schedule.segments()[0..1]);
    }

    #[test]
    fn test_schedule_validation() {
        assert!(matches!(
            BasalSchedule::new(vec![]),
            Err(Error::InvalidSchedule(_))
        ));
        assert!(BasalSchedule::new(vec![BasalScheduleSegment::new(hm(0, 0), -0.1)]).is_err());
        assert!(BasalSchedule::new(vec![BasalScheduleSegment::new(hm(0, 0), f64::INFINITY)]).is_err());
        assert!(BasalSchedule::new(vec![
            BasalScheduleSegment::new(hm(4, 0), 0.5),
            BasalScheduleSegment::new(hm(4, 0), 0.6),
        ])
        .is_err());
    }

    #[test]
    fn test_schedule_deserializes_from_device_json() {
        let json = r#"[
            {"i": 0, "start": "00:00:00", "rate": 0.9, "minutes": 0},
            {"i": 1, "start": "04:00:00", "rate": 0.925, "minutes": 240}
        ]"#;
        let schedule: BasalSchedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.segments().len(), 2);
        assert_eq!(schedule.segments()[1].start_time_of_day, hm(4, 0));

        let unordered = r#"[
            {"start": "04:00:00", "rate": 0.9},
            {"start": "00:00:00", "rate": 0.9}
        ]"#;
        assert!(serde_json::from_str::<BasalSchedule>(unordered).is_err());
    }

    #[test]
    fn test_adjustments_reject_invalid_ranges() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        assert!(matches!(
            schedule.adjustments_in_range(
                zero,
                dt(2015, 1, 2, 0, 0),
                dt(2015, 1, 1, 0, 0),
                BasalOverride::Percent(100.0)
            ),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            schedule.adjustments_in_range(
                zero,
                dt(2015, 1, 1, 0, 0),
                dt(2015, 1, 2, 4, 0),
                BasalOverride::Percent(100.0)
            ),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            schedule.adjustments_in_range(
                zero,
                dt(2015, 1, 1, 0, 0),
                dt(2015, 1, 2, 0, 0),
                BasalOverride::Percent(100.0)
            ),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            schedule.adjustments_in_range(
                zero,
                dt(2015, 1, 1, 0, 0),
                dt(2015, 1, 1, 4, 0),
                BasalOverride::Absolute(f64::NAN)
            ),
            Err(Error::InvalidOverride(_))
        ));
    }

    #[test]
    fn test_percent_and_absolute_agree() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        let by_percent = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 5, 0),
                dt(2015, 1, 1, 6, 0),
                BasalOverride::Percent(200.0),
            )
            .unwrap();
        let by_absolute = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 5, 0),
                dt(2015, 1, 1, 6, 0),
                BasalOverride::Absolute(1.85),
            )
            .unwrap();

        assert_eq!(by_percent.len(), 1);
        assert_eq!(by_absolute.len(), 1);
        assert_temp_basal(&by_percent[0], -420, -360, 0.925 / 60.0);
        assert_temp_basal(&by_absolute[0], -420, -360, 0.925 / 60.0);
    }

    #[test]
    fn test_cross_midnight_is_contiguous() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        let events = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 23, 0),
                dt(2015, 1, 2, 2, 0),
                BasalOverride::Percent(50.0),
            )
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_temp_basal(&events[0], 11 * 60, 12 * 60, -0.45 / 60.0);
        assert_temp_basal(&events[1], 12 * 60, 14 * 60, -0.45 / 60.0);
    }

    #[test]
    fn test_range_ending_at_midnight_has_no_next_day_piece() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        let events = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 21, 0),
                dt(2015, 1, 2, 0, 0),
                BasalOverride::Percent(0.0),
            )
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_temp_basal(&events[0], 9 * 60, 10 * 60, -0.8 / 60.0);
        assert_temp_basal(&events[1], 10 * 60, 12 * 60, -0.9 / 60.0);
    }

    #[test]
    fn test_splits_at_every_crossed_boundary() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        let events = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 11, 0),
                dt(2015, 1, 1, 16, 0),
                BasalOverride::Absolute(1.0),
            )
            .unwrap();

        let intervals: Vec<_> = events.iter().filter_map(|e| e.interval()).collect();
        assert_eq!(intervals, vec![(-60, 0), (0, 120), (120, 180), (180, 240)]);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn test_boundary_segment_at_range_end_is_dropped() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        // 09:00 starts a new segment exactly at the range end
        let events = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 8, 0),
                dt(2015, 1, 1, 9, 0),
                BasalOverride::Percent(50.0),
            )
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_temp_basal(&events[0], -240, -180, -0.925 / 2.0 / 60.0);
    }

    #[test]
    fn test_unchanged_rate_emits_zero_delta() {
        let schedule = test_schedule();
        let zero = dt(2015, 1, 1, 12, 0);

        let events = schedule
            .adjustments_in_range(
                zero,
                dt(2015, 1, 1, 13, 0),
                dt(2015, 1, 1, 14, 30),
                BasalOverride::Percent(100.0),
            )
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_temp_basal(&events[0], 60, 120, 0.0);
        assert_temp_basal(&events[1], 120, 150, 0.0);
    }
}
