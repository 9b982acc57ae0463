//! History event decoder.
//!
//! Folds an ordered batch of pump history records into the simulator's event
//! timeline. Correlation state carried across records:
//! - a pending `TempBasalDuration`, consumed by the next `TempBasal`
//! - a pending suspend or resume, paired with its counterpart
//! - the most recent temp basal directive, used to stitch directives so
//!   that they never overlap
//! - BolusWizard body signatures already accepted, for duplicate suppression
//!
//! Each decoder owns its state exclusively and borrows the basal schedule
//! immutably, so independent decoding runs can proceed in parallel.

use crate::timeline::Timeline;
use crate::{
    BasalOverride, BasalSchedule, BolusKind, Error, RawHistoryRecord, Result, SimulationEvent,
    TempBasalKind,
};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::ops::Range;

/// Tunable decoding constants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Absorption class stamped on every carb event, in minutes
    pub carb_absorption_minutes: u32,
    /// BolusWizard records with the same body this close together are duplicates
    pub duplicate_carb_window_seconds: i64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            carb_absorption_minutes: 180,
            duplicate_carb_window_seconds: 60,
        }
    }
}

/// The unpaired half of a suspend/resume pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingSuspension {
    Suspend(NaiveDateTime),
    Resume(NaiveDateTime),
}

/// The most recently decoded temp basal directive
#[derive(Clone, Debug, PartialEq, Eq)]
struct TempBasalBoundary {
    start: i64,
    end: i64,
    /// Indices of the directive's events in the output list
    emitted: Range<usize>,
}

#[derive(Debug, Default)]
struct DecoderState {
    pending_duration: Option<i64>,
    pending_suspension: Option<PendingSuspension>,
    last_temp_basal: Option<TempBasalBoundary>,
    seen_carbs: HashMap<String, Vec<NaiveDateTime>>,
}

/// Stateful decoder for one batch of history records
#[derive(Debug)]
pub struct EventDecoder<'a> {
    schedule: &'a BasalSchedule,
    timeline: Timeline,
    options: DecoderOptions,
    state: DecoderState,
    events: Vec<SimulationEvent>,
}

impl<'a> EventDecoder<'a> {
    /// Create a decoder whose events are relative to `zero_datetime`
    pub fn new(schedule: &'a BasalSchedule, zero_datetime: NaiveDateTime, sim_hours: u32) -> Self {
        Self {
            schedule,
            timeline: Timeline::new(zero_datetime, sim_hours),
            options: DecoderOptions::default(),
            state: DecoderState::default(),
            events: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: DecoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    /// Decode every record in order and finalize
    pub fn decode<'r, I>(mut self, records: I) -> Result<Vec<SimulationEvent>>
    where
        I: IntoIterator<Item = &'r RawHistoryRecord>,
    {
        for record in records {
            self.push(record)?;
        }
        self.finish()
    }

    /// Feed the next record of the batch
    pub fn push(&mut self, record: &RawHistoryRecord) -> Result<()> {
        match record.timestamp() {
            Some(timestamp) => tracing::trace!("Decoding {} record at {}", record.kind_name(), timestamp),
            None => tracing::trace!("Skipping unrecognized record"),
        }

        match record {
            RawHistoryRecord::Bolus {
                timestamp,
                kind,
                amount,
                programmed,
                duration,
            } => self.decode_bolus(*timestamp, *kind, *amount, *programmed, *duration),
            RawHistoryRecord::BolusWizard {
                timestamp,
                carb_input,
                body_signature,
            } => self.decode_bolus_wizard(*timestamp, *carb_input, body_signature),
            RawHistoryRecord::JournalEntryMealMarker {
                timestamp,
                carb_input,
            } => self.decode_meal_marker(*timestamp, *carb_input),
            RawHistoryRecord::PumpSuspend { timestamp } => self.decode_suspend(*timestamp)?,
            RawHistoryRecord::PumpResume { timestamp } => self.decode_resume(*timestamp)?,
            RawHistoryRecord::TempBasalDuration {
                duration_minutes, ..
            } => {
                if let Some(previous) = self.state.pending_duration {
                    tracing::debug!(
                        "TempBasalDuration of {} min was never matched, replacing it",
                        previous
                    );
                }
                self.state.pending_duration = Some(*duration_minutes);
            }
            RawHistoryRecord::TempBasal {
                timestamp,
                rate,
                adjustment_kind,
            } => self.decode_temp_basal(*timestamp, *rate, *adjustment_kind)?,
            RawHistoryRecord::Unrecognized => {}
        }

        Ok(())
    }

    /// Resolve unpaired suspend/resume records against the window edge
    pub fn finish(mut self) -> Result<Vec<SimulationEvent>> {
        match self.state.pending_suspension.take() {
            Some(PendingSuspension::Suspend(suspended_at)) => {
                tracing::debug!("Unmatched suspend at {}, extending to window end", suspended_at);
                self.resolve_suspension(suspended_at, self.timeline.window_end()?)?;
            }
            Some(PendingSuspension::Resume(resumed_at)) => {
                tracing::debug!("Unmatched resume at {}, starting at window start", resumed_at);
                self.resolve_suspension(self.timeline.window_start()?, resumed_at)?;
            }
            None => {}
        }

        if let Some(duration) = self.state.pending_duration {
            tracing::debug!("Dropping TempBasalDuration of {} min with no TempBasal", duration);
        }

        tracing::info!("Decoded {} simulation events", self.events.len());
        Ok(self.events)
    }

    fn decode_bolus(
        &mut self,
        timestamp: NaiveDateTime,
        kind: BolusKind,
        amount: f64,
        programmed: f64,
        duration: i64,
    ) {
        match kind {
            BolusKind::Square => self.decode_square_bolus(timestamp, amount, programmed, duration),
            BolusKind::Normal if amount > 0.0 => {
                self.events.push(SimulationEvent::Bolus {
                    time_minutes: self.timeline.relative_minutes(timestamp),
                    units: amount,
                });
            }
            BolusKind::Normal => {
                tracing::debug!("Skipping empty bolus at {}", timestamp);
            }
        }
    }

    /// Extended boluses become additive insulin delivery over their duration
    fn decode_square_bolus(
        &mut self,
        timestamp: NaiveDateTime,
        delivered: f64,
        programmed: f64,
        duration: i64,
    ) {
        if programmed <= 0.0 || duration <= 0 {
            tracing::warn!(
                "Skipping square bolus at {} with programmed {} U over {} min",
                timestamp,
                programmed,
                duration
            );
            return;
        }

        let start = self.timeline.relative_minutes(timestamp);
        let rate = programmed / duration as f64;

        // Delivery that ended before the window started was likely cut short
        let mut duration = duration;
        if start.saturating_add(duration) < 0 {
            duration = (duration as f64 * delivered / programmed) as i64;
        }
        if duration <= 0 {
            tracing::debug!("Square bolus at {} delivered nothing", timestamp);
            return;
        }

        self.events
            .push(SimulationEvent::temp_basal(start, start.saturating_add(duration), rate));
    }

    fn decode_bolus_wizard(&mut self, timestamp: NaiveDateTime, carb_input: f64, body_signature: &str) {
        let window_millis = self.options.duplicate_carb_window_seconds * 1000;
        let seen = self
            .state
            .seen_carbs
            .entry(body_signature.to_string())
            .or_default();

        if seen
            .iter()
            .any(|other| (*other - timestamp).num_milliseconds().abs() <= window_millis)
        {
            tracing::debug!("Suppressing duplicate BolusWizard record at {}", timestamp);
            return;
        }

        seen.push(timestamp);
        self.decode_meal_marker(timestamp, carb_input);
    }

    fn decode_meal_marker(&mut self, timestamp: NaiveDateTime, carb_input: f64) {
        if carb_input > 0.0 {
            self.events.push(SimulationEvent::Carb {
                time_minutes: self.timeline.relative_minutes(timestamp),
                grams: carb_input,
                absorption_class: self.options.carb_absorption_minutes,
            });
        }
    }

    fn decode_suspend(&mut self, suspended_at: NaiveDateTime) -> Result<()> {
        let pending = match self.state.pending_suspension.take() {
            None => Some(PendingSuspension::Suspend(suspended_at)),
            Some(PendingSuspension::Resume(resumed_at)) if suspended_at <= resumed_at => {
                self.resolve_suspension(suspended_at, resumed_at)?;
                None
            }
            Some(PendingSuspension::Resume(resumed_at)) => {
                // The resume belongs to a suspend older than the history
                self.resolve_suspension(self.timeline.window_start()?, resumed_at)?;
                Some(PendingSuspension::Suspend(suspended_at))
            }
            Some(PendingSuspension::Suspend(other)) => {
                Some(PendingSuspension::Suspend(other.min(suspended_at)))
            }
        };
        self.state.pending_suspension = pending;
        Ok(())
    }

    fn decode_resume(&mut self, resumed_at: NaiveDateTime) -> Result<()> {
        let pending = match self.state.pending_suspension.take() {
            None => Some(PendingSuspension::Resume(resumed_at)),
            Some(PendingSuspension::Suspend(suspended_at)) if suspended_at <= resumed_at => {
                self.resolve_suspension(suspended_at, resumed_at)?;
                None
            }
            Some(PendingSuspension::Suspend(suspended_at)) => {
                // The suspend is still in effect past the end of the history
                self.resolve_suspension(suspended_at, self.timeline.window_end()?)?;
                Some(PendingSuspension::Resume(resumed_at))
            }
            Some(PendingSuspension::Resume(other)) => {
                Some(PendingSuspension::Resume(other.max(resumed_at)))
            }
        };
        self.state.pending_suspension = pending;
        Ok(())
    }

    /// Emit a zero-rate adjustment over the suspension, clamped to the window
    fn resolve_suspension(&mut self, suspended_at: NaiveDateTime, resumed_at: NaiveDateTime) -> Result<()> {
        let start = suspended_at.max(self.timeline.window_start()?);
        let end = resumed_at.min(self.timeline.window_end()?);
        if start >= end {
            tracing::debug!(
                "Suspension {} to {} lies outside the simulation window",
                suspended_at,
                resumed_at
            );
            return Ok(());
        }

        // A window wider than 12 hours can hold a suspension of a day or more
        let max_piece = Duration::hours(12);
        let mut piece_start = start;
        while piece_start < end {
            let piece_end = piece_start
                .checked_add_signed(max_piece)
                .map_or(end, |t| t.min(end));
            let events = self.schedule.adjustments_in_range(
                self.timeline.zero(),
                piece_start,
                piece_end,
                BasalOverride::Percent(0.0),
            )?;
            self.events.extend(events);
            piece_start = piece_end;
        }
        Ok(())
    }

    fn decode_temp_basal(
        &mut self,
        timestamp: NaiveDateTime,
        rate: f64,
        adjustment_kind: TempBasalKind,
    ) -> Result<()> {
        let Some(duration) = self.state.pending_duration.take() else {
            tracing::debug!("TempBasal at {} has no preceding duration, skipping", timestamp);
            return Ok(());
        };

        let end_at = Duration::try_minutes(duration)
            .and_then(|d| timestamp.checked_add_signed(d))
            .ok_or_else(|| {
                Error::InvalidRange(format!("TempBasal at {} lasts {} min", timestamp, duration))
            })?;
        let start = self.timeline.relative_minutes(timestamp);
        let end = self.timeline.relative_minutes(end_at);

        if rate == 0.0 || duration <= 0 {
            tracing::debug!("TempBasal cancellation at {}", timestamp);
            self.clip_last_temp_basal(start);
            self.state.last_temp_basal = Some(TempBasalBoundary {
                start,
                end,
                emitted: self.events.len()..self.events.len(),
            });
            return Ok(());
        }

        let mut adjustments = self.schedule.adjustments_in_range(
            self.timeline.zero(),
            timestamp,
            end_at,
            adjustment_kind.to_override(rate),
        )?;

        // A later directive was already decoded: this one ends where it begins
        let mut clipped_end = end;
        if let Some(later) = &self.state.last_temp_basal {
            if later.start > start && later.start < end {
                tracing::debug!("Clipping TempBasal at {} to end at {}", timestamp, later.start);
                clipped_end = later.start;
                for event in adjustments.iter_mut() {
                    clip_end(event, clipped_end);
                }
                adjustments.retain(|event| !is_empty_interval(event));
            }
        }

        self.clip_last_temp_basal(start);

        let first = self.events.len();
        self.events.extend(adjustments);
        self.state.last_temp_basal = Some(TempBasalBoundary {
            start,
            end: clipped_end,
            emitted: first..self.events.len(),
        });
        Ok(())
    }

    /// Cut the previous directive short if it was still running at `start`
    fn clip_last_temp_basal(&mut self, start: i64) {
        let Some(earlier) = self.state.last_temp_basal.as_mut() else {
            return;
        };
        if !(earlier.start <= start && start < earlier.end) {
            return;
        }

        tracing::debug!("Clipping previous TempBasal to end at {}", start);
        earlier.end = start;
        let range = earlier.emitted.clone();
        for event in &mut self.events[range.clone()] {
            clip_end(event, start);
        }

        let mut idx = 0;
        self.events.retain(|event| {
            let keep = !(range.contains(&idx) && is_empty_interval(event));
            idx += 1;
            keep
        });
    }
}

fn clip_end(event: &mut SimulationEvent, at: i64) {
    if let SimulationEvent::TempBasal { end_minutes, .. } = event {
        *end_minutes = (*end_minutes).min(at);
    }
}

fn is_empty_interval(event: &SimulationEvent) -> bool {
    matches!(event.interval(), Some((start, end)) if start >= end)
}

/// Decode a batch of records with default options
pub fn decode_history(
    schedule: &BasalSchedule,
    zero_datetime: NaiveDateTime,
    sim_hours: u32,
    records: &[RawHistoryRecord],
) -> Result<Vec<SimulationEvent>> {
    EventDecoder::new(schedule, zero_datetime, sim_hours).decode(records)
}
