//! Simulation window and relative-time conversion.

use crate::{Error, Result};
use chrono::{Duration, NaiveDateTime};

/// The zero-reference timestamp and the simulation window around it.
///
/// Every emitted event is timed in whole minutes relative to `zero`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeline {
    zero: NaiveDateTime,
    sim_hours: u32,
}

impl Timeline {
    pub fn new(zero: NaiveDateTime, sim_hours: u32) -> Self {
        Self { zero, sim_hours }
    }

    pub fn zero(&self) -> NaiveDateTime {
        self.zero
    }

    pub fn sim_hours(&self) -> u32 {
        self.sim_hours
    }

    /// Earliest edge of the simulation window (`zero - sim_hours`)
    pub fn window_start(&self) -> Result<NaiveDateTime> {
        Duration::try_hours(i64::from(self.sim_hours))
            .and_then(|span| self.zero.checked_sub_signed(span))
            .ok_or_else(|| self.out_of_range())
    }

    /// Latest edge of the simulation window (`zero + sim_hours`)
    pub fn window_end(&self) -> Result<NaiveDateTime> {
        Duration::try_hours(i64::from(self.sim_hours))
            .and_then(|span| self.zero.checked_add_signed(span))
            .ok_or_else(|| self.out_of_range())
    }

    fn out_of_range(&self) -> Error {
        Error::InvalidRange(format!(
            "a {} hour window around {} is not representable",
            self.sim_hours, self.zero
        ))
    }

    /// Minutes elapsed since `zero`, rounded half away from zero
    pub fn relative_minutes(&self, timestamp: NaiveDateTime) -> i64 {
        relative_minutes(self.zero, timestamp)
    }
}

/// Minutes from `zero` to `timestamp` (negative in the past), rounded half away from zero
pub fn relative_minutes(zero: NaiveDateTime, timestamp: NaiveDateTime) -> i64 {
    let millis = (timestamp - zero).num_milliseconds() as f64;
    (millis / 60_000.0).round() as i64
}
