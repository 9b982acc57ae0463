//! Core domain types for the GlucoDyn event history.
//!
//! This module defines the fundamental types used throughout the system:
//! - Raw pump history records, as produced by the device tool
//! - Basal rate overrides (percent or absolute)
//! - Simulation events consumed by the GlucoDyn simulator

use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Raw History Records
// ============================================================================

/// Delivery style of a bolus record
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BolusKind {
    Normal,
    /// Extended delivery over `duration` minutes
    Square,
}

/// How a temp basal `rate` is interpreted
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TempBasalKind {
    Percent,
    Absolute,
}

impl TempBasalKind {
    /// Pair this adjustment kind with a record's rate
    pub fn to_override(self, rate: f64) -> BasalOverride {
        match self {
            TempBasalKind::Percent => BasalOverride::Percent(rate),
            TempBasalKind::Absolute => BasalOverride::Absolute(rate),
        }
    }
}

/// A single pump history record, tagged by `_type` in the device tool's JSON.
///
/// Records the decoder has no handler for deserialize to `Unrecognized` so
/// that new upstream record kinds never break decoding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "_type")]
pub enum RawHistoryRecord {
    Bolus {
        timestamp: NaiveDateTime,
        #[serde(rename = "type")]
        kind: BolusKind,
        /// Delivered units
        amount: f64,
        /// Programmed units
        #[serde(default)]
        programmed: f64,
        /// Programmed duration in minutes (square boluses only)
        #[serde(default)]
        duration: i64,
    },
    BolusWizard {
        timestamp: NaiveDateTime,
        #[serde(default)]
        carb_input: f64,
        #[serde(rename = "_body", default)]
        body_signature: String,
    },
    JournalEntryMealMarker {
        timestamp: NaiveDateTime,
        #[serde(default)]
        carb_input: f64,
    },
    PumpSuspend {
        timestamp: NaiveDateTime,
    },
    PumpResume {
        timestamp: NaiveDateTime,
    },
    TempBasal {
        timestamp: NaiveDateTime,
        rate: f64,
        #[serde(rename = "temp")]
        adjustment_kind: TempBasalKind,
    },
    TempBasalDuration {
        timestamp: NaiveDateTime,
        #[serde(rename = "duration (min)")]
        duration_minutes: i64,
    },
    #[serde(other)]
    Unrecognized,
}

impl RawHistoryRecord {
    /// Timestamp of the record, if it is a recognized kind
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RawHistoryRecord::Bolus { timestamp, .. }
            | RawHistoryRecord::BolusWizard { timestamp, .. }
            | RawHistoryRecord::JournalEntryMealMarker { timestamp, .. }
            | RawHistoryRecord::PumpSuspend { timestamp }
            | RawHistoryRecord::PumpResume { timestamp }
            | RawHistoryRecord::TempBasal { timestamp, .. }
            | RawHistoryRecord::TempBasalDuration { timestamp, .. } => Some(*timestamp),
            RawHistoryRecord::Unrecognized => None,
        }
    }

    /// The record's `_type` tag
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawHistoryRecord::Bolus { .. } => "Bolus",
            RawHistoryRecord::BolusWizard { .. } => "BolusWizard",
            RawHistoryRecord::JournalEntryMealMarker { .. } => "JournalEntryMealMarker",
            RawHistoryRecord::PumpSuspend { .. } => "PumpSuspend",
            RawHistoryRecord::PumpResume { .. } => "PumpResume",
            RawHistoryRecord::TempBasal { .. } => "TempBasal",
            RawHistoryRecord::TempBasalDuration { .. } => "TempBasalDuration",
            RawHistoryRecord::Unrecognized => "Unrecognized",
        }
    }
}

// ============================================================================
// Basal Overrides
// ============================================================================

/// A requested replacement for the scheduled basal rate
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BasalOverride {
    /// Percentage of the scheduled rate (100 = unchanged)
    Percent(f64),
    /// Absolute rate in U/hour
    Absolute(f64),
}

impl BasalOverride {
    /// Build an override from two optional fields, exactly one of which must be set
    pub fn from_parts(percent: Option<f64>, absolute: Option<f64>) -> Result<Self> {
        let ov = match (percent, absolute) {
            (Some(p), None) => BasalOverride::Percent(p),
            (None, Some(a)) => BasalOverride::Absolute(a),
            (None, None) => {
                return Err(Error::InvalidOverride(
                    "one of percent or absolute rate is required".into(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidOverride(
                    "percent and absolute rate are mutually exclusive".into(),
                ))
            }
        };
        ov.validate()?;
        Ok(ov)
    }

    /// Reject non-finite or negative override values
    pub fn validate(&self) -> Result<()> {
        let value = match *self {
            BasalOverride::Percent(v) | BasalOverride::Absolute(v) => v,
        };
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidOverride(format!(
                "override value must be finite and non-negative, got {}",
                value
            )));
        }
        Ok(())
    }

    /// The rate (U/hour) delivered in place of `scheduled_rate`
    pub fn rate_for(&self, scheduled_rate: f64) -> f64 {
        match *self {
            BasalOverride::Percent(percent) => scheduled_rate * percent / 100.0,
            BasalOverride::Absolute(rate) => rate,
        }
    }
}

// ============================================================================
// Simulation Events
// ============================================================================

/// A decoded event, timed in minutes relative to the zero-reference timestamp.
///
/// Serializes in the simulator's `uevent` shape (`etype`, `time`, `t1`, ...).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "etype", rename_all = "lowercase")]
pub enum SimulationEvent {
    Bolus {
        #[serde(rename = "time")]
        time_minutes: i64,
        units: f64,
    },
    Carb {
        #[serde(rename = "time")]
        time_minutes: i64,
        grams: f64,
        /// Absorption duration class in minutes
        #[serde(rename = "ctype")]
        absorption_class: u32,
    },
    TempBasal {
        #[serde(rename = "time")]
        time_minutes: i64,
        #[serde(rename = "t1")]
        start_minutes: i64,
        #[serde(rename = "t2")]
        end_minutes: i64,
        /// Difference from the scheduled rate, in U/minute
        #[serde(rename = "dbdt")]
        delta_rate_per_minute: f64,
    },
}

impl SimulationEvent {
    /// Build a temp basal event starting at `start_minutes`
    pub fn temp_basal(start_minutes: i64, end_minutes: i64, delta_rate_per_minute: f64) -> Self {
        SimulationEvent::TempBasal {
            time_minutes: start_minutes,
            start_minutes,
            end_minutes,
            delta_rate_per_minute,
        }
    }

    pub fn time_minutes(&self) -> i64 {
        match self {
            SimulationEvent::Bolus { time_minutes, .. }
            | SimulationEvent::Carb { time_minutes, .. }
            | SimulationEvent::TempBasal { time_minutes, .. } => *time_minutes,
        }
    }

    /// The simulator's `etype` tag for this event
    pub fn etype(&self) -> &'static str {
        match self {
            SimulationEvent::Bolus { .. } => "bolus",
            SimulationEvent::Carb { .. } => "carb",
            SimulationEvent::TempBasal { .. } => "tempbasal",
        }
    }

    /// `(start, end)` of a temp basal event
    pub fn interval(&self) -> Option<(i64, i64)> {
        match self {
            SimulationEvent::TempBasal {
                start_minutes,
                end_minutes,
                ..
            } => Some((*start_minutes, *end_minutes)),
            _ => None,
        }
    }
}
