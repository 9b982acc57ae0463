#![forbid(unsafe_code)]

//! Core decoding logic for the GlucoDyn event history.
//!
//! This crate provides:
//! - Domain types (raw pump history records, basal schedules, simulation events)
//! - Basal schedule range queries and rate override expansion
//! - The history event decoder
//! - Ambient support (configuration, input loading, export)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod timeline;
pub mod schedule;
pub mod decoder;
pub mod input;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use schedule::{BasalSchedule, BasalScheduleSegment};
pub use decoder::{decode_history, DecoderOptions, EventDecoder};
pub use timeline::Timeline;
pub use input::{load_basal_schedule, load_history};
pub use export::{export_to_path, write_csv, write_events, write_json, ExportFormat};
