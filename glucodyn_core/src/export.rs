//! Timeline export.
//!
//! Decoded events are written either as the simulator's JSON event list or
//! as a flat CSV table for inspection in a spreadsheet.

use crate::{Error, Result, SimulationEvent};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Output encoding for a decoded timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::Config(format!("Unknown export format: {}", other))),
        }
    }
}

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    etype: &'static str,
    time: i64,
    t1: Option<i64>,
    t2: Option<i64>,
    dbdt: Option<f64>,
    units: Option<f64>,
    grams: Option<f64>,
    ctype: Option<u32>,
}

impl From<&SimulationEvent> for CsvRow {
    fn from(event: &SimulationEvent) -> Self {
        let mut row = CsvRow {
            etype: event.etype(),
            time: event.time_minutes(),
            t1: None,
            t2: None,
            dbdt: None,
            units: None,
            grams: None,
            ctype: None,
        };

        match event {
            SimulationEvent::Bolus { units, .. } => row.units = Some(*units),
            SimulationEvent::Carb {
                grams,
                absorption_class,
                ..
            } => {
                row.grams = Some(*grams);
                row.ctype = Some(*absorption_class);
            }
            SimulationEvent::TempBasal {
                start_minutes,
                end_minutes,
                delta_rate_per_minute,
                ..
            } => {
                row.t1 = Some(*start_minutes);
                row.t2 = Some(*end_minutes);
                row.dbdt = Some(*delta_rate_per_minute);
            }
        }

        row
    }
}

/// Write events as a pretty-printed JSON array
pub fn write_json<W: Write>(writer: W, events: &[SimulationEvent]) -> Result<()> {
    let mut writer = writer;
    serde_json::to_writer_pretty(&mut writer, events)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write events as CSV with a header row
pub fn write_csv<W: Write>(writer: W, events: &[SimulationEvent]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    for event in events {
        writer.serialize(CsvRow::from(event))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write events in the given format
pub fn write_events<W: Write>(writer: W, events: &[SimulationEvent], format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(writer, events),
        ExportFormat::Csv => write_csv(writer, events),
    }
}

/// Atomically write events to `path`
///
/// The timeline is written to a temp file in the destination directory,
/// synced, and renamed over `path`, so readers never observe a partial file.
pub fn export_to_path(path: &Path, events: &[SimulationEvent], format: ExportFormat) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    write_events(&mut temp_file, events, format)?;
    temp_file.as_file().sync_all()?;
    temp_file
        .persist(path)
        .map_err(|e| Error::Io(e.error))?;

    tracing::info!("Wrote {} events to {:?}", events.len(), path);
    Ok(())
}
