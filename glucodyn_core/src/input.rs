//! Loaders for device tool output.
//!
//! History and basal schedule files are the JSON documents produced by the
//! pump's command-line tool after upstream cleaning. Unlike optional signal
//! files, both are required inputs: a missing or malformed file is an error.

use crate::{BasalSchedule, RawHistoryRecord, Result};
use std::path::Path;

/// Load an ordered list of history records from a JSON array
pub fn load_history(path: &Path) -> Result<Vec<RawHistoryRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let records: Vec<RawHistoryRecord> = serde_json::from_str(&contents)?;

    let unrecognized = records
        .iter()
        .filter(|r| matches!(r, RawHistoryRecord::Unrecognized))
        .count();
    tracing::info!(
        "Loaded {} history records from {:?} ({} unrecognized)",
        records.len(),
        path,
        unrecognized
    );

    Ok(records)
}

/// Load and validate a daily basal schedule from a JSON array of segments
pub fn load_basal_schedule(path: &Path) -> Result<BasalSchedule> {
    let contents = std::fs::read_to_string(path)?;
    let schedule: BasalSchedule = serde_json::from_str(&contents)?;

    tracing::info!(
        "Loaded basal schedule with {} segments from {:?}",
        schedule.segments().len(),
        path
    );

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_load_history() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("history.json");

        let json = r#"[
            {"_type": "PumpResume", "_body": "", "_head": "1f20",
             "timestamp": "2015-06-06T20:50:01"},
            {"_type": "ChangeTime", "timestamp": "2015-06-06T20:00:00"},
            {"_type": "PumpSuspend", "_body": "", "_head": "1e01",
             "timestamp": "2015-06-06T20:49:57"}
        ]"#;
        std::fs::write(&path, json).unwrap();

        let records = load_history(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], RawHistoryRecord::PumpResume { .. }));
        assert_eq!(records[1], RawHistoryRecord::Unrecognized);
        assert!(matches!(records[2], RawHistoryRecord::PumpSuspend { .. }));
    }

    #[test]
    fn test_missing_history_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        assert!(matches!(load_history(&path), Err(Error::Io(_))));
    }

    #[test]
    fn test_load_basal_schedule() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("basal.json");

        let json = r#"[
            {"i": 0, "start": "00:00:00", "rate": 0.9, "minutes": 0},
            {"i": 1, "start": "04:00:00", "rate": 0.925, "minutes": 240},
            {"i": 2, "start": "09:00:00", "rate": 0.85, "minutes": 540}
        ]"#;
        std::fs::write(&path, json).unwrap();

        let schedule = load_basal_schedule(&path).unwrap();
        assert_eq!(schedule.segments().len(), 3);
        assert_eq!(schedule.segments()[2].rate_per_hour, 0.85);
    }

    #[test]
    fn test_empty_basal_schedule_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("basal.json");
        std::fs::write(&path, "[]").unwrap();

        assert!(matches!(load_basal_schedule(&path), Err(Error::Json(_))));
    }
}
