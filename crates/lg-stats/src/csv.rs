//! CSV statistics backend.
//!
//! Creates `operation_stats.csv` in the configured output directory.  Times
//! are written in whole milliseconds.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use csv::Writer;

use crate::writer::StatsWriter;
use crate::{OperationStats, StatsResult};

pub const CSV_FILE: &str = "operation_stats.csv";

const HEADER: [&str; 13] = [
    "target",
    "user",
    "behavior",
    "op_index",
    "op_name",
    "failed",
    "failure",
    "start_ms",
    "end_ms",
    "response_time_ms",
    "cycle_time_ms",
    "total_steps",
    "within_limit",
];

/// Writes one CSV row per operation.
pub struct CsvStatsWriter {
    out:      Writer<File>,
    finished: bool,
}

impl CsvStatsWriter {
    /// Open (or create) the CSV file in `dir` and write the header row.
    pub fn new(dir: &Path) -> StatsResult<Self> {
        let mut out = Writer::from_path(dir.join(CSV_FILE))?;
        out.write_record(HEADER)?;
        Ok(Self { out, finished: false })
    }
}

impl StatsWriter for CsvStatsWriter {
    fn write(&mut self, row: &OperationStats) -> StatsResult<()> {
        self.out.write_record(&[
            row.target.clone(),
            row.user.0.to_string(),
            row.behavior.0.to_string(),
            row.op_index.0.to_string(),
            row.op_name.clone(),
            (row.failed as u8).to_string(),
            row.failure.clone().unwrap_or_default(),
            millis(row.start_offset),
            millis(row.end_offset),
            millis(row.response_time()),
            millis(row.cycle_time),
            row.total_steps.to_string(),
            (row.within_limit() as u8).to_string(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> StatsResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.out.flush()?;
        Ok(())
    }
}

fn millis(d: Duration) -> String {
    d.as_millis().to_string()
}
