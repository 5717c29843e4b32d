//! SQLite statistics backend (feature `sqlite`).
//!
//! Creates `operation_stats.db` in the configured output directory with one
//! `operation_stats` table.

use std::path::Path;

use rusqlite::Connection;

use crate::writer::StatsWriter;
use crate::{OperationStats, StatsResult};

pub const DB_FILE: &str = "operation_stats.db";

/// Writes statistics rows to an SQLite database.
pub struct SqliteStatsWriter {
    conn:     Connection,
    finished: bool,
}

impl SqliteStatsWriter {
    /// Open (or create) the database in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> StatsResult<Self> {
        let conn = Connection::open(dir.join(DB_FILE))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS operation_stats (
                 target           TEXT    NOT NULL,
                 user             INTEGER NOT NULL,
                 behavior         INTEGER NOT NULL,
                 op_index         INTEGER NOT NULL,
                 op_name          TEXT    NOT NULL,
                 failed           INTEGER NOT NULL,
                 failure          TEXT,
                 start_ms         INTEGER NOT NULL,
                 end_ms           INTEGER NOT NULL,
                 response_time_ms INTEGER NOT NULL,
                 cycle_time_ms    INTEGER NOT NULL,
                 total_steps      INTEGER NOT NULL,
                 within_limit     INTEGER NOT NULL
             );",
        )?;

        Ok(Self { conn, finished: false })
    }
}

impl StatsWriter for SqliteStatsWriter {
    fn write(&mut self, row: &OperationStats) -> StatsResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO operation_stats \
             (target, user, behavior, op_index, op_name, failed, failure, start_ms, end_ms, \
              response_time_ms, cycle_time_ms, total_steps, within_limit) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        stmt.execute(rusqlite::params![
            row.target,
            row.user.0,
            row.behavior.0 as i64,
            row.op_index.0,
            row.op_name,
            row.failed,
            row.failure,
            row.start_offset.as_millis() as i64,
            row.end_offset.as_millis() as i64,
            row.response_time().as_millis() as i64,
            row.cycle_time.as_millis() as i64,
            row.total_steps,
            row.within_limit(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> StatsResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
