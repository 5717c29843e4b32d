//! `StatsCollector`: where the behavior core submits finished operations.

use parking_lot::Mutex;
use tracing::warn;

use crate::csv::CsvStatsWriter;
use crate::writer::StatsWriter;
use crate::{OperationStats, StatsError};

/// Receives exactly one record per completed or failed operation.
///
/// Called from worker tasks, possibly concurrently; must not block for long.
pub trait StatsCollector: Send + Sync {
    fn submit(&self, stats: OperationStats);
}

// ── No-op ─────────────────────────────────────────────────────────────────────

pub struct NoopCollector;

impl StatsCollector for NoopCollector {
    #[inline]
    fn submit(&self, _stats: OperationStats) {}
}

// ── In memory ─────────────────────────────────────────────────────────────────

/// Keeps every record.
#[derive(Default)]
pub struct MemoryCollector {
    records: Mutex<Vec<OperationStats>>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<OperationStats> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn failures(&self) -> usize {
        self.records.lock().iter().filter(|r| r.failed).count()
    }

    pub fn take(&self) -> Vec<OperationStats> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl StatsCollector for MemoryCollector {
    fn submit(&self, stats: OperationStats) {
        self.records.lock().push(stats);
    }
}

// ── Writer bridge ─────────────────────────────────────────────────────────────

/// Forwards every record to a [`StatsWriter`].
///
/// `submit` has no return value, so write errors are stored; only the first
/// one is kept.  Check with [`take_error`][Self::take_error] after the run.
pub struct WriterCollector<W: StatsWriter> {
    inner: Mutex<WriterState<W>>,
}

struct WriterState<W> {
    writer:     W,
    last_error: Option<StatsError>,
}

/// The CSV-backed collector.
pub type CsvCollector = WriterCollector<CsvStatsWriter>;

impl<W: StatsWriter> WriterCollector<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: Mutex::new(WriterState { writer, last_error: None }) }
    }

    /// Flush the writer.  Safe to call more than once.
    pub fn finish(&self) {
        let mut state = self.inner.lock();
        let result = state.writer.finish();
        state.store_err(result);
    }

    /// Take the stored write error, if any.
    pub fn take_error(&self) -> Option<StatsError> {
        self.inner.lock().last_error.take()
    }

    /// Unwrap the inner writer.
    pub fn into_writer(self) -> W {
        self.inner.into_inner().writer
    }
}

impl<W> WriterState<W> {
    fn store_err(&mut self, result: crate::StatsResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.last_error.is_none() {
                warn!(error = %e, "statistics write failed");
                self.last_error = Some(e);
            }
        }
    }
}

impl<W: StatsWriter> StatsCollector for WriterCollector<W> {
    fn submit(&self, stats: OperationStats) {
        let mut state = self.inner.lock();
        let result = state.writer.write(&stats);
        state.store_err(result);
    }
}
