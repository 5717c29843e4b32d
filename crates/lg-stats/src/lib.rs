//! `lg-stats`: what the behavior core reports about each operation.
//!
//! The core builds one [`OperationStats`] per finished operation and hands
//! it to a [`StatsCollector`].  Rolling records up into intervals and
//! percentiles is the collector's business, not the core's.
//!
//! | Type                 | Purpose                                              |
//! |----------------------|------------------------------------------------------|
//! | [`NoopCollector`]    | discards everything                                  |
//! | [`MemoryCollector`]  | keeps every record in memory (tests, small runs)     |
//! | [`WriterCollector`]  | forwards to any [`StatsWriter`], keeps first error   |
//! | [`CsvStatsWriter`]   | `operation_stats.csv`                                |
//! | `SqliteStatsWriter`  | `operation_stats.db` (feature `sqlite`)              |
//!
//! # Usage
//!
//! ```rust,ignore
//! use lg_stats::{CsvCollector, CsvStatsWriter};
//!
//! let collector = Arc::new(CsvCollector::new(CsvStatsWriter::new(Path::new("./out"))?));
//! // … run the driver with `collector` …
//! collector.finish();
//! if let Some(e) = collector.take_error() { eprintln!("stats error: {e}"); }
//! ```

pub mod collector;
pub mod csv;
pub mod error;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;


pub use collector::{CsvCollector, MemoryCollector, NoopCollector, StatsCollector, WriterCollector};
pub use self::csv::CsvStatsWriter;
pub use error::{StatsError, StatsResult};
pub use row::OperationStats;
pub use writer::StatsWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStatsWriter;
