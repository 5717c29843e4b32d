//! Run-level configuration.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Cadence, LgError, LgResult};

/// Top-level driver configuration.
///
/// Typically loaded from a JSON file by the application and handed to the
/// driver builder.  Every field has a default, so `{}` is a valid document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name of the system under test; recorded on every statistics row.
    pub target_name: String,

    /// Master RNG seed.  The same seed and population replays the same
    /// transition decisions.
    pub seed: u64,

    /// Measure operation gaps from completion (`true`) instead of from the
    /// previous start (`false`).
    pub use_think_time: bool,

    /// Ceiling on how long a user reset may take before it is forced to
    /// complete.  Default: 60 s.
    pub reset_timeout_secs: u64,

    /// Worker threads for the shared task pool.  `None` uses all logical cores.
    pub worker_threads: Option<usize>,

    /// Maximum number of URLs remembered by each user's page cache.
    pub page_cache_capacity: usize,

    /// Directory for statistics output.  `None` disables file output.
    pub stats_dir: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            target_name:         "target".to_owned(),
            seed:                0,
            use_think_time:      false,
            reset_timeout_secs:  60,
            worker_threads:      None,
            page_cache_capacity: 1_024,
            stats_dir:           None,
        }
    }
}

impl DriverConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_path(path: &Path) -> LgResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(file)
    }

    /// Like [`from_json_path`][Self::from_json_path] but accepts any `Read`.
    pub fn from_json_reader<R: Read>(reader: R) -> LgResult<Self> {
        let config: DriverConfig =
            serde_json::from_reader(reader).map_err(|e| LgError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> LgResult<()> {
        if self.reset_timeout_secs == 0 {
            return Err(LgError::Config("reset_timeout_secs must be positive".into()));
        }
        if self.worker_threads == Some(0) {
            return Err(LgError::Config("worker_threads must be positive when set".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn cadence(&self) -> Cadence {
        Cadence::from_think_time(self.use_think_time)
    }

    #[inline]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    /// Resolved worker-thread count for the shared task pool.
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        })
    }
}
