//! lg-demo: drive a small simulated shopper population against a web shop.
//!
//! ```text
//! lg-demo [BASE_URL] [CONFIG_JSON] [TRANSITIONS_CSV]
//! ```
//!
//! Shoppers load the home page, browse products they found there, and now
//! and then add one to their cart.  Each shopper also runs a background
//! behavior polling for notifications.  The load steps through
//! [`LOAD_PROFILE`] and then winds down.
//!
//! Logging follows `RUST_LOG` (default `info`).  With `stats_dir` set in the
//! config file, every operation is written to `operation_stats.csv` there.

mod ops;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lg_core::{DriverConfig, UserId};
use lg_driver::{DriverBuilder, DriverObserver};
use lg_spec::{SpecRegistry, apply_transitions, load_specs_json_reader, load_transitions_csv};
use lg_stats::{CsvCollector, CsvStatsWriter, NoopCollector, OperationStats, StatsCollector};
use lg_transport::{ReqwestExchange, SpawningTransport};

// ── Constants ─────────────────────────────────────────────────────────────────

const DEFAULT_TARGET:   &str     = "http://127.0.0.1:8080/";
const USER_COUNT:       u32      = 20;
const SEED:             u64      = 42;
const REQUEST_TIMEOUT:  Duration = Duration::from_secs(30);

/// `(seconds to hold, active users)` steps.
const LOAD_PROFILE: [(u64, u32); 4] = [(10, 5), (20, 20), (10, 10), (5, 2)];

// ── Behavior specs ────────────────────────────────────────────────────────────

// shopper: home → product ⇄ product → cart → home …
// "cart" is a reset state, so every purchase starts a fresh shopper.
const SPECS_JSON: &str = r#"[
  {
    "name": "shopper",
    "operation_names": ["home", "product", "cart"],
    "transition_matrices": [
      [[0.0, 1.0, 0.0]],
      [[0.2, 0.6, 0.2]],
      [[1.0, 0.0, 0.0]]
    ],
    "mean_cycle_times": [4.0, 6.0, 3.0],
    "is_reset_state": [false, false, true],
    "async_behaviors": ["notifier", null, null],
    "max_num_async_behaviors": 1,
    "response_time_limits": [2000, 1500, 1000],
    "use_response_time": [true, true, true]
  },
  {
    "name": "notifier",
    "operation_names": ["notifications"],
    "transition_matrices": [[[1.0]]],
    "mean_cycle_times": [15.0]
  }
]"#;

// ── Collector wrapper to count rows ───────────────────────────────────────────

struct CountingCollector {
    inner:    Arc<dyn StatsCollector>,
    rows:     AtomicUsize,
    failures: AtomicUsize,
    slow:     AtomicUsize,
}

impl CountingCollector {
    fn new(inner: Arc<dyn StatsCollector>) -> Self {
        Self {
            inner,
            rows:     AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            slow:     AtomicUsize::new(0),
        }
    }
}

impl StatsCollector for CountingCollector {
    fn submit(&self, stats: OperationStats) {
        self.rows.fetch_add(1, Ordering::Relaxed);
        if stats.failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        } else if !stats.within_limit() {
            self.slow.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.submit(stats);
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ResetCounter {
    started: AtomicUsize,
}

impl DriverObserver for ResetCounter {
    fn on_reset_started(&self, _user: UserId) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let base_url = args.get(1).map(String::as_str).unwrap_or(DEFAULT_TARGET);
    let config = match args.get(2) {
        Some(path) => DriverConfig::from_json_path(Path::new(path))?,
        None => DriverConfig { target_name: "demo-shop".into(), seed: SEED, ..DriverConfig::default() },
    };
    let transitions = args.get(3).map(|p| Path::new(p).to_path_buf());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.resolved_worker_threads())
        .enable_all()
        .build()?;
    runtime.block_on(run(config, base_url, transitions.as_deref()))
}

async fn run(config: DriverConfig, base_url: &str, transitions: Option<&Path>) -> Result<()> {
    println!("=== lg-demo ===");
    println!("Target: {base_url}  |  Users: {USER_COUNT}  |  Seed: {}", config.seed);
    println!();

    // 1. Behavior specs, optionally with matrices from a CSV.
    let mut configs = load_specs_json_reader(Cursor::new(SPECS_JSON))?;
    if let Some(path) = transitions {
        apply_transitions(&mut configs, load_transitions_csv(path)?)?;
    }
    let mut registry = SpecRegistry::new();
    for spec in configs {
        registry.register_config(spec)?;
    }
    println!("Loaded {} behavior specs", registry.len());

    // 2. Transport and statistics.
    let exchange = ReqwestExchange::with_timeout(base_url, REQUEST_TIMEOUT)?;
    let transport = Arc::new(SpawningTransport::on_current(exchange));

    let csv = match &config.stats_dir {
        Some(dir) => Some(Arc::new(CsvCollector::new(CsvStatsWriter::new(dir)?))),
        None => None,
    };
    let sink: Arc<dyn StatsCollector> = match &csv {
        Some(csv) => csv.clone(),
        None => Arc::new(NoopCollector),
    };
    let stats = Arc::new(CountingCollector::new(sink));
    let resets = Arc::new(ResetCounter::default());

    // 3. Driver and population.
    let driver = DriverBuilder::new(config, Arc::new(registry), ops::create, transport)
        .stats(stats.clone())
        .observer(resets.clone())
        .build()?;
    driver.add_users("shopper", USER_COUNT)?;

    // 4. Step through the load profile.
    let wall = Instant::now();
    let mut steps = LOAD_PROFILE.iter();
    if let Some(&(hold, active)) = steps.next() {
        driver.start(active);
        info!(active, hold, "load step");
        tokio::time::sleep(Duration::from_secs(hold)).await;
    }
    for &(hold, active) in steps {
        driver.set_active_users(active);
        info!(active, hold, "load step");
        tokio::time::sleep(Duration::from_secs(hold)).await;
    }

    // 5. Wind down.
    driver.complete();
    let idle = driver.wait_idle(driver.config().reset_timeout()).await;
    if !idle {
        info!(live = driver.live_behaviors(), "forcing stop");
    }
    driver.stop_all();

    if let Some(csv) = &csv {
        csv.finish();
        if let Some(e) = csv.take_error() {
            return Err(e.into());
        }
    }

    println!();
    println!("Done in {:.1}s", wall.elapsed().as_secs_f64());
    println!(
        "Operations: {}  |  failed: {}  |  over limit: {}",
        stats.rows.load(Ordering::Relaxed),
        stats.failures.load(Ordering::Relaxed),
        stats.slow.load(Ordering::Relaxed),
    );
    println!(
        "Resets: {} started, {} completed",
        resets.started.load(Ordering::Relaxed),
        driver.resets_completed(),
    );
    Ok(())
}
