//! `BehaviorSpecConfig` (raw, deserializable) and `BehaviorSpec` (validated,
//! immutable).

use lg_core::OpIndex;
use serde::{Deserialize, Serialize};

use crate::selection::SelectionRow;
use crate::{SpecError, SpecResult};

/// Name of the chooser used when a spec does not name one.
pub const DEFAULT_CHOOSER: &str = "default";

const DEFAULT_MIX_TOLERANCE: f64 = 0.10;

// ── Raw configuration ─────────────────────────────────────────────────────────

/// A behavior spec as written in a configuration file.
///
/// Only `name`, `transition_matrices` and `mean_cycle_times` are required;
/// every per-operation vector may be omitted, in which case it is filled with
/// its default for each operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSpecConfig {
    pub name: String,

    #[serde(default)]
    pub initial_state: u16,

    /// Raw weights indexed `[op][variant][next_op]`.
    pub transition_matrices: Vec<Vec<Vec<f64>>>,

    /// Mean seconds between operation starts, per operation.
    pub mean_cycle_times: Vec<f64>,

    #[serde(default)]
    pub operation_names: Vec<String>,

    #[serde(default)]
    pub transition_choosers: Vec<String>,

    #[serde(default)]
    pub is_reset_state: Vec<bool>,

    /// Spec to spawn asynchronously after each operation.  `null`, missing, or
    /// the string `"none"` mean no spawn.
    #[serde(default)]
    pub async_behaviors: Vec<Option<String>>,

    #[serde(default)]
    pub max_num_async_behaviors: usize,

    /// Response-time limit per operation, milliseconds.
    #[serde(default)]
    pub response_time_limits: Vec<f64>,

    #[serde(default)]
    pub response_time_limit_percentile: Vec<f64>,

    #[serde(default)]
    pub use_response_time: Vec<bool>,

    #[serde(default)]
    pub mix_percentage: Vec<f64>,

    #[serde(default = "default_mix_tolerance")]
    pub mix_percentage_tolerance: f64,
}

fn default_mix_tolerance() -> f64 {
    DEFAULT_MIX_TOLERANCE
}

impl BehaviorSpecConfig {
    /// A config with the given matrices and cycle times and every optional
    /// field left at its default.
    pub fn new(
        name:                impl Into<String>,
        transition_matrices: Vec<Vec<Vec<f64>>>,
        mean_cycle_times:    Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            initial_state: 0,
            transition_matrices,
            mean_cycle_times,
            operation_names: Vec::new(),
            transition_choosers: Vec::new(),
            is_reset_state: Vec::new(),
            async_behaviors: Vec::new(),
            max_num_async_behaviors: 0,
            response_time_limits: Vec::new(),
            response_time_limit_percentile: Vec::new(),
            use_response_time: Vec::new(),
            mix_percentage: Vec::new(),
            mix_percentage_tolerance: DEFAULT_MIX_TOLERANCE,
        }
    }
}

// ── Validated spec ────────────────────────────────────────────────────────────

/// An immutable, validated operation graph shared read-only by all users.
#[derive(Clone, Debug)]
pub struct BehaviorSpec {
    name:                  String,
    initial_state:         OpIndex,
    operation_names:       Vec<String>,
    transition_choosers:   Vec<String>,
    /// `[op][variant]`.
    selection:             Vec<Vec<SelectionRow>>,
    mean_cycle_times:      Vec<f64>,
    is_reset_state:        Vec<bool>,
    async_behaviors:       Vec<Option<String>>,
    max_async_behaviors:   usize,
    response_time_limits:  Vec<f64>,
    response_time_pct:     Vec<f64>,
    use_response_time:     Vec<bool>,
    mix_percentage:        Vec<f64>,
    mix_tolerance:         f64,
}

impl BehaviorSpec {
    /// Validate `config`, normalize its matrices, and build the selection rows.
    pub fn from_config(config: BehaviorSpecConfig) -> SpecResult<Self> {
        let name = config.name;
        let invalid = |reason: String| SpecError::Invalid { spec: name.clone(), reason };

        let n = config.transition_matrices.len();
        if n == 0 {
            return Err(invalid("has no operations".into()));
        }
        if n > usize::from(u16::MAX) {
            return Err(invalid(format!("has {n} operations; at most {} supported", u16::MAX)));
        }
        if usize::from(config.initial_state) >= n {
            return Err(invalid(format!("initial_state {} out of range", config.initial_state)));
        }

        let mut selection = Vec::with_capacity(n);
        for (op, variants) in config.transition_matrices.iter().enumerate() {
            if variants.is_empty() {
                return Err(invalid(format!("op {op} has no transition variants")));
            }
            let mut rows = Vec::with_capacity(variants.len());
            for (variant, weights) in variants.iter().enumerate() {
                if weights.len() != n {
                    return Err(invalid(format!(
                        "op {op} variant {variant} has {} weights, expected {n}",
                        weights.len()
                    )));
                }
                let row = SelectionRow::from_weights(weights).map_err(|e| SpecError::BadRow {
                    spec: name.clone(),
                    op,
                    variant,
                    reason: e.reason(),
                })?;
                rows.push(row);
            }
            selection.push(rows);
        }

        check_len(&name, "mean_cycle_times", config.mean_cycle_times.len(), n, false)?;
        if config.mean_cycle_times.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(invalid("mean_cycle_times must be finite and non-negative".into()));
        }

        check_len(&name, "operation_names", config.operation_names.len(), n, true)?;
        check_len(&name, "transition_choosers", config.transition_choosers.len(), n, true)?;
        check_len(&name, "is_reset_state", config.is_reset_state.len(), n, true)?;
        check_len(&name, "async_behaviors", config.async_behaviors.len(), n, true)?;
        check_len(&name, "response_time_limits", config.response_time_limits.len(), n, true)?;
        check_len(&name, "response_time_limit_percentile", config.response_time_limit_percentile.len(), n, true)?;
        check_len(&name, "use_response_time", config.use_response_time.len(), n, true)?;
        check_len(&name, "mix_percentage", config.mix_percentage.len(), n, true)?;

        let operation_names = or_fill(config.operation_names, n, |i| format!("op{i}"));
        let transition_choosers = or_fill(config.transition_choosers, n, |_| DEFAULT_CHOOSER.to_owned());
        let is_reset_state = or_fill(config.is_reset_state, n, |_| false);
        let async_behaviors = or_fill(config.async_behaviors, n, |_| None)
            .into_iter()
            .map(|a| a.filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("none")))
            .collect();

        Ok(Self {
            initial_state:        OpIndex(config.initial_state),
            operation_names,
            transition_choosers,
            selection,
            mean_cycle_times:     config.mean_cycle_times,
            is_reset_state,
            async_behaviors,
            max_async_behaviors:  config.max_num_async_behaviors,
            response_time_limits: or_fill(config.response_time_limits, n, |_| 0.0),
            response_time_pct:    or_fill(config.response_time_limit_percentile, n, |_| 100.0),
            use_response_time:    or_fill(config.use_response_time, n, |_| true),
            mix_percentage:       or_fill(config.mix_percentage, n, |_| 0.0),
            mix_tolerance:        config.mix_percentage_tolerance,
            name,
        })
    }

    // ── Selection ─────────────────────────────────────────────────────────

    /// Pick the operation following `completed` with matrix `variant`, given
    /// a uniform draw `r` in `[0, 1)`.
    pub fn select_next(&self, completed: OpIndex, variant: usize, r: f64) -> SpecResult<OpIndex> {
        let row = self.selection_row(completed, variant)?;
        Ok(OpIndex(row.pick(r) as u16))
    }

    pub fn selection_row(&self, op: OpIndex, variant: usize) -> SpecResult<&SelectionRow> {
        self.selection
            .get(op.index())
            .and_then(|variants| variants.get(variant))
            .ok_or_else(|| SpecError::VariantOutOfRange {
                spec: self.name.clone(),
                op: op.index(),
                variant,
            })
    }

    /// Number of matrix variants available after `op`.
    pub fn variant_count(&self, op: OpIndex) -> usize {
        self.selection.get(op.index()).map_or(0, Vec::len)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_operations(&self) -> usize {
        self.selection.len()
    }

    pub fn initial_state(&self) -> OpIndex {
        self.initial_state
    }

    pub fn operation_name(&self, op: OpIndex) -> &str {
        self.operation_names.get(op.index()).map_or("", String::as_str)
    }

    pub fn transition_chooser(&self, op: OpIndex) -> &str {
        self.transition_choosers.get(op.index()).map_or(DEFAULT_CHOOSER, String::as_str)
    }

    pub fn transition_choosers(&self) -> &[String] {
        &self.transition_choosers
    }

    /// Mean cycle time of `op` in seconds.
    pub fn mean_cycle_time(&self, op: OpIndex) -> f64 {
        self.mean_cycle_times.get(op.index()).copied().unwrap_or(0.0)
    }

    pub fn is_reset_state(&self, op: OpIndex) -> bool {
        self.is_reset_state.get(op.index()).copied().unwrap_or(false)
    }

    /// Name of the spec spawned asynchronously after `op`, if any.
    pub fn async_behavior(&self, op: OpIndex) -> Option<&str> {
        self.async_behaviors.get(op.index()).and_then(|a| a.as_deref())
    }

    pub fn async_behaviors(&self) -> impl Iterator<Item = &str> {
        self.async_behaviors.iter().filter_map(|a| a.as_deref())
    }

    pub fn max_async_behaviors(&self) -> usize {
        self.max_async_behaviors
    }

    /// Response-time limit of `op`, milliseconds.
    pub fn response_time_limit(&self, op: OpIndex) -> f64 {
        self.response_time_limits.get(op.index()).copied().unwrap_or(0.0)
    }

    pub fn response_time_limit_percentile(&self, op: OpIndex) -> f64 {
        self.response_time_pct.get(op.index()).copied().unwrap_or(100.0)
    }

    pub fn uses_response_time(&self, op: OpIndex) -> bool {
        self.use_response_time.get(op.index()).copied().unwrap_or(true)
    }

    pub fn mix_percentage(&self, op: OpIndex) -> f64 {
        self.mix_percentage.get(op.index()).copied().unwrap_or(0.0)
    }

    pub fn mix_percentage_tolerance(&self) -> f64 {
        self.mix_tolerance
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn check_len(spec: &str, field: &str, got: usize, expected: usize, optional: bool) -> SpecResult<()> {
    if got == expected || (optional && got == 0) {
        return Ok(());
    }
    Err(SpecError::Invalid {
        spec:   spec.to_owned(),
        reason: format!("{field} has {got} entries, expected {expected}"),
    })
}

fn or_fill<T>(values: Vec<T>, n: usize, fill: impl Fn(usize) -> T) -> Vec<T> {
    if values.is_empty() { (0..n).map(fill).collect() } else { values }
}
