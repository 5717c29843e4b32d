//! JSON spec loader and CSV transition-matrix loader.
//!
//! # JSON format
//!
//! A top-level array of [`BehaviorSpecConfig`] objects:
//!
//! ```json
//! [
//!   {
//!     "name": "browse",
//!     "initial_state": 0,
//!     "transition_matrices": [[[0, 1]], [[1, 0]]],
//!     "mean_cycle_times": [5.0, 5.0],
//!     "is_reset_state": [false, false]
//!   }
//! ]
//! ```
//!
//! # CSV format
//!
//! Large matrices are easier to maintain as one weight per row:
//!
//! ```csv
//! spec,from_op,variant,to_op,weight
//! browse,0,0,1,1.0
//! browse,1,0,0,1.0
//! ```
//!
//! The op count of each spec is one past the largest `from_op`/`to_op` seen
//! for it; each op gets one variant past the largest `variant` seen for that
//! op.  Missing cells are zero.  [`apply_transitions`] replaces the matrices
//! of already-loaded configs; the usual row validation happens when the
//! configs are turned into specs.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::{BehaviorSpecConfig, SpecError, SpecResult};

/// `[op][variant][next_op]` raw weights.
pub type TransitionTable = Vec<Vec<Vec<f64>>>;

// ── JSON ──────────────────────────────────────────────────────────────────────

pub fn load_specs_json(path: &Path) -> SpecResult<Vec<BehaviorSpecConfig>> {
    let file = std::fs::File::open(path)?;
    load_specs_json_reader(std::io::BufReader::new(file))
}

/// Like [`load_specs_json`] but accepts any `Read` source.
pub fn load_specs_json_reader<R: Read>(reader: R) -> SpecResult<Vec<BehaviorSpecConfig>> {
    serde_json::from_reader(reader).map_err(|e| SpecError::Parse(e.to_string()))
}

// ── CSV ───────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TransitionRecord {
    spec:     String,
    from_op:  u16,
    variant:  u16,
    to_op:    u16,
    weight:   f64,
}

/// Load per-spec transition tables from a CSV file.
pub fn load_transitions_csv(path: &Path) -> SpecResult<BTreeMap<String, TransitionTable>> {
    let file = std::fs::File::open(path)?;
    load_transitions_reader(file)
}

/// Like [`load_transitions_csv`] but accepts any `Read` source.
pub fn load_transitions_reader<R: Read>(reader: R) -> SpecResult<BTreeMap<String, TransitionTable>> {
    // ── Parse CSV rows ────────────────────────────────────────────────────
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut by_spec: BTreeMap<String, Vec<TransitionRecord>> = BTreeMap::new();

    for result in csv_reader.deserialize::<TransitionRecord>() {
        let row = result.map_err(|e| SpecError::Parse(e.to_string()))?;
        by_spec.entry(row.spec.clone()).or_default().push(row);
    }

    // ── Size and fill one table per spec ──────────────────────────────────
    let mut tables = BTreeMap::new();
    for (name, rows) in by_spec {
        let ops = rows
            .iter()
            .map(|r| usize::from(r.from_op.max(r.to_op)) + 1)
            .max()
            .unwrap_or(0);

        let mut variants = vec![0usize; ops];
        for r in &rows {
            let v = &mut variants[usize::from(r.from_op)];
            *v = (*v).max(usize::from(r.variant) + 1);
        }

        let mut table: TransitionTable = variants
            .iter()
            .map(|&count| vec![vec![0.0; ops]; count])
            .collect();

        for r in rows {
            let cell = &mut table[usize::from(r.from_op)][usize::from(r.variant)][usize::from(r.to_op)];
            if *cell != 0.0 {
                return Err(SpecError::Parse(format!(
                    "spec {name:?}: duplicate weight for {} -> {} (variant {})",
                    r.from_op, r.to_op, r.variant
                )));
            }
            *cell = r.weight;
        }
        tables.insert(name, table);
    }

    Ok(tables)
}

/// Replace the transition matrices of `configs` with the loaded `tables`.
///
/// Every table must name a config; configs without a table keep their
/// matrices.
pub fn apply_transitions(
    configs: &mut [BehaviorSpecConfig],
    tables:  BTreeMap<String, TransitionTable>,
) -> SpecResult<()> {
    for (name, table) in tables {
        let config = configs
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SpecError::UnknownSpec(name.clone()))?;
        config.transition_matrices = table;
    }
    Ok(())
}
