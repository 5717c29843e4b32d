//! `lg-spec`: behavior specifications and transition selection.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                       |
//! |----------------|----------------------------------------------------------------|
//! | [`selection`]  | `SelectionRow` (normalized + cumulative row), bucket lookup    |
//! | [`spec`]       | `BehaviorSpecConfig` (raw, serde), `BehaviorSpec` (validated)  |
//! | [`chooser`]    | `TransitionChooser` trait, `DefaultChooser`, `DataDrivenChooser` |
//! | [`registry`]   | `SpecRegistry`, named specs and choosers, injected by `Arc`   |
//! | [`loader`]     | `load_specs_json*`, `load_transitions_csv*`                    |
//! | [`error`]      | `SpecError`, `SpecResult<T>`                                   |
//!
//! # Selection model (summary)
//!
//! After operation `op` completes, its transition chooser names a matrix
//! variant `v`.  With `r` drawn uniformly from `[0, 1)`:
//!
//! ```text
//! p[k]      = w[op][v][k] / Σ w[op][v]
//! c[k]      = p[0] + … + p[k]
//! next      = first k with r < c[k]
//! ```
//!
//! A draw equal to a boundary falls into the next bucket, zero-weight
//! operations are never chosen, and a draw past the final boundary (rounding)
//! lands on the last operation with non-zero weight.  Rows whose weights sum
//! to zero are rejected when the spec is built.

pub mod chooser;
pub mod error;
pub mod loader;
pub mod registry;
pub mod selection;
pub mod spec;


pub use chooser::{ChooserInput, DataDrivenChooser, DefaultChooser, TransitionChoice, TransitionChooser};
pub use error::{SpecError, SpecResult};
pub use loader::{
    apply_transitions, load_specs_json, load_specs_json_reader, load_transitions_csv,
    load_transitions_reader, TransitionTable,
};
pub use registry::SpecRegistry;
pub use selection::{ROW_TOLERANCE, SelectionRow};
pub use spec::{BehaviorSpec, BehaviorSpecConfig};
