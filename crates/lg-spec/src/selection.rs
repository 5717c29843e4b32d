//! Normalized and cumulative transition rows.

/// Tolerance used when checking that a normalized row sums to one.
pub const ROW_TOLERANCE: f64 = 1e-9;

/// Why a raw weight row was rejected.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RowError {
    Empty,
    NegativeOrNonFinite,
    ZeroSum,
}

impl RowError {
    pub fn reason(self) -> &'static str {
        match self {
            RowError::Empty               => "has no entries",
            RowError::NegativeOrNonFinite => "has a negative or non-finite weight",
            RowError::ZeroSum             => "weights sum to zero",
        }
    }
}

/// One row of a selection matrix: the probabilities of each next operation
/// and their running sums.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionRow {
    probabilities: Vec<f64>,
    cumulative:    Vec<f64>,
    /// Highest index with a non-zero probability; the clamp target.
    last_positive: usize,
}

impl SelectionRow {
    /// Normalize `weights` into probabilities and build the cumulative row.
    pub fn from_weights(weights: &[f64]) -> Result<Self, RowError> {
        if weights.is_empty() {
            return Err(RowError::Empty);
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RowError::NegativeOrNonFinite);
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(RowError::ZeroSum);
        }

        let probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let mut cumulative = Vec::with_capacity(probabilities.len());
        let mut running = 0.0;
        for p in &probabilities {
            running += p;
            cumulative.push(running);
        }
        let last_positive = probabilities
            .iter()
            .rposition(|p| *p > 0.0)
            .ok_or(RowError::ZeroSum)?;

        Ok(Self { probabilities, cumulative, last_positive })
    }

    /// Index of the first cumulative bucket strictly greater than `r`.
    ///
    /// `r` is expected in `[0, 1)`; anything past the final boundary
    /// (including rounding shortfall in the last sum) clamps to the last
    /// operation with non-zero probability.
    #[inline]
    pub fn pick(&self, r: f64) -> usize {
        self.cumulative
            .iter()
            .position(|&c| r < c)
            .map_or(self.last_positive, |i| i.min(self.last_positive))
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }
}
