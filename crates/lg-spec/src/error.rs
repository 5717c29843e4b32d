use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("behavior spec {spec:?}: {reason}")]
    Invalid { spec: String, reason: String },

    #[error("behavior spec {spec:?}: row op {op} variant {variant} {reason}")]
    BadRow {
        spec:    String,
        op:      usize,
        variant: usize,
        reason:  &'static str,
    },

    #[error("behavior spec {0:?} is already registered")]
    Duplicate(String),

    #[error("behavior spec {0:?} is not registered")]
    UnknownSpec(String),

    #[error("transition chooser {0:?} is not registered")]
    UnknownChooser(String),

    #[error("behavior spec {spec:?}: op {op} has no matrix variant {variant}")]
    VariantOutOfRange { spec: String, op: usize, variant: usize },

    #[error("transition chooser failed: {0}")]
    Chooser(String),

    #[error("spec parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SpecResult<T> = Result<T, SpecError>;
