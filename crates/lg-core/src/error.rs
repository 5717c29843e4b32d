//! Framework error type.
//!
//! Sub-crates define their own error enums and either convert them into
//! `LgError` or wrap `LgError` as one variant, whichever keeps error sites
//! clean.

use thiserror::Error;

use crate::{BehaviorId, UserId};

/// The top-level error type for `lg-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum LgError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("behavior {0} not found")]
    BehaviorNotFound(BehaviorId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `lg-core`.
pub type LgResult<T> = Result<T, LgError>;
