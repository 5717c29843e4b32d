use lg_core::BehaviorId;
use thiserror::Error;

use crate::ChannelKind;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("channel {name:?} is needed but no scope provides it (needs {needs}, contains {contains})")]
    Unresolved {
        name:     &'static str,
        needs:    BehaviorId,
        contains: BehaviorId,
    },

    #[error("channel {name:?} already exists as a {existing} with a different value type")]
    TypeMismatch {
        name:     &'static str,
        existing: ChannelKind,
    },

    #[error("channel {0:?} was not declared in the capabilities")]
    Unbound(&'static str),

    #[error("could not extract data: {0}")]
    Extract(String),
}

pub type DataResult<T> = Result<T, DataError>;
