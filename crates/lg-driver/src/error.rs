use lg_core::LgError;
use lg_data::DataError;
use lg_spec::SpecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver configuration error: {0}")]
    Config(#[from] LgError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("data wiring failed: {0}")]
    Data(#[from] DataError),

    #[error("could not build operation {op} of spec {spec:?}: {cause}")]
    Operation {
        spec:  String,
        op:    String,
        cause: String,
    },

    #[error("population full: user ids are exhausted")]
    PopulationFull,

    #[error("no tokio runtime: build the driver inside one or pass a handle")]
    NoRuntime,
}

pub type DriverResult<T> = Result<T, DriverError>;
