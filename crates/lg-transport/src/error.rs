use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("URI template {uri:?} references unbound variable {var:?}")]
    Unbound { uri: String, var: String },

    #[error("transport error: {0}")]
    Other(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
