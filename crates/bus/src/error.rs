use thiserror::Error;

/// Errors that can occur in the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("pipeline closed: {0}")]
    Closed(String),

    #[error("pipeline full: {0}")]
    Full(String),

    #[error("handler error: {0}")]
    Handler(String),
}
