use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimpleAdapterError>;

/// Errors raised by the in-memory adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimpleAdapterError {
    #[error("Failed to read: {0}")]
    Read(String),

    #[error("Failed to commit: {0}")]
    Commit(String),

    #[error("Failed to write: {0}")]
    Write(String),

    #[error("Value of key {0} must not be empty")]
    EmptyValue(String),

    #[error("Store operation failed: {0}")]
    Store(String),
}

impl From<SimpleAdapterError> for streams_core::Error {
    fn from(value: SimpleAdapterError) -> Self {
        match value {
            SimpleAdapterError::Read(_) => streams_core::Error::Source(value.to_string()),
            SimpleAdapterError::Commit(_) => streams_core::Error::Commit(value.to_string()),
            SimpleAdapterError::Write(_) => streams_core::Error::Sink(value.to_string()),
            SimpleAdapterError::EmptyValue(_) | SimpleAdapterError::Store(_) => {
                streams_core::Error::Store(value.to_string())
            }
        }
    }
}
