use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Source Error - {0}")]
    Source(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Commit Error - {0}")]
    Commit(String),

    /// Raised by user supplied predicates and transforms.
    #[error("Operator Error - {0}")]
    Operator(String),

    #[error("Topology Error - {0}")]
    Topology(String),

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Codec Error - {0}")]
    Codec(String),

    #[error("Store Error - {0}")]
    Store(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::Metrics(e.to_string())
    }
}
