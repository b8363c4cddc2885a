use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The store understood the request and rejected it.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Connection closed")]
    Closed,
}

impl Error {
    /// True for failures that mean the connection itself is unusable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Io(_) | Error::Closed)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
