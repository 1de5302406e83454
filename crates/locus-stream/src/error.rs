use thiserror::Error;

use locus_types::ObjectName;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The provider answered 404.
    #[error("object not found at provider: {0}")]
    NotFound(ObjectName),

    #[error("provider {address} answered with status {status}")]
    UpstreamStatus { address: String, status: u16 },

    #[error("transport error talking to {address}: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid provider address: {0}")]
    InvalidAddress(String),

    /// One leg of the transfer failed and the other was torn down.
    #[error("transfer aborted: {0}")]
    Aborted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
