use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The consumer was never opened on this topic or has already been closed.
    #[error("consumer {consumer} is not open on topic {topic}")]
    ConsumerClosed { topic: String, consumer: String },

    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),

    /// The remote broker could not be reached.
    #[error("broker transport error: {0}")]
    Transport(String),

    /// The remote broker answered with an unexpected status.
    #[error("broker returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
