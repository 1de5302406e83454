use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
