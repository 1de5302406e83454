use thiserror::Error;

use locus_broker::BrokerError;
use locus_store::StoreError;
use locus_types::{ObjectName, TypeError};

#[derive(Debug, Error)]
pub enum ClusterError {
    /// No provider holds the object, or none answered before the deadline.
    #[error("object not found: {0}")]
    NotFound(ObjectName),

    #[error("no provider available")]
    NoProviderAvailable,

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("message error: {0}")]
    Message(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
