use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use locus_broker::BrokerError;
use locus_cluster::ClusterError;
use locus_store::StoreError;
use locus_stream::StreamError;
use locus_types::{ObjectName, TypeError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    InvalidName(#[from] TypeError),

    /// Absent, or no provider answered the location query in time.
    #[error("object not found: {0}")]
    NotFound(ObjectName),

    #[error("no provider available")]
    NoProviderAvailable,

    /// The located provider failed while serving a read.
    #[error("upstream read failed: {0}")]
    UpstreamRead(#[source] StreamError),

    /// The chosen provider failed while storing a write.
    #[error("upstream write failed: {0}")]
    UpstreamWrite(#[source] StreamError),

    #[error("location discovery failed: {0}")]
    Discovery(#[source] ClusterError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("transfer error: {0}")]
    Transfer(#[from] StreamError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Classify a failure on the provider leg of a GET.
    pub fn upstream_read(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(name) => Self::NotFound(name),
            other => Self::UpstreamRead(other),
        }
    }

    /// Classify a failure on the provider leg of a PUT.
    pub fn upstream_write(err: StreamError) -> Self {
        Self::UpstreamWrite(err)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidName(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamRead(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Broker(BrokerError::ConsumerClosed { .. }) => StatusCode::NOT_FOUND,
            Self::Broker(BrokerError::InvalidTopic(_)) => StatusCode::BAD_REQUEST,
            Self::UpstreamWrite(_)
            | Self::Discovery(_)
            | Self::Storage(_)
            | Self::Transfer(_)
            | Self::Broker(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ClusterError> for ServerError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound(name) => Self::NotFound(name),
            ClusterError::NoProviderAvailable => Self::NoProviderAvailable,
            other => Self::Discovery(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
