use std::io;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::StatusCode;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use locus_types::ObjectName;

use crate::error::{StreamError, StreamResult};
use crate::{object_url, BRIDGE_BUFFER_SIZE};

/// The provider leg of a GET, opened and checked but not yet consumed.
#[derive(Debug)]
pub struct GetStream {
    response: reqwest::Response,
    address: String,
}

impl GetStream {
    /// Request `name` from the provider at `address`.
    ///
    /// Resolves once the provider's status line is in; the body is left
    /// unread until [`into_stream`] is polled.
    ///
    /// [`into_stream`]: GetStream::into_stream
    pub async fn open(client: &reqwest::Client, address: &str, name: &ObjectName) -> StreamResult<Self> {
        let url = object_url(address, name)?;
        let response = client.get(url).send().await.map_err(|source| StreamError::Transport {
            address: address.to_string(),
            source,
        })?;

        match response.status() {
            status if status.is_success() => {
                debug!(object = %name, provider = %address, length = ?response.content_length(), "provider stream opened");
                Ok(Self {
                    response,
                    address: address.to_string(),
                })
            }
            StatusCode::NOT_FOUND => Err(StreamError::NotFound(name.clone())),
            status => Err(StreamError::UpstreamStatus {
                address: address.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Body length announced by the provider, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// The object bytes, in chunks of at most [`BRIDGE_BUFFER_SIZE`].
    ///
    /// A provider-side failure surfaces as an `Err` item and ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let upstream = self.response.bytes_stream().map_err(io::Error::other);
        ReaderStream::with_capacity(StreamReader::new(upstream), BRIDGE_BUFFER_SIZE)
    }
}
