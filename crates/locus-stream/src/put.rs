use std::io;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use locus_types::ObjectName;

use crate::error::{StreamError, StreamResult};
use crate::{object_url, CONDUIT_DEPTH};

type Chunk = io::Result<Bytes>;

/// The provider leg of a PUT.
///
/// The outbound request runs on its own task and reads its body from a
/// bounded conduit fed by [`write`]. The upload only counts as stored once
/// [`finish`] has seen the provider's status. Dropping an unfinished
/// `PutStream` tears the outbound request down, so a truncated body is never
/// mistaken for a complete one.
///
/// [`write`]: PutStream::write
/// [`finish`]: PutStream::finish
#[derive(Debug)]
pub struct PutStream {
    sender: Option<mpsc::Sender<Chunk>>,
    outbound: Option<JoinHandle<StreamResult<()>>>,
    address: String,
    name: ObjectName,
    written: u64,
}

impl PutStream {
    /// Start `PUT /objects/{name}` against the provider at `address`.
    pub fn open(client: &reqwest::Client, address: &str, name: &ObjectName) -> StreamResult<Self> {
        let url = object_url(address, name)?;
        let (sender, receiver) = mpsc::channel::<Chunk>(CONDUIT_DEPTH);
        let body = futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        });
        let request = client.put(url).body(reqwest::Body::wrap_stream(body));

        let provider = address.to_string();
        let outbound = tokio::spawn(async move {
            let response = request.send().await.map_err(|source| StreamError::Transport {
                address: provider.clone(),
                source,
            })?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(StreamError::UpstreamStatus {
                    address: provider,
                    status: status.as_u16(),
                })
            }
        });

        debug!(object = %name, provider = %address, "provider upload started");
        Ok(Self {
            sender: Some(sender),
            outbound: Some(outbound),
            address: address.to_string(),
            name: name.clone(),
            written: 0,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bytes accepted into the conduit so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Feed one chunk to the provider, waiting while the conduit is full.
    ///
    /// If the outbound request has already ended, its error is returned.
    pub async fn write(&mut self, chunk: Bytes) -> StreamResult<()> {
        let len = chunk.len() as u64;
        let sent = match &self.sender {
            Some(sender) => sender.send(Ok(chunk)).await.is_ok(),
            None => false,
        };
        if sent {
            self.written += len;
            return Ok(());
        }
        self.sender = None;
        match self.join().await {
            Err(e) => Err(e),
            Ok(()) => Err(StreamError::Aborted(format!(
                "provider {} closed the upload early",
                self.address
            ))),
        }
    }

    /// Close the conduit and wait for the provider's answer.
    pub async fn finish(mut self) -> StreamResult<u64> {
        self.sender = None;
        self.join().await?;
        debug!(object = %self.name, provider = %self.address, bytes = self.written, "provider upload finished");
        Ok(self.written)
    }

    /// Fail the outbound request with `reason` and wait for it to end.
    pub async fn abort(mut self, reason: io::Error) {
        warn!(object = %self.name, provider = %self.address, error = %reason, "aborting provider upload");
        if let Some(sender) = self.sender.take() {
            if sender.try_send(Err(reason)).is_err() {
                // Conduit full or already closed; stop the request directly.
                if let Some(outbound) = &self.outbound {
                    outbound.abort();
                }
            }
        }
        if let Err(e) = self.join().await {
            debug!(error = %e, "aborted upload ended");
        }
    }

    async fn join(&mut self) -> StreamResult<()> {
        let Some(outbound) = self.outbound.take() else {
            return Err(StreamError::Aborted("upload already ended".into()));
        };
        match outbound.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::Aborted(e.to_string())),
        }
    }
}

impl Drop for PutStream {
    fn drop(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            debug!(object = %self.name, provider = %self.address, "unfinished upload dropped");
            outbound.abort();
        }
    }
}

/// Drive an inbound byte stream into `put` and finish it.
///
/// An inbound error aborts the provider leg; a provider failure ends the
/// relay and drops the rest of the inbound stream. Returns the bytes stored.
pub async fn relay_put<S, E>(inbound: S, mut put: PutStream) -> StreamResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures_util::pin_mut!(inbound);
    while let Some(chunk) = inbound.next().await {
        match chunk {
            Ok(chunk) => put.write(chunk).await?,
            Err(e) => {
                let reason = format!("client stream failed: {e}");
                put.abort(io::Error::other(reason.clone())).await;
                return Err(StreamError::Aborted(reason));
            }
        }
    }
    put.finish().await
}

/// Drain an inbound byte stream into a local writer, then shut it down.
pub async fn relay_to_writer<S, E, W>(inbound: S, writer: &mut W) -> StreamResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin + ?Sized,
{
    futures_util::pin_mut!(inbound);
    let mut written = 0u64;
    while let Some(chunk) = inbound.next().await {
        let chunk = chunk.map_err(|e| StreamError::Aborted(format!("client stream failed: {e}")))?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.shutdown().await?;
    Ok(written)
}
