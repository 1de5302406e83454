use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use locus_types::ObjectName;

use crate::error::StoreResult;

/// Byte stream of a stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sink for an object being written. Callers must `shutdown` it to flush.
pub type ObjectWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Object storage local to one provider.
///
/// All implementations must satisfy these invariants:
/// - `exists` reflects every write that has been started, including one that
///   failed part way.
/// - `open_read` returns `StoreError::NotFound` for absent objects, never an
///   empty stream.
/// - Concurrent readers of one object are safe.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Check whether an object is held here.
    async fn exists(&self, name: &ObjectName) -> StoreResult<bool>;

    /// Open an object for streaming reads.
    async fn open_read(&self, name: &ObjectName) -> StoreResult<ObjectReader>;

    /// Create or truncate an object for streaming writes.
    async fn create_write(&self, name: &ObjectName) -> StoreResult<ObjectWriter>;
}
