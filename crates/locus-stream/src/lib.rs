//! Streaming bridge between gateway clients and providers.
//!
//! Object bytes never accumulate in the gateway. A GET is re-chunked through
//! a fixed [`BRIDGE_BUFFER_SIZE`] buffer on its way from the provider to the
//! client; a PUT crosses a bounded conduit of at most [`CONDUIT_DEPTH`]
//! chunks into the outbound request. Memory per transfer is therefore bounded
//! no matter how large the object is.

pub mod error;
pub mod get;
pub mod put;

pub use error::{StreamError, StreamResult};
pub use get::GetStream;
pub use put::{relay_put, relay_to_writer, PutStream};

use locus_types::ObjectName;
use reqwest::Url;

/// Size of the buffer every GET is re-chunked through.
pub const BRIDGE_BUFFER_SIZE: usize = 64 * 1024;

/// Number of chunks the PUT conduit holds before the writer waits.
pub const CONDUIT_DEPTH: usize = 4;

/// URL of `name` on the provider at `address` (`host:port`, or a full base URL).
///
/// The name is percent-encoded as a single path segment.
pub fn object_url(address: &str, name: &ObjectName) -> StreamResult<Url> {
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let mut url = Url::parse(&base).map_err(|_| StreamError::InvalidAddress(address.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| StreamError::InvalidAddress(address.to_string()))?
        .pop_if_empty()
        .push("objects")
        .push(name.as_str());
    Ok(url)
}
