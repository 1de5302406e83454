//! Foundation types for Locus.
//!
//! Every other Locus crate depends on `locus-types`. It holds the values that
//! cross process boundaries (location messages, node info) and the
//! identifiers shared by the gateway and the providers.
//!
//! # Key Types
//!
//! - [`ObjectName`]: validated, single-segment object name
//! - [`ProviderId`]: opaque identifier for a registered provider
//! - [`RequestId`]: correlation id tagging one outstanding location query
//! - [`ProviderRecord`]: a provider as known by the gateway registry
//! - [`LocationQuery`] / [`LocationReply`]: discovery wire messages
//! - [`NodeInfo`]: the `{version, status}` document served at `/`

pub mod error;
pub mod ids;
pub mod message;
pub mod name;
pub mod provider;
pub mod status;

pub use error::TypeError;
pub use ids::{ProviderId, RequestId};
pub use message::{LocationQuery, LocationReply};
pub use name::ObjectName;
pub use provider::{parse_peer_list, ProviderRecord};
pub use status::{NodeInfo, ServerStatus, NODE_VERSION};
