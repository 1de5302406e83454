//! Cluster coordination for Locus.
//!
//! The gateway keeps no index of where objects live. Writes go to a provider
//! chosen at random by the [`PlacementSelector`]; reads find their provider by
//! broadcasting a location query and waiting, for a bounded time, for the
//! holder to answer.
//!
//! # Discovery
//!
//! - [`LocationRequester`] (gateway) publishes `{name, requestId}` on the
//!   query topic and filters the shared reply topic for its own request id.
//! - [`LocationResponder`] (provider) answers queries for objects it holds and
//!   removes the answered query from the queue.
//! - [`QueryScope`] settles each query exactly once, as resolved or expired,
//!   and releases the reply consumer exactly once.
//!
//! Every outstanding query polls the reply topic on its own consumer. There
//! is no central dispatcher demultiplexing replies by request id, so the cost
//! grows with the number of concurrent queries.

pub mod correlation;
pub mod error;
pub mod placement;
pub mod requester;
pub mod responder;

pub use correlation::{QueryScope, QueryState};
pub use error::{ClusterError, ClusterResult};
pub use placement::{PlacementSelector, ProviderRegistry};
pub use requester::{LocateConfig, LocationRequester};
pub use responder::{LocationResponder, QueryOutcome};
