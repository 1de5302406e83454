//! Message broker seam for Locus.
//!
//! The gateway and the providers never talk to each other about object
//! locations directly; they exchange location query and reply
//! messages through a broker. This crate defines the broker contract and two
//! implementations.
//!
//! # Semantics
//!
//! - Each topic is a queue. `receive` hands a message to one caller and hides
//!   it for the visibility timeout; unless acknowledged it becomes visible
//!   again, so delivery is at-least-once and only loosely ordered.
//! - Receiving requires an open consumer. Closing a consumer is the release
//!   primitive the discovery protocol must call exactly once.
//!
//! # Backends
//!
//! - [`InMemoryBroker`]: in-process queues, also served over HTTP by broker nodes
//! - [`HttpBroker`]: client for a remote broker node

pub mod consumer;
pub mod error;
pub mod http;
pub mod memory;
pub mod traits;

pub use consumer::Consumer;
pub use error::{BrokerError, BrokerResult};
pub use http::HttpBroker;
pub use memory::{BrokerStats, InMemoryBroker, QueueConfig};
pub use traits::{validate_topic, ConsumerId, Delivery, MessageBroker, MessageId, ReceiptHandle};

/// Default topic carrying location queries.
pub const DEFAULT_QUERY_TOPIC: &str = "locus-locate";

/// Default topic carrying location replies.
pub const DEFAULT_REPLY_TOPIC: &str = "locus-located";
