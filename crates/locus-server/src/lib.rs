//! HTTP nodes for Locus.
//!
//! One binary, three roles:
//!
//! - **gateway**: the client-facing object API. Writes are placed on a random
//!   provider; reads locate their provider through the broker and are relayed
//!   back without buffering.
//! - **provider**: stores objects on local disk and answers location queries
//!   for the objects it holds.
//! - **broker**: hosts the query and reply topics for the other nodes.

pub mod broker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod provider;
pub mod router;
pub mod server;

pub use config::{NodeConfig, NodeMode, ReadPath};
pub use error::{ServerError, ServerResult};
pub use gateway::GatewayState;
pub use provider::ProviderState;
pub use server::LocusServer;
