use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ProviderId;

/// A storage provider as known by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: ProviderId,
    /// Network location, `host:port`.
    pub address: String,
    /// Last time the gateway completed a request against this provider.
    pub last_seen: Option<DateTime<Utc>>,
}

impl ProviderRecord {
    /// New record with a fresh id and no contact history.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(),
            address: address.into(),
            last_seen: None,
        }
    }
}

/// Split a comma-separated peer list, trimming whitespace and skipping blanks.
pub fn parse_peer_list(peers: &str) -> Vec<String> {
    peers
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
